//! Manage many named IRC connections from one host and receive all of their
//! events, in order, on a single handler.
//!
//! ```no_run
//! use crabbridge::{Bridge, CanonicalEvent, ConnectOptions};
//!
//! # async fn demo() -> crabbridge::Result<()> {
//! let bridge = Bridge::with_irc_engine(|event: CanonicalEvent| -> anyhow::Result<()> {
//!     println!("{}: {}", event.id, event.kind.name());
//!     Ok(())
//! });
//! bridge.create("libera");
//! bridge
//!     .connect("libera", "crab", "irc.libera.chat", 6667, ConnectOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod logging;
pub mod registry;

pub use bridge::Bridge;
pub use coordinator::{ChannelInfo, ChannelUser, ConnectOptions, ConnectionInfo, Membership, UserInfo};
pub use dispatch::{Dispatcher, EventHandler, EventSink};
pub use error::{BridgeError, ErrorKind, Result, TransportError};
pub use event::{CanonicalEvent, ConnectionState, EventKind, RawEvent};
