//! The protocol engine boundary.
//!
//! An [`Engine`] owns one IRC transport: framing, parsing, registration and
//! channel tracking. The core only calls the operations below and consumes
//! the [`RawEvent`](crate::event::RawEvent)s the engine pushes into its
//! [`EventSink`].

pub mod irc;
#[cfg(test)]
pub(crate) mod stub;

use crate::dispatch::EventSink;
use crate::error::TransportError;
use async_trait::async_trait;

pub use self::irc::{IrcEngine, IrcEngineFactory};

/// Where and how to open a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub tls: bool,
}

/// Identity used at registration. `None` leaves the engine default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub nickname: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
}

/// A nickname in a channel with its prefix modes, e.g. `"@"` or `"@+"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUser {
    pub nick: String,
    pub modes: String,
}

/// What the engine knows about one joined channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: Option<String>,
    /// Channel modes as last reported by the server (`RPL_CHANNELMODEIS`).
    pub modes: Option<String>,
    pub users: Vec<ChannelUser>,
}

/// One channel a user shares with us, and their prefix modes there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub channel: String,
    pub modes: String,
}

/// What the engine knows about one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub nick: String,
    /// `nick!user@host`, once a message from the user has been seen.
    pub hostmask: Option<String>,
    pub channels: Vec<Membership>,
}

/// One IRC transport, exclusively owned by one connection instance.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Open the transport and register. Returns once the handshake has been
    /// sent or has failed.
    async fn connect(&self, target: &ConnectTarget) -> Result<(), TransportError>;

    /// Tear the transport down. Must be idempotent and safe to call while a
    /// connect is still in progress.
    async fn disconnect(&self, force: bool) -> Result<(), TransportError>;

    async fn join(&self, channel: &str, password: Option<&str>) -> Result<(), TransportError>;
    async fn part(&self, channel: &str, message: Option<&str>) -> Result<(), TransportError>;
    async fn quit(&self, message: Option<&str>) -> Result<(), TransportError>;
    async fn set_nick(&self, nick: &str) -> Result<(), TransportError>;
    async fn send_raw(&self, line: &str) -> Result<(), TransportError>;
    async fn send_message(&self, target: &str, message: &str) -> Result<(), TransportError>;
    async fn send_action(&self, target: &str, message: &str) -> Result<(), TransportError>;

    /// Merge profile overrides; fields left `None` keep their current value.
    fn set_profile(&self, profile: Profile);

    /// Current nickname, or the desired one while disconnected.
    fn nickname(&self) -> String;

    /// Channels the engine currently tracks as joined.
    fn channels(&self) -> Vec<String>;

    /// Topic, modes and members of a joined channel, `None` when not joined.
    fn channel(&self, channel: &str) -> Option<ChannelInfo>;

    /// A user seen in a joined channel or in message prefixes, matched
    /// case-insensitively.
    fn user(&self, nick: &str) -> Option<UserInfo>;
}

/// Builds a fresh engine for each new connection instance.
pub trait EngineFactory: Send + Sync + 'static {
    fn create(&self, id: &str, sink: EventSink) -> Box<dyn Engine>;
}
