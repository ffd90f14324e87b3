//! Connect orchestration and per-connection commands.
//!
//! Every transport failure, whether it happens on the caller's task or on a
//! background connect, is turned into a `ConnectionFailure` event and goes
//! through the dispatcher like any other event.

use crate::engine::{ConnectTarget, Profile};
pub use crate::engine::{ChannelInfo, ChannelUser, Membership, UserInfo};
use crate::error::{BridgeError, Result, TransportError};
use crate::event::{ConnectionState, EventKind};
use crate::registry::{Connection, Registry};
use std::sync::Arc;

pub const DEFAULT_PORT: u32 = 6667;

/// Optional settings for [`Coordinator::connect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub realname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    /// Wait for the connect to finish instead of running it in the background
    pub run_sync: bool,
}

impl ConnectOptions {
    pub fn sync() -> Self {
        Self {
            run_sync: true,
            ..Self::default()
        }
    }
}

/// Snapshot returned by [`Coordinator::info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: String,
    pub nickname: String,
    pub channels: Vec<String>,
    pub connected: bool,
}

pub fn validate_port(port: u32) -> Result<u16> {
    match u16::try_from(port) {
        Ok(p) if p >= 1 => Ok(p),
        _ => Err(BridgeError::InvalidPort(port)),
    }
}

#[derive(Clone)]
pub struct Coordinator {
    registry: Arc<Registry>,
}

impl Coordinator {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Connect `id` to `host:port` as `nick`.
    ///
    /// Lookup and validation failures return before anything is touched.
    /// With `run_sync` the call waits for the engine and also returns any
    /// transport error; otherwise it returns at once and failures only
    /// arrive as `ConnectionFailure` events.
    pub async fn connect(
        &self,
        id: &str,
        nick: &str,
        host: &str,
        port: u32,
        options: ConnectOptions,
    ) -> Result<()> {
        let connection = self.registry.get(id)?;
        let port = validate_port(port)?;
        if nick.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("nickname must not be empty".into()));
        }
        if host.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("host must not be empty".into()));
        }

        connection.begin_connect()?;
        connection.engine().set_profile(Profile {
            nickname: Some(nick.to_string()),
            username: options.username,
            realname: options.realname,
        });

        let target = ConnectTarget {
            host: host.to_string(),
            port,
            password: options.password,
            tls: options.tls,
        };
        tracing::info!(
            id = %connection.id(),
            host = %target.host,
            port = target.port,
            sync = options.run_sync,
            "connecting"
        );

        if options.run_sync {
            return run_connect(&connection, &target).await;
        }

        let background = connection.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = run_connect(&background, &target).await {
                tracing::debug!(id = %background.id(), "background connect ended: {}", e);
            }
        });
        connection.track_connect(handle);
        Ok(())
    }

    pub async fn join(&self, id: &str, channel: &str, password: Option<&str>) -> Result<()> {
        let connection = self.registry.get_connected(id)?;
        let result = connection.engine().join(channel, password).await;
        checked(&connection, result).await
    }

    pub async fn part(&self, id: &str, channel: &str, message: Option<&str>) -> Result<()> {
        let connection = self.registry.get_connected(id)?;
        let result = connection.engine().part(channel, message).await;
        checked(&connection, result).await
    }

    pub async fn quit(&self, id: &str, message: Option<&str>) -> Result<()> {
        let connection = self.registry.get_connected(id)?;
        let result = connection.engine().quit(message).await;
        checked(&connection, result).await
    }

    pub async fn set_nick(&self, id: &str, nick: &str) -> Result<()> {
        if nick.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("nickname must not be empty".into()));
        }
        let connection = self.registry.get_connected(id)?;
        let result = connection.engine().set_nick(nick).await;
        checked(&connection, result).await
    }

    pub async fn send_raw(&self, id: &str, line: &str) -> Result<()> {
        let connection = self.registry.get_connected(id)?;
        let result = connection.engine().send_raw(line).await;
        checked(&connection, result).await
    }

    pub async fn send_message(&self, id: &str, target: &str, message: &str) -> Result<()> {
        let connection = self.registry.get_connected(id)?;
        let result = connection.engine().send_message(target, message).await;
        checked(&connection, result).await
    }

    pub async fn send_action(&self, id: &str, target: &str, message: &str) -> Result<()> {
        let connection = self.registry.get_connected(id)?;
        let result = connection.engine().send_action(target, message).await;
        checked(&connection, result).await
    }

    pub fn info(&self, id: &str) -> Result<ConnectionInfo> {
        let connection = self.registry.get(id)?;
        Ok(ConnectionInfo {
            id: connection.id().to_string(),
            nickname: connection.engine().nickname(),
            channels: connection.engine().channels(),
            connected: connection.is_connected(),
        })
    }

    /// Topic, modes and members of a joined channel.
    pub fn channel_info(&self, id: &str, channel: &str) -> Result<ChannelInfo> {
        let connection = self.registry.get_connected(id)?;
        connection
            .engine()
            .channel(channel)
            .ok_or_else(|| BridgeError::ChannelNotFound {
                id: connection.id().to_string(),
                channel: channel.to_string(),
            })
    }

    /// What the connection knows about `nick`: hostmask and the shared
    /// channels with the user's modes in each.
    pub fn user_info(&self, id: &str, nick: &str) -> Result<UserInfo> {
        let connection = self.registry.get_connected(id)?;
        connection
            .engine()
            .user(nick)
            .ok_or_else(|| BridgeError::UserNotFound {
                id: connection.id().to_string(),
                nick: nick.to_string(),
            })
    }
}

async fn run_connect(connection: &Connection, target: &ConnectTarget) -> Result<()> {
    match connection.engine().connect(target).await {
        Ok(()) => {
            // Connected may already have been applied by the event itself
            if connection.transition(ConnectionState::Connecting, ConnectionState::Connected)
                || connection.is_connected()
            {
                tracing::info!(id = %connection.id(), "connected");
                return Ok(());
            }
            tracing::debug!(id = %connection.id(), "connection closed before connect returned");
            Err(BridgeError::Transport(TransportError::new(
                "Cancelled",
                "connection closed before the connect completed",
            )))
        }
        Err(err) => {
            connection.set_state(ConnectionState::Disconnected);
            report(connection, &err).await;
            Err(BridgeError::Transport(err))
        }
    }
}

async fn checked(connection: &Connection, result: std::result::Result<(), TransportError>) -> Result<()> {
    if let Err(err) = &result {
        report(connection, err).await;
    }
    result.map_err(BridgeError::Transport)
}

async fn report(connection: &Connection, err: &TransportError) {
    tracing::warn!(id = %connection.id(), kind = %err.kind, "transport failure: {}", err.message);
    let failure = EventKind::ConnectionFailure {
        kind: err.kind.clone(),
        message: err.message.clone(),
    };
    if let Err(e) = connection.events().deliver(failure).await {
        tracing::debug!(id = %connection.id(), "failure event not delivered: {}", e);
    }
}
