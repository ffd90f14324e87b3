//! Error types shared by the registry, coordinator and dispatcher.

use thiserror::Error;

/// A failure raised by the engine while talking to the network.
///
/// `kind` names the class of failure (`ConnectionRefused`, `PingTimeout`, ...)
/// and travels unchanged into the `ConnectionFailure` event.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: String,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn from_io(err: &std::io::Error) -> Self {
        Self::new(format!("{:?}", err.kind()), err.to_string())
    }
}

impl From<irc::error::Error> for TransportError {
    fn from(err: irc::error::Error) -> Self {
        match &err {
            irc::error::Error::Io(io) => Self::from_io(io),
            irc::error::Error::PingTimeout => Self::new("PingTimeout", err.to_string()),
            _ => Self::new("Irc", err.to_string()),
        }
    }
}

/// Errors returned to callers of the bridge API.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No connection is registered under this id
    #[error("Connection '{id}' does not exist")]
    NotFound { id: String },

    /// The engine is not joined to the requested channel
    #[error("Connection '{id}' is not joined to {channel}")]
    ChannelNotFound { id: String, channel: String },

    /// No joined channel lists this nickname and no hostmask is known for it
    #[error("Connection '{id}' has not seen user {nick}")]
    UserNotFound { id: String, nick: String },

    /// The operation needs an established connection
    #[error("Connection '{id}' is not connected")]
    NotConnected { id: String },

    /// A connect attempt is already running, or the connection is up
    #[error("Connection '{id}' is already connecting or connected")]
    AlreadyConnecting { id: String },

    #[error("Port must be between 1 and 65535, got {0}")]
    InvalidPort(u32),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// The event consumer has shut down
    #[error("Event dispatcher has been shut down")]
    DispatcherClosed,
}

/// Coarse classification of [`BridgeError`] for hosts that only care about
/// the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lookup,
    StatePrecondition,
    Validation,
    Transport,
    Handler,
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::NotFound { .. }
            | BridgeError::ChannelNotFound { .. }
            | BridgeError::UserNotFound { .. } => ErrorKind::Lookup,
            BridgeError::NotConnected { .. } | BridgeError::AlreadyConnecting { .. } => {
                ErrorKind::StatePrecondition
            }
            BridgeError::InvalidPort(_) | BridgeError::InvalidArgument(_) => ErrorKind::Validation,
            BridgeError::Transport(_) => ErrorKind::Transport,
            BridgeError::DispatcherClosed => ErrorKind::Handler,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
