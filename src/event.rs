//! Canonical event model: what the host sees, what engines emit, and the
//! table that maps one onto the other.

/// Lifecycle of one named connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
}

/// An event delivered to the host handler, tagged with the id of the
/// connection it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub id: String,
    pub kind: EventKind,
}

impl CanonicalEvent {
    pub fn new(id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Transport is up and registration has been sent
    Connected { server: String, port: u16 },
    /// Connection closed; `clean` is true when we asked for it
    Disconnected { clean: bool },
    /// Server accepted registration (RPL_WELCOME)
    Welcomed,
    Joined { who: String, channel: String },
    Parted { who: String, channel: String },
    Quit { who: String, message: String },
    NickChanged { old: String, new: String },
    NickInUse { nick: String },
    PrivMsg { who: String, target: String, message: String },
    /// CTCP ACTION (`/me`)
    Action { who: String, target: String, message: String },
    /// Any numeric reply without a dedicated variant
    Numeric {
        code: u16,
        name: String,
        args: Vec<String>,
        message: String,
    },
    /// Every line received, verbatim
    RawLine { line: String },
    /// Server-sent ERROR
    ProtocolError { message: String },
    /// A connect or send attempt failed at the transport level
    ConnectionFailure { kind: String, message: String },
}

impl EventKind {
    /// Host-facing event name, suitable for binding handlers by name.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Connected { .. } => "irc_connected",
            EventKind::Disconnected { .. } => "irc_disconnected",
            EventKind::Welcomed => "irc_welcomed",
            EventKind::Joined { .. } => "irc_joined",
            EventKind::Parted { .. } => "irc_parted",
            EventKind::Quit { .. } => "irc_quit",
            EventKind::NickChanged { .. } => "irc_nick_changed",
            EventKind::NickInUse { .. } => "irc_nick_in_use",
            EventKind::PrivMsg { .. } => "irc_msg",
            EventKind::Action { .. } => "irc_action",
            EventKind::Numeric { .. } => "irc_numeric",
            EventKind::RawLine { .. } => "irc_recv_raw",
            EventKind::ProtocolError { .. } => "irc_error",
            EventKind::ConnectionFailure { .. } => "irc_connection_exception",
        }
    }

    /// The connection state this event forces, if any.
    pub fn implied_state(&self) -> Option<ConnectionState> {
        match self {
            EventKind::Connected { .. } => Some(ConnectionState::Connected),
            EventKind::Disconnected { .. } | EventKind::ProtocolError { .. } => {
                Some(ConnectionState::Disconnected)
            }
            _ => None,
        }
    }
}

/// Events as an engine reports them, before translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    Connected { server: String, port: u16 },
    Disconnected { clean: bool },
    Welcome,
    Join { who: String, channel: String },
    Part { who: String, channel: String },
    Quit { who: String, message: String },
    Nick { old: String, new: String },
    NickInUse { nick: String },
    Privmsg { who: String, target: String, message: String },
    /// Any CTCP request; only ACTION has a canonical counterpart
    Ctcp {
        who: String,
        target: String,
        command: String,
        message: String,
    },
    Numeric {
        code: u16,
        name: String,
        args: Vec<String>,
        message: String,
    },
    Line(String),
    Error(String),
    /// Something the engine saw but could not classify
    Unrecognized { kind: String },
}

/// Map a raw engine event onto its canonical variant.
///
/// Returns `None` for events the host never sees: unrecognized kinds (logged
/// as a warning) and CTCP requests other than ACTION.
pub fn translate(id: &str, raw: RawEvent) -> Option<EventKind> {
    let kind = match raw {
        RawEvent::Connected { server, port } => EventKind::Connected { server, port },
        RawEvent::Disconnected { clean } => EventKind::Disconnected { clean },
        RawEvent::Welcome => EventKind::Welcomed,
        RawEvent::Join { who, channel } => EventKind::Joined { who, channel },
        RawEvent::Part { who, channel } => EventKind::Parted { who, channel },
        RawEvent::Quit { who, message } => EventKind::Quit { who, message },
        RawEvent::Nick { old, new } => EventKind::NickChanged { old, new },
        RawEvent::NickInUse { nick } => EventKind::NickInUse { nick },
        RawEvent::Privmsg {
            who,
            target,
            message,
        } => EventKind::PrivMsg {
            who,
            target,
            message,
        },
        RawEvent::Ctcp {
            who,
            target,
            command,
            message,
        } => {
            if !command.eq_ignore_ascii_case("ACTION") {
                tracing::debug!(id, command = %command, from = %who, "ignoring CTCP request");
                return None;
            }
            EventKind::Action {
                who,
                target,
                message,
            }
        }
        RawEvent::Numeric {
            code,
            name,
            args,
            message,
        } => EventKind::Numeric {
            code,
            name,
            args,
            message,
        },
        RawEvent::Line(line) => EventKind::RawLine { line },
        RawEvent::Error(message) => EventKind::ProtocolError { message },
        RawEvent::Unrecognized { kind } => {
            tracing::warn!(id, kind = %kind, "dropping unrecognized engine event");
            return None;
        }
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_privmsg() {
        let kind = translate(
            "bridge",
            RawEvent::Privmsg {
                who: "alice".into(),
                target: "#rust".into(),
                message: "hi".into(),
            },
        );
        assert_eq!(
            kind,
            Some(EventKind::PrivMsg {
                who: "alice".into(),
                target: "#rust".into(),
                message: "hi".into(),
            })
        );
    }

    #[test]
    fn test_translate_ctcp_action_only() {
        let action = RawEvent::Ctcp {
            who: "bob".into(),
            target: "#rust".into(),
            command: "ACTION".into(),
            message: "waves".into(),
        };
        assert!(matches!(
            translate("bridge", action),
            Some(EventKind::Action { ref message, .. }) if message == "waves"
        ));

        let version = RawEvent::Ctcp {
            who: "bob".into(),
            target: "me".into(),
            command: "VERSION".into(),
            message: String::new(),
        };
        assert_eq!(translate("bridge", version), None);
    }

    #[test]
    fn test_translate_unrecognized_is_dropped() {
        let raw = RawEvent::Unrecognized {
            kind: "BATCH".into(),
        };
        assert_eq!(translate("bridge", raw), None);
    }

    #[test]
    fn test_event_names_and_states() {
        assert_eq!(EventKind::Welcomed.name(), "irc_welcomed");
        let failure = EventKind::ConnectionFailure {
            kind: "Io".into(),
            message: "boom".into(),
        };
        assert_eq!(failure.name(), "irc_connection_exception");
        assert_eq!(failure.implied_state(), None);
        assert_eq!(
            EventKind::Disconnected { clean: false }.implied_state(),
            Some(ConnectionState::Disconnected)
        );
        assert_eq!(
            EventKind::ProtocolError {
                message: "Closing link".into()
            }
            .implied_state(),
            Some(ConnectionState::Disconnected)
        );
    }
}
