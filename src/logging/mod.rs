//! Diagnostics and event logging.
//!
//! [`init_tracing`] installs the process-wide `tracing` subscriber.
//! [`EventLogger`] writes delivered events to daily log files, one file per
//! connection per day, named `<id>_<date>.log` and stored in the configured
//! log directory (default: `~/.local/share/crabbridge/logs/`).

use crate::config::LoggingConfig;
use crate::event::{CanonicalEvent, EventKind};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Overrides `logging.level` when set.
pub const LOG_ENV: &str = "CRABBRIDGE_LOG";

/// Install a stderr `fmt` subscriber filtered by [`LOG_ENV`] or, failing
/// that, by the configured level.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let directive = std::env::var(LOG_ENV).unwrap_or_else(|_| config.level.clone());
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter {:?}", directive))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Writes delivered events to per-connection daily log files.
///
/// File handles are cached for the lifetime of the logger. A file that
/// cannot be opened is reported once and its lines are skipped.
pub struct EventLogger {
    enabled: bool,
    log_dir: PathBuf,
    log_raw_lines: bool,
    file_handles: HashMap<String, Option<fs::File>>,
}

impl EventLogger {
    pub fn new(config: &LoggingConfig) -> Self {
        Self {
            enabled: config.enabled,
            log_dir: expand_home(&config.log_dir),
            log_raw_lines: config.log_raw_lines,
            file_handles: HashMap::new(),
        }
    }

    pub fn log_event(&mut self, event: &CanonicalEvent) {
        if !self.enabled {
            return;
        }
        let Some(text) = format_event(&event.kind, self.log_raw_lines) else {
            return;
        };

        let timestamp = chrono::Local::now();
        let line = format!("[{}] {}", timestamp.format("%H:%M:%S"), text);
        let filename = format!("{}_{}.log", safe_name(&event.id), timestamp.format("%Y-%m-%d"));

        let log_dir = &self.log_dir;
        let handle = self.file_handles.entry(filename.clone()).or_insert_with(|| {
            let _ = fs::create_dir_all(log_dir);
            let path = log_dir.join(&filename);
            match OpenOptions::new().create(true).append(true).open(&path) {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!("cannot open event log {}: {}", path.display(), e);
                    None
                }
            }
        });

        if let Some(file) = handle {
            let _ = writeln!(file, "{}", line);
        }
    }
}

fn safe_name(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

fn format_event(kind: &EventKind, raw_lines: bool) -> Option<String> {
    let text = match kind {
        EventKind::Connected { server, port } => format!("*** Connected to {}:{}", server, port),
        EventKind::Disconnected { clean } => {
            format!("*** Disconnected{}", if *clean { "" } else { " (connection lost)" })
        }
        EventKind::Welcomed => "*** Registered".to_string(),
        EventKind::Joined { who, channel } => format!("*** {} joined {}", who, channel),
        EventKind::Parted { who, channel } => format!("*** {} left {}", who, channel),
        EventKind::Quit { who, message } => format!("*** {} quit ({})", who, message),
        EventKind::NickChanged { old, new } => format!("*** {} is now known as {}", old, new),
        EventKind::NickInUse { nick } => format!("!!! Nickname {} is in use", nick),
        EventKind::PrivMsg {
            who,
            target,
            message,
        } => format!("{} <{}> {}", target, who, message),
        EventKind::Action {
            who,
            target,
            message,
        } => format!("{} * {} {}", target, who, message),
        EventKind::Numeric {
            code,
            name,
            message,
            ..
        } => format!("{:03} {} {}", code, name, message),
        EventKind::RawLine { line } if raw_lines => format!(">> {}", line),
        EventKind::RawLine { .. } => return None,
        EventKind::ProtocolError { message } => format!("!!! {}", message),
        EventKind::ConnectionFailure { kind, message } => {
            format!("!!! Connection failed ({}): {}", kind, message)
        }
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/var/log/x"), PathBuf::from("/var/log/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/logs"), home.join("logs"));
        }
    }

    #[test]
    fn test_safe_name() {
        assert_eq!(safe_name("libera"), "libera");
        assert_eq!(safe_name("a/b c"), "a_b_c");
    }

    #[test]
    fn test_format_event() {
        let msg = EventKind::PrivMsg {
            who: "alice".into(),
            target: "#rust".into(),
            message: "hi".into(),
        };
        assert_eq!(format_event(&msg, false).unwrap(), "#rust <alice> hi");

        let raw = EventKind::RawLine {
            line: "PING :x".into(),
        };
        assert!(format_event(&raw, false).is_none());
        assert_eq!(format_event(&raw, true).unwrap(), ">> PING :x");
    }

    #[test]
    fn test_logger_writes_daily_file() {
        let dir = std::env::temp_dir().join(format!("crabbridge-log-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        let config = LoggingConfig {
            enabled: true,
            log_dir: dir.to_string_lossy().into_owned(),
            ..LoggingConfig::default()
        };

        let mut logger = EventLogger::new(&config);
        logger.log_event(&CanonicalEvent::new(
            "libera",
            EventKind::Joined {
                who: "crab".into(),
                channel: "#rust".into(),
            },
        ));
        logger.log_event(&CanonicalEvent::new(
            "libera",
            EventKind::RawLine {
                line: "skipped".into(),
            },
        ));
        drop(logger);

        let date = chrono::Local::now().format("%Y-%m-%d");
        let contents = fs::read_to_string(dir.join(format!("libera_{}.log", date))).unwrap();
        assert!(contents.contains("*** crab joined #rust"));
        assert!(!contents.contains("skipped"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("crabbridge-nolog-{}", std::process::id()));
        let config = LoggingConfig {
            enabled: false,
            log_dir: dir.to_string_lossy().into_owned(),
            ..LoggingConfig::default()
        };
        let mut logger = EventLogger::new(&config);
        logger.log_event(&CanonicalEvent::new("x", EventKind::Welcomed));
        assert!(!dir.exists());
    }
}
