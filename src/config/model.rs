//! Configuration data model.
//!
//! All structs derive `Serialize`/`Deserialize` for TOML persistence.
//! Every field has a default so an empty or missing file still works.

use serde::{Deserialize, Serialize};

use super::nickname::generate_nickname;
use crate::coordinator::{ConnectOptions, DEFAULT_PORT};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub defaults: ConnectDefaults,
    #[serde(default)]
    pub connections: Vec<ConnectionPreset>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values used when a preset leaves a field out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectDefaults {
    #[serde(default)]
    pub realname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_port")]
    pub port: u32,
    #[serde(default)]
    pub run_sync: bool,
}

impl Default for ConnectDefaults {
    fn default() -> Self {
        Self {
            realname: None,
            username: None,
            port: default_port(),
            run_sync: false,
        }
    }
}

/// One named connection the host can bring up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPreset {
    /// Connection id, e.g. `"libera"`.
    pub name: String,
    pub host: String,
    #[serde(default)]
    pub port: Option<u32>,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_nickname")]
    pub nickname: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub auto_connect: bool,
}

impl ConnectionPreset {
    pub fn port(&self, defaults: &ConnectDefaults) -> u32 {
        self.port.unwrap_or(defaults.port)
    }

    /// Connect options for this preset, falling back to `defaults`.
    pub fn options(&self, defaults: &ConnectDefaults) -> ConnectOptions {
        ConnectOptions {
            realname: self.realname.clone().or_else(|| defaults.realname.clone()),
            username: self.username.clone().or_else(|| defaults.username.clone()),
            password: self.password.clone(),
            tls: self.tls,
            run_sync: defaults.run_sync,
        }
    }
}

/// Diagnostics and event log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `"info"` or `"crabbridge=debug"`.
    #[serde(default = "default_level")]
    pub level: String,
    /// Write every delivered event to daily files under `log_dir`.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub log_raw_lines: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            enabled: false,
            log_dir: default_log_dir(),
            log_raw_lines: false,
        }
    }
}

fn default_nickname() -> String {
    generate_nickname()
}
fn default_port() -> u32 {
    DEFAULT_PORT
}
fn default_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> String {
    "~/.local/share/crabbridge/logs".to_string()
}
