use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::alerts::AlertRule;
use crate::util;

/// Dashboard configuration
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Address the HTTP/WebSocket server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port the HTTP/WebSocket server binds to (0 picks a free port)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Scheduler tick interval in milliseconds
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Points kept per metric series
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Maximum time a component may take to report its metrics
    #[serde(default = "default_component_timeout_ms")]
    pub component_timeout_ms: u64,

    /// Alert history entries kept in memory
    #[serde(default = "default_alert_history_limit")]
    pub alert_history_limit: usize,

    /// Outbound messages buffered per WebSocket client before drops
    #[serde(default = "default_client_buffer")]
    pub client_buffer: usize,

    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Directory served at `/` instead of the built-in page
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    #[serde(default = "AlertRule::defaults")]
    pub alerts: Vec<AlertRule>,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

fn default_update_interval_ms() -> u64 {
    5000
}

fn default_history_size() -> usize {
    100
}

fn default_component_timeout_ms() -> u64 {
    2000
}

fn default_alert_history_limit() -> usize {
    1000
}

fn default_client_buffer() -> usize {
    256
}

fn default_enable_cors() -> bool {
    true
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            update_interval_ms: default_update_interval_ms(),
            history_size: default_history_size(),
            component_timeout_ms: default_component_timeout_ms(),
            alert_history_limit: default_alert_history_limit(),
            client_buffer: default_client_buffer(),
            enable_cors: default_enable_cors(),
            static_dir: None,
            alerts: AlertRule::defaults(),
        }
    }
}

/// Errors raised while loading or validating configuration
#[derive(Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    Io { path: PathBuf, source: std::io::Error },

    /// The configuration file is not valid TOML for this schema
    Parse { path: PathBuf, message: String },

    /// A value is out of range
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "failed to read config file {}: {source}", path.display())
            }
            ConfigError::Parse { path, message } => {
                write!(f, "failed to parse config file {}: {message}", path.display())
            }
            ConfigError::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl DashboardConfig {
    /// Load configuration from a TOML file, or use defaults if none is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Parse {
                path: PathBuf::new(),
                message: e.to_string(),
            })
            .inspect(|config| trace!("loaded config: {config:?}"))
    }

    /// Override values from `DASHBOARD_*` environment variables
    pub fn apply_env(&mut self) {
        if let Some(port) = util::get_port() {
            self.port = port;
        }
        if let Some(addr) = util::get_addr() {
            self.bind_addr = addr;
        }
        if let Some(interval) = util::get_update_interval_ms() {
            self.update_interval_ms = interval;
        }
        if let Some(history_size) = util::get_history_size() {
            self.history_size = history_size;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_size == 0 {
            return Err(ConfigError::Invalid("history_size must be at least 1".into()));
        }
        if self.update_interval_ms == 0 {
            return Err(ConfigError::Invalid("update_interval_ms must be at least 1".into()));
        }
        if self.component_timeout_ms == 0 {
            return Err(ConfigError::Invalid("component_timeout_ms must be at least 1".into()));
        }
        if self.client_buffer == 0 {
            return Err(ConfigError::Invalid("client_buffer must be at least 1".into()));
        }
        if self.alert_history_limit == 0 {
            return Err(ConfigError::Invalid("alert_history_limit must be at least 1".into()));
        }

        let mut seen = HashSet::new();
        for rule in &self.alerts {
            if rule.window == 0 {
                return Err(ConfigError::Invalid(format!(
                    "alert rule {} must average at least one sample",
                    rule.id
                )));
            }
            if !seen.insert(rule.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate alert rule id {}", rule.id)));
            }
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    pub fn component_timeout(&self) -> Duration {
        Duration::from_millis(self.component_timeout_ms)
    }
}
