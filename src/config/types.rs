use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Largest retention bound the viewer accepts.
pub const MAX_LOGS_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7300".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub prefer: RuntimePreference,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimePreference {
    #[default]
    Auto,
    Docker,
    Podman,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Lines of history replayed when a start request omits `tail`
    #[serde(default = "default_tail")]
    pub default_tail: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            default_tail: default_tail(),
        }
    }
}

fn default_tail() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_flush_interval", with = "humantime_serde")]
    pub flush_interval: Duration,
    #[serde(default = "default_reconnect_delay", with = "humantime_serde")]
    pub reconnect_delay: Duration,
    /// 0 means unbounded
    #[serde(default = "default_max_logs")]
    pub max_logs: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            flush_interval: default_flush_interval(),
            reconnect_delay: default_reconnect_delay(),
            max_logs: default_max_logs(),
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:7300/ws".to_string()
}

fn default_flush_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_max_logs() -> usize {
    MAX_LOGS_LIMIT
}
