use std::env;
use std::time::Duration;

use crate::storage::clamp_ttl;

/// Session records expire six hours after the last write or non-empty read.
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 6 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub kv_url: Option<String>,
    pub kv_token: Option<String>,
    pub session_ttl_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub verify_attempts: u32,
    pub verify_delay_ms: u64,
    pub read_retry_delay_ms: u64,
}

/// Which store the process runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    Redis { url: String, token: String },
    Memory,
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed("WAYPOINT_PORT").unwrap_or(defaults.port),
            kv_url: non_blank("WAYPOINT_KV_URL"),
            kv_token: non_blank("WAYPOINT_KV_TOKEN"),
            session_ttl_seconds: parsed("WAYPOINT_SESSION_TTL")
                .unwrap_or(defaults.session_ttl_seconds),
            sweep_interval_seconds: parsed("WAYPOINT_SWEEP_INTERVAL")
                .unwrap_or(defaults.sweep_interval_seconds),
            verify_attempts: parsed("WAYPOINT_VERIFY_ATTEMPTS").unwrap_or(defaults.verify_attempts),
            verify_delay_ms: parsed("WAYPOINT_VERIFY_DELAY_MS").unwrap_or(defaults.verify_delay_ms),
            read_retry_delay_ms: parsed("WAYPOINT_READ_RETRY_DELAY_MS")
                .unwrap_or(defaults.read_retry_delay_ms),
        }
    }

    /// The networked store is used only when both its URL and token are configured.
    pub fn store_backend(&self) -> BackendChoice {
        match (&self.kv_url, &self.kv_token) {
            (Some(url), Some(token)) => BackendChoice::Redis {
                url: url.clone(),
                token: token.clone(),
            },
            _ => BackendChoice::Memory,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        clamp_ttl(Duration::from_secs(self.session_ttl_seconds))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            kv_url: None,
            kv_token: None,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            sweep_interval_seconds: 60,
            verify_attempts: 3,
            verify_delay_ms: 25,
            read_retry_delay_ms: 50,
        }
    }
}

fn non_blank(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.trim().parse().ok())
}
