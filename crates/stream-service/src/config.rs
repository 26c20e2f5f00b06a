//! Stream service configuration.
//!
//! Configuration is loaded from environment variables. Every value has a
//! default, so an empty environment yields a working service.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default retrieval tool binary.
pub const DEFAULT_RETRIEVER_BIN: &str = "yt-dlp";

/// Default transcoder binary.
pub const DEFAULT_TRANSCODER_BIN: &str = "ffmpeg";

/// Prefix turning a free-text query into a single-result search reference.
pub const DEFAULT_RETRIEVER_SEARCH_PREFIX: &str = "ytsearch1:";

/// Download buffer size passed to the retrieval tool.
pub const DEFAULT_RETRIEVER_BUFFER_SIZE: &str = "16K";

/// Socket timeout passed to the retrieval tool, in seconds.
pub const DEFAULT_RETRIEVER_SOCKET_TIMEOUT_SECONDS: u64 = 10;

/// Time allowed for the retrieval stage to produce its first byte.
pub const DEFAULT_RETRIEVAL_STARTUP_TIMEOUT_SECONDS: u64 = 26;

/// Time allowed for a request to produce response headers. Must exceed the
/// retrieval startup timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Quality monitor tick period.
pub const DEFAULT_MONITOR_INTERVAL_SECONDS: u64 = 5;

/// Minimum time between committed quality changes.
pub const DEFAULT_QUALITY_COOLDOWN_SECONDS: u64 = 10;

/// Throughput samples kept per session.
pub const DEFAULT_SPEED_HISTORY_SIZE: usize = 10;

/// Chunks buffered between the transcode stage and the response body.
pub const DEFAULT_RELAY_CHANNEL_CAPACITY: usize = 16;

/// Time allowed for a duration lookup.
pub const DEFAULT_DURATION_LOOKUP_TIMEOUT_SECONDS: u64 = 15;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Stream service configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Path or name of the retrieval tool.
    pub retriever_bin: String,

    /// Path or name of the transcoder.
    pub transcoder_bin: String,

    /// Search prefix for non-URL queries (default: "ytsearch1:").
    pub retriever_search_prefix: String,

    /// Retrieval tool `--buffer-size` value.
    pub retriever_buffer_size: String,

    /// Retrieval tool `--socket-timeout` value, in seconds.
    pub retriever_socket_timeout_seconds: u64,

    /// Kill the retrieval stage if it produces nothing within this many seconds.
    pub retrieval_startup_timeout_seconds: u64,

    /// Upper bound on time to response headers (default: 30).
    pub request_timeout_seconds: u64,

    pub monitor_interval_seconds: u64,

    pub quality_cooldown_seconds: u64,

    pub speed_history_size: usize,

    /// Bounded response channel size, in chunks.
    pub relay_channel_capacity: usize,

    pub duration_lookup_timeout_seconds: u64,

    pub log_format: LogFormat,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("retriever_bin", &self.retriever_bin)
            .field("transcoder_bin", &self.transcoder_bin)
            .field("retriever_search_prefix", &self.retriever_search_prefix)
            .field("retriever_buffer_size", &self.retriever_buffer_size)
            .field(
                "retriever_socket_timeout_seconds",
                &self.retriever_socket_timeout_seconds,
            )
            .field(
                "retrieval_startup_timeout_seconds",
                &self.retrieval_startup_timeout_seconds,
            )
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("monitor_interval_seconds", &self.monitor_interval_seconds)
            .field("quality_cooldown_seconds", &self.quality_cooldown_seconds)
            .field("speed_history_size", &self.speed_history_size)
            .field("relay_channel_capacity", &self.relay_channel_capacity)
            .field(
                "duration_lookup_timeout_seconds",
                &self.duration_lookup_timeout_seconds,
            )
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid interval configuration: {0}")]
    InvalidInterval(String),

    #[error("Invalid size configuration: {0}")]
    InvalidSize(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let retriever_bin = non_empty(vars, "RETRIEVER_BIN", DEFAULT_RETRIEVER_BIN)?;
        let transcoder_bin = non_empty(vars, "TRANSCODER_BIN", DEFAULT_TRANSCODER_BIN)?;

        // An empty prefix is allowed: the query is then handed over verbatim.
        let retriever_search_prefix = vars
            .get("RETRIEVER_SEARCH_PREFIX")
            .cloned()
            .unwrap_or_else(|| DEFAULT_RETRIEVER_SEARCH_PREFIX.to_string());

        let retriever_buffer_size =
            non_empty(vars, "RETRIEVER_BUFFER_SIZE", DEFAULT_RETRIEVER_BUFFER_SIZE)?;

        let retriever_socket_timeout_seconds = positive_u64(
            vars,
            "RETRIEVER_SOCKET_TIMEOUT_SECONDS",
            DEFAULT_RETRIEVER_SOCKET_TIMEOUT_SECONDS,
            ConfigError::InvalidTimeout,
        )?;

        let retrieval_startup_timeout_seconds = positive_u64(
            vars,
            "RETRIEVAL_STARTUP_TIMEOUT_SECONDS",
            DEFAULT_RETRIEVAL_STARTUP_TIMEOUT_SECONDS,
            ConfigError::InvalidTimeout,
        )?;

        let request_timeout_seconds = positive_u64(
            vars,
            "REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
            ConfigError::InvalidTimeout,
        )?;

        // Startup failures are reported before the header timeout fires.
        if retrieval_startup_timeout_seconds >= request_timeout_seconds {
            return Err(ConfigError::InvalidTimeout(format!(
                "RETRIEVAL_STARTUP_TIMEOUT_SECONDS ({}) must be less than REQUEST_TIMEOUT_SECONDS ({})",
                retrieval_startup_timeout_seconds, request_timeout_seconds
            )));
        }

        let monitor_interval_seconds = positive_u64(
            vars,
            "MONITOR_INTERVAL_SECONDS",
            DEFAULT_MONITOR_INTERVAL_SECONDS,
            ConfigError::InvalidInterval,
        )?;

        let quality_cooldown_seconds = positive_u64(
            vars,
            "QUALITY_COOLDOWN_SECONDS",
            DEFAULT_QUALITY_COOLDOWN_SECONDS,
            ConfigError::InvalidInterval,
        )?;

        let speed_history_size = positive_usize(
            vars,
            "SPEED_HISTORY_SIZE",
            DEFAULT_SPEED_HISTORY_SIZE,
        )?;

        let relay_channel_capacity = positive_usize(
            vars,
            "RELAY_CHANNEL_CAPACITY",
            DEFAULT_RELAY_CHANNEL_CAPACITY,
        )?;

        let duration_lookup_timeout_seconds = positive_u64(
            vars,
            "DURATION_LOOKUP_TIMEOUT_SECONDS",
            DEFAULT_DURATION_LOOKUP_TIMEOUT_SECONDS,
            ConfigError::InvalidTimeout,
        )?;

        let log_format = match vars.get("LOG_FORMAT").map(|s| s.to_ascii_lowercase()) {
            None => LogFormat::Text,
            Some(value) if value == "text" => LogFormat::Text,
            Some(value) if value == "json" => LogFormat::Json,
            Some(value) => {
                return Err(ConfigError::InvalidValue(format!(
                    "LOG_FORMAT must be 'text' or 'json', got '{}'",
                    value
                )))
            }
        };

        Ok(Config {
            bind_address,
            retriever_bin,
            transcoder_bin,
            retriever_search_prefix,
            retriever_buffer_size,
            retriever_socket_timeout_seconds,
            retrieval_startup_timeout_seconds,
            request_timeout_seconds,
            monitor_interval_seconds,
            quality_cooldown_seconds,
            speed_history_size,
            relay_channel_capacity,
            duration_lookup_timeout_seconds,
            log_format,
        })
    }

    pub fn retrieval_startup_timeout(&self) -> Duration {
        Duration::from_secs(self.retrieval_startup_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_seconds)
    }

    pub fn quality_cooldown(&self) -> Duration {
        Duration::from_secs(self.quality_cooldown_seconds)
    }

    pub fn duration_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.duration_lookup_timeout_seconds)
    }
}

fn non_empty(
    vars: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    match vars.get(key) {
        None => Ok(default.to_string()),
        Some(value) if value.trim().is_empty() => Err(ConfigError::InvalidValue(format!(
            "{} must not be empty",
            key
        ))),
        Some(value) => Ok(value.clone()),
    }
}

fn positive_u64(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
    err: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        err(format!(
            "{} must be a valid positive integer, got '{}': {}",
            key, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(err(format!("{} must be greater than 0", key)));
    }

    Ok(value)
}

fn positive_usize(
    vars: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: usize = value_str.parse().map_err(|e| {
        ConfigError::InvalidSize(format!(
            "{} must be a valid positive integer, got '{}': {}",
            key, value_str, e
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidSize(format!(
            "{} must be greater than 0",
            key
        )));
    }

    Ok(value)
}
