use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Rejection of a source at registration time. Never scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Invalid source {endpoint}: interval must be positive, got {interval_secs}s")]
    NonPositiveInterval { endpoint: String, interval_secs: i64 },
    #[error("Invalid source {endpoint}: interval {interval_secs}s exceeds the maximum of {max_secs}s")]
    IntervalTooLarge {
        endpoint: String,
        interval_secs: u64,
        max_secs: u64,
    },
    #[error("Invalid source endpoint {endpoint}: {reason}")]
    MalformedEndpoint { endpoint: String, reason: String },
}

/// Transport-level failure of a single probe. Recorded as a failed outcome, never propagated.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },
    #[error("{reason}")]
    Transport { reason: String },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{channel} returned HTTP {status}")]
    Rejected { channel: &'static str, status: u16 },
    #[error("{channel} request failed: {reason}")]
    Transport { channel: &'static str, reason: String },
    #[error("{channel} attempt timed out after {}ms", timeout.as_millis())]
    Timeout { channel: &'static str, timeout: Duration },
    #[error("Notification not delivered after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Missing or invalid settings, fatal at startup before any scheduling begins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("Invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to access sources file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse sources file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize sources for {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    InvalidSource(#[from] SourceError),
}
