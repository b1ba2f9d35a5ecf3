use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What the scheduler does when a source comes due while its previous probe is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Fire anyway; overlapping probes of one source are accepted.
    #[default]
    Allow,
    /// Skip this occurrence but keep the source scheduled.
    SkipInFlight,
}

/// Scheduler and probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Cadence of the tick loop; bounds how late a probe can fire (default: 1s).
    pub tick_period: Duration,
    /// Upper bound on a single probe request (default: 5s).
    pub probe_timeout: Duration,
    pub overlap_policy: OverlapPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(5),
            overlap_policy: OverlapPolicy::Allow,
        }
    }
}

impl MonitorConfig {
    pub fn with_tick_period(mut self, ms: u64) -> Self {
        self.tick_period = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_probe_timeout(mut self, ms: u64) -> Self {
        self.probe_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }
}

/// Probe log location and rotation thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub path: PathBuf,
    /// Nominal capacity of the log in bytes (default: 5 MiB).
    pub max_size: u64,
    /// Fraction of `max_size` above which the log is rotated (default: 0.9).
    pub threshold_ratio: f64,
    /// Minimum time between two rotation notices (default: 1h).
    pub cooldown: Duration,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("pingwatch.log"),
            max_size: 5 * 1024 * 1024,
            threshold_ratio: 0.9,
            cooldown: Duration::from_secs(60 * 60),
        }
    }
}

impl LogConfig {
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size = bytes;
        self
    }

    pub fn with_threshold_ratio(mut self, ratio: f64) -> Self {
        self.threshold_ratio = ratio;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Size in bytes the log must exceed before it is rotated.
    pub fn threshold_bytes(&self) -> u64 {
        (self.max_size as f64 * self.threshold_ratio) as u64
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid {
                name: "log.max_size",
                reason: "must be greater than zero".into(),
            });
        }
        if !(self.threshold_ratio > 0.0 && self.threshold_ratio <= 1.0) {
            return Err(ConfigError::Invalid {
                name: "log.threshold_ratio",
                reason: format!("must be in (0, 1], got {}", self.threshold_ratio),
            });
        }
        Ok(())
    }
}

/// Delivery policy shared by every notification channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total delivery attempts, including the first (default: 3).
    pub max_attempts: u32,
    /// Bound on each individual attempt (default: 5s).
    pub attempt_timeout: Duration,
    /// Base backoff between attempts, doubled each retry.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_attempt_timeout(mut self, ms: u64) -> Self {
        self.attempt_timeout = Duration::from_millis(ms.max(1));
        self
    }

    pub fn with_base_backoff(mut self, ms: u64) -> Self {
        self.base_backoff = Duration::from_millis(ms);
        self
    }

    /// Sleep before the given attempt (0-based). The first attempt never waits.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_backoff * 2u32.saturating_pow(attempt - 1)
    }
}
