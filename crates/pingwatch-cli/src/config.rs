//! TOML configuration file schema and parsing.
//!
//! Every section and key is optional. Example config file:
//!
//! ```toml
//! [general]
//! log_format = "json"
//! sources_file = "sources.json"
//! env_file = ".env"
//!
//! [monitor]
//! tick_period_ms = 1000
//! probe_timeout_ms = 5000
//! overlap_policy = "skip_in_flight"
//!
//! [log]
//! path = "/var/log/pingwatch/probes.log"
//! max_size_bytes = 5242880
//! threshold_ratio = 0.9
//! cooldown_secs = 3600
//!
//! [notify]
//! backend = "webhook"
//! webhook_url = "https://script.example.com/exec"
//! max_attempts = 3
//! ```
//!
//! Credentials are never read from this file: `TELEGRAM_TOKEN`,
//! `TELEGRAM_CHAT_ID` and `WEBHOOK_SECRET` come from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use pingwatch_core::{LogConfig, MonitorConfig, OverlapPolicy, RetryPolicy};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub log: LogSection,

    #[serde(default)]
    pub notify: NotifySection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default = "default_sources_file")]
    pub sources_file: PathBuf,

    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            sources_file: default_sources_file(),
            env_file: default_env_file(),
        }
    }
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_sources_file() -> PathBuf {
    PathBuf::from("sources.json")
}

fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MonitorSection {
    pub tick_period_ms: Option<u64>,
    pub probe_timeout_ms: Option<u64>,
    pub overlap_policy: Option<OverlapPolicy>,
}

impl MonitorSection {
    pub fn to_monitor_config(&self) -> MonitorConfig {
        let mut c = MonitorConfig::default();
        if let Some(v) = self.tick_period_ms {
            c = c.with_tick_period(v);
        }
        if let Some(v) = self.probe_timeout_ms {
            c = c.with_probe_timeout(v);
        }
        if let Some(v) = self.overlap_policy {
            c = c.with_overlap_policy(v);
        }
        c
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSection {
    pub path: Option<PathBuf>,
    pub max_size_bytes: Option<u64>,
    pub threshold_ratio: Option<f64>,
    pub cooldown_secs: Option<u64>,
}

impl LogSection {
    pub fn to_log_config(&self) -> LogConfig {
        let mut c = LogConfig::default();
        if let Some(ref p) = self.path {
            c = c.with_path(p.clone());
        }
        if let Some(v) = self.max_size_bytes {
            c = c.with_max_size(v);
        }
        if let Some(v) = self.threshold_ratio {
            c = c.with_threshold_ratio(v);
        }
        if let Some(v) = self.cooldown_secs {
            c = c.with_cooldown(Duration::from_secs(v));
        }
        c
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyBackend {
    #[default]
    Telegram,
    Webhook,
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifySection {
    #[serde(default)]
    pub backend: NotifyBackend,
    pub webhook_url: Option<String>,
    pub max_attempts: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub retry_backoff_ms: Option<u64>,
}

impl NotifySection {
    pub fn to_retry_policy(&self) -> RetryPolicy {
        let mut p = RetryPolicy::default();
        if let Some(v) = self.max_attempts {
            p = p.with_max_attempts(v);
        }
        if let Some(v) = self.timeout_ms {
            p = p.with_attempt_timeout(v);
        }
        if let Some(v) = self.retry_backoff_ms {
            p = p.with_base_backoff(v);
        }
        p
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        match self.general.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        self.log.to_log_config().validate().map_err(|e| e.to_string())?;

        if self.notify.max_attempts == Some(0) {
            return Err("notify.max_attempts must be at least 1".into());
        }

        if let Some(ref wh) = self.notify.webhook_url {
            url::Url::parse(wh).map_err(|e| format!("Invalid webhook URL: {} ({})", wh, e))?;
        }
        if self.notify.backend == NotifyBackend::Webhook && self.notify.webhook_url.is_none() {
            return Err("notify.backend = \"webhook\" requires notify.webhook_url".into());
        }

        Ok(())
    }
}
