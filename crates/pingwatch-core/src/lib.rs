#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logwatch;
pub mod notify;
pub mod probe;
pub mod scheduler;
pub mod source;

pub use config::{LogConfig, MonitorConfig, OverlapPolicy, RetryPolicy};
pub use error::{ConfigError, NotifyError, ProbeError, RegistryError, SourceError};
pub use logwatch::{LogCheck, LogGrowthMonitor, LogState};
pub use notify::{NotificationChannel, Notifier, TelegramChannel, WebhookChannel, WebhookPayload};
pub use probe::{HttpProber, ProbeDispatcher, ProbeOutcome, ProbeResult, ProbeTransport};
pub use scheduler::{IntervalScheduler, ScheduledEntry};
pub use source::{Source, SourceRecord, SourceRegistry};
