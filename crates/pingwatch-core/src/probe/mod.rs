mod http;

pub use http::HttpProber;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use url::Url;

use crate::error::ProbeError;
use crate::logwatch::LogGrowthMonitor;
use crate::source::Source;

/// Trait for issuing a single reachability request.
///
/// Returns the response status for any HTTP response, whatever its class.
/// Only transport-level problems are errors.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn fetch_status(&self, url: &Url) -> Result<u16, ProbeError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Success(u16),
    Failure(String),
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(status) => write!(f, "-> {}", status),
            Self::Failure(reason) => write!(f, "error: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub source: Source,
    pub timestamp: DateTime<Utc>,
    pub result: ProbeResult,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, ProbeResult::Success(_))
    }

    /// Single line written to the probe log, without trailing newline.
    pub fn log_line(&self) -> String {
        format!(
            "{} {} {}",
            self.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            self.source.endpoint,
            self.result
        )
    }
}

/// Runs one probe and records its outcome in the probe log.
pub struct ProbeDispatcher {
    transport: Arc<dyn ProbeTransport>,
    log: Arc<LogGrowthMonitor>,
}

impl ProbeDispatcher {
    pub fn new(transport: Arc<dyn ProbeTransport>, log: Arc<LogGrowthMonitor>) -> Self {
        Self { transport, log }
    }

    pub fn log(&self) -> &Arc<LogGrowthMonitor> {
        &self.log
    }

    pub async fn probe(&self, source: &Source) -> ProbeOutcome {
        let result = match self.transport.fetch_status(&source.endpoint).await {
            Ok(status) => {
                debug!(url = %source.endpoint, status, "Probe completed");
                ProbeResult::Success(status)
            }
            Err(e) => {
                warn!(url = %source.endpoint, error = %e, "Probe failed");
                ProbeResult::Failure(e.to_string())
            }
        };

        let outcome = ProbeOutcome {
            source: source.clone(),
            timestamp: Utc::now(),
            result,
        };
        self.log.record(&outcome.log_line()).await;
        outcome
    }
}
