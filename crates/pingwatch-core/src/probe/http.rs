use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::Client;
use url::Url;

use super::ProbeTransport;
use crate::config::MonitorConfig;
use crate::error::{ConfigError, ProbeError};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP GET prober with a browser-like header set and a hard timeout.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            client: Self::build_client(timeout)?,
            timeout,
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        Self::new(config.probe_timeout)
    }

    pub fn build_client(timeout: Duration) -> Result<Client, ConfigError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "http_client",
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl ProbeTransport for HttpProber {
    async fn fetch_status(&self, url: &Url) -> Result<u16, ProbeError> {
        match self.client.get(url.clone()).send().await {
            Ok(response) => Ok(response.status().as_u16()),
            Err(e) if e.is_timeout() => Err(ProbeError::Timeout {
                timeout: self.timeout,
            }),
            Err(e) => Err(ProbeError::Transport {
                reason: e.to_string(),
            }),
        }
    }
}
