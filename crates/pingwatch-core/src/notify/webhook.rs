use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use url::Url;
use uuid::Uuid;

use super::NotificationChannel;
use crate::error::{ConfigError, NotifyError};

pub const SIGNATURE_HEADER: &str = "X-Pingwatch-Signature-256";

/// The JSON envelope POSTed to a generic webhook (e.g. a spreadsheet script).
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub log: String,
}

impl WebhookPayload {
    pub fn new(text: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            log: text.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookChannel {
    client: Client,
    url: Url,
    secret: Option<String>,
}

impl WebhookChannel {
    pub fn new(url: &str, secret: Option<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let url = Url::parse(url).map_err(|e| ConfigError::Invalid {
            name: "notify.webhook_url",
            reason: format!("{} ({})", url, e),
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "http_client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            url,
            secret: secret.filter(|s| !s.is_empty()),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(&WebhookPayload::new(text)).map_err(|e| {
            NotifyError::Transport {
                channel: self.name(),
                reason: format!("failed to serialize payload: {}", e),
            }
        })?;

        let mut req = self
            .client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("pingwatch/", env!("CARGO_PKG_VERSION")));

        if let Some(secret) = &self.secret {
            req = req.header(SIGNATURE_HEADER, format!("sha256={}", sign_payload(&body, secret)));
        }

        match req.body(body).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(NotifyError::Rejected {
                channel: self.name(),
                status: resp.status().as_u16(),
            }),
            Err(e) => Err(NotifyError::Transport {
                channel: self.name(),
                reason: e.to_string(),
            }),
        }
    }
}

fn sign_payload(body: &[u8], secret: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn rejects_invalid_url() {
        let err = WebhookChannel::new("not a url", None, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "notify.webhook_url", .. }));
    }

    #[test]
    fn signature_is_deterministic_per_secret() {
        let sig1 = sign_payload(b"payload", "k1");
        assert_eq!(sig1, sign_payload(b"payload", "k1"));
        assert_ne!(sig1, sign_payload(b"payload", "k2"));
        assert_eq!(sig1.len(), 64);
    }

    #[tokio::test]
    async fn posts_log_field_with_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists(SIGNATURE_HEADER))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ch = WebhookChannel::new(
            &format!("{}/hook", server.uri()),
            Some("secret".into()),
            Duration::from_secs(5),
        )
        .unwrap();
        ch.deliver("rotated").await.unwrap();

        let received = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["log"], "rotated");
        assert!(body["id"].as_str().is_some());
    }

    #[tokio::test]
    async fn server_error_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ch = WebhookChannel::new(&server.uri(), None, Duration::from_secs(5)).unwrap();
        let err = ch.deliver("x").await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected { status: 500, .. }));
    }
}
