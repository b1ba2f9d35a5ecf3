use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::NotificationChannel;
use crate::error::{ConfigError, NotifyError};

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage` channel.
#[derive(Clone)]
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramChannel {
    /// Both credentials are required; a missing or blank one is a startup error.
    pub fn new(
        token: Option<String>,
        chat_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let token = required(token, "TELEGRAM_TOKEN")?;
        let chat_id = required(chat_id, "TELEGRAM_CHAT_ID")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                name: "http_client",
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            token,
            chat_id,
        })
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

impl fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("api_base", &self.api_base)
            .field("token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::Missing(name)),
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn deliver(&self, text: &str) -> Result<(), NotifyError> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
        };

        match self.client.post(self.endpoint()).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(NotifyError::Rejected {
                channel: self.name(),
                status: resp.status().as_u16(),
            }),
            // reqwest errors include the URL, which embeds the token
            Err(e) => Err(NotifyError::Transport {
                channel: self.name(),
                reason: e.without_url().to_string(),
            }),
        }
    }
}
