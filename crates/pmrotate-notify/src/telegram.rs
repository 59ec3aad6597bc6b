//! Telegram alert backend

use crate::error::{NotifyError, Result};
use crate::event::RotationEvent;
use crate::Notifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Sends alerts through the Telegram Bot API
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            bot_token,
            chat_id,
            client,
        }
    }

    fn api_url(&self) -> String {
        format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn send(&self, event: &RotationEvent) -> Result<()> {
        if !self.is_configured() {
            return Err(NotifyError::NotConfigured);
        }

        let text = event.format_message();
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text: &text,
            parse_mode: "Markdown",
        };

        debug!("Sending {} alert to Telegram chat {}", event.event_type(), self.chat_id);

        let response = self.client.post(self.api_url()).json(&request).send().await?;
        let status = response.status();
        let body: TelegramResponse = response.json().await?;

        if body.ok {
            Ok(())
        } else {
            Err(NotifyError::telegram(
                body.description
                    .unwrap_or_else(|| format!("HTTP {}", status)),
            ))
        }
    }

    fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}
