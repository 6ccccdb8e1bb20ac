//! Telegram Bot API notifier
//!
//! - sendMessage: JSON body `{chat_id, text}`
//! - sendPhoto: multipart upload with `chat_id`, `caption` and `photo`
//!
//! Every response carries `{"ok": bool, "description": ...}`; `ok == false`
//! is a rejection even when the HTTP status is 200.

use crate::infra::config::Config;
use crate::io::notifier::{DeliveryError, Notifier};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Log a rejected API call (cold path)
#[cold]
fn log_api_rejected(method: &str, status: u16, description: &str) {
    error!(method = %method, status = %status, description = %description, "telegram_api_rejected");
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Long-lived Telegram client; the HTTP client is created once and reused
/// (connection pooling)
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.telegram_timeout_secs()))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: config.telegram_api_url().trim_end_matches('/').to_string(),
            bot_token: config.telegram_bot_token().to_string(),
            chat_id: config.telegram_chat_id().to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    fn check_configured(&self) -> Result<(), DeliveryError> {
        if self.bot_token.is_empty() {
            return Err(DeliveryError::NotConfigured("bot token is empty"));
        }
        if self.chat_id.is_empty() {
            return Err(DeliveryError::NotConfigured("chat id is empty"));
        }
        Ok(())
    }

    /// Interpret an API response. The request URL contains the bot token,
    /// so it is stripped from transport errors before they travel further.
    async fn check_response(
        method: &str,
        result: reqwest::Result<reqwest::Response>,
    ) -> Result<(), DeliveryError> {
        let response = result.map_err(|e| DeliveryError::Http(e.without_url()))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| DeliveryError::Http(e.without_url()))?;

        let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();
        let ok = status.is_success() && parsed.as_ref().map(|r| r.ok).unwrap_or(false);
        if ok {
            return Ok(());
        }

        let description = parsed
            .and_then(|r| r.description)
            .unwrap_or_else(|| body.chars().take(200).collect());
        log_api_rejected(method, status.as_u16(), &description);
        Err(DeliveryError::Rejected { status: status.as_u16(), description })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_error(&self, text: &str) -> Result<(), DeliveryError> {
        self.check_configured()?;
        let start = Instant::now();

        let payload = SendMessage { chat_id: &self.chat_id, text };
        let result = self.client.post(self.method_url("sendMessage")).json(&payload).send().await;
        Self::check_response("sendMessage", result).await?;

        info!(
            chat_id = %self.chat_id,
            latency_ms = %start.elapsed().as_millis(),
            "telegram_message_sent"
        );
        Ok(())
    }

    async fn send_image(&self, path: &Path, caption: &str) -> Result<(), DeliveryError> {
        self.check_configured()?;
        if !path.is_file() {
            return Err(DeliveryError::MissingImage(path.to_path_buf()));
        }
        let start = Instant::now();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| DeliveryError::ReadImage { path: path.to_path_buf(), source })?;
        let size = bytes.len();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "image.jpg".to_string());

        let photo = Part::bytes(bytes).file_name(file_name).mime_str("image/jpeg")?;
        let form = Form::new()
            .text("chat_id", self.chat_id.clone())
            .text("caption", caption.to_string())
            .part("photo", photo);

        let result = self.client.post(self.method_url("sendPhoto")).multipart(form).send().await;
        Self::check_response("sendPhoto", result).await?;

        info!(
            chat_id = %self.chat_id,
            path = %path.display(),
            bytes = %size,
            latency_ms = %start.elapsed().as_millis(),
            "telegram_photo_sent"
        );
        Ok(())
    }
}
