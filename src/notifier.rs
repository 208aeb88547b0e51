use crate::config::TelegramConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{Value, json};
use std::future::Future;
use std::time::Duration;
use tracing::info;

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Delivers a preformatted report. An `Err` means the report was not
/// delivered and must not be treated as consumed.
pub trait Notifier: Send + Sync {
    fn send(&self, text: &str) -> impl Future<Output = Result<()>> + Send;
}

pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build Telegram client")?;
        Ok(Self::with_client(config, TELEGRAM_API, client))
    }

    fn with_client(config: &TelegramConfig, api_base: &str, client: Client) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        }
    }
}

impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "Markdown",
                "disable_web_page_preview": true,
            }))
            .send()
            .await
            .context("Telegram request failed")?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() || body.get("ok") != Some(&Value::Bool(true)) {
            anyhow::bail!(
                "Telegram rejected message: HTTP {} {}",
                status,
                body.get("description").and_then(Value::as_str).unwrap_or("")
            );
        }
        Ok(())
    }
}

/// Writes reports to the log when no messaging channel is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        info!("\n{}", text);
        Ok(())
    }
}
