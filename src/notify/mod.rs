//! Operator alerts.
//!
//! Alerts are fire-and-forget: `notify` never blocks the caller and delivery
//! failures are logged, never propagated.

use crate::config::TelegramConfig;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telegram returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// A sink for human-readable alert text.
pub trait Notifier: Send + Sync {
    fn notify(&self, text: &str);
}

/// Sends alerts to a Telegram chat through the Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    http: Client,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Self {
        let http = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            url: format!(
                "{}/bot{}/sendMessage",
                config.api_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        }
    }

    pub async fn send(&self, text: &str) -> Result<(), NotificationError> {
        let resp = self
            .http
            .post(&self.url)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(NotificationError::Api {
                status: status.as_u16(),
                body,
            });
        }
        debug!("telegram alert delivered");
        Ok(())
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, text: &str) {
        let this = self.clone();
        let text = text.to_string();
        tokio::spawn(async move {
            match this.send(&text).await {
                Ok(()) => {}
                Err(NotificationError::Api { status, body }) => {
                    warn!(status = status, body = %body, "telegram rejected alert");
                }
                Err(e) => {
                    error!(error = %e, "telegram alert failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_message_url() {
        let config = TelegramConfig {
            api_url: "https://api.telegram.org/".to_string(),
            bot_token: "123:abc".to_string(),
            chat_id: "-1001".to_string(),
        };
        let notifier = TelegramNotifier::new(&config);
        assert_eq!(notifier.url, "https://api.telegram.org/bot123:abc/sendMessage");
        assert_eq!(notifier.chat_id, "-1001");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let config = TelegramConfig {
            api_url: "http://127.0.0.1:1".to_string(),
            bot_token: "t".to_string(),
            chat_id: "c".to_string(),
        };
        let notifier = TelegramNotifier::new(&config);
        assert!(matches!(
            notifier.send("hello").await,
            Err(NotificationError::Request(_))
        ));
    }
}
