//! Telegram Bot API notifier.
//!
//! Sends plain-text `sendMessage` requests. Admin alerts go to the configured
//! admin chat; owner messages go to the owner's chat id.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tracing::{debug, error, warn};

use super::{AdminAlert, NotifyError, Notifier};
use crate::config::NotifyConfig;

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Notifier backed by a Telegram bot.
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    admin_chat_id: Option<String>,
}

impl TelegramNotifier {
    pub(crate) fn new(config: &NotifyConfig, bot_token: &str) -> Result<Self, NotifyError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                bot_token
            ),
            admin_chat_id: config.admin_chat_id.clone().filter(|c| !c.is_empty()),
        })
    }

    /// Backoff configuration for retries.
    fn backoff() -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(3)
            .with_jitter()
    }

    /// Determine if an HTTP error is retryable.
    fn is_retryable(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }

    /// Determine if an HTTP status code is retryable.
    fn is_retryable_status(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    async fn post_message(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            // The endpoint embeds the bot token.
            .map_err(|e| NotifyError::Http(e.without_url()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: String = response
            .text()
            .await
            .unwrap_or_default()
            .chars()
            .take(200)
            .collect();
        if Self::is_retryable_status(status) {
            Err(NotifyError::Unavailable(format!("HTTP {} - {}", status, body)))
        } else {
            Err(NotifyError::Rejected(format!("HTTP {} - {}", status, body)))
        }
    }

    async fn send(&self, chat_id: &str, text: &str) {
        let result = (|| async { self.post_message(chat_id, text).await })
            .retry(Self::backoff())
            .when(|e| {
                matches!(e, NotifyError::Http(err) if Self::is_retryable(err))
                    || matches!(e, NotifyError::Unavailable(_))
            })
            .notify(|e, delay| {
                warn!(error = %e, delay_ms = delay.as_millis() as u64, "Retrying Telegram delivery");
            })
            .await;

        match result {
            Ok(()) => debug!(chat_id, "Telegram message delivered"),
            Err(e) => error!(chat_id, error = %e, "Telegram message not delivered"),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_admin(&self, alert: AdminAlert) {
        let Some(chat_id) = self.admin_chat_id.as_deref() else {
            warn!(
                account_id = ?alert.account_id,
                context = %alert.context,
                "No admin chat configured, alert logged only: {}",
                alert.message
            );
            return;
        };
        self.send(chat_id, &alert.render()).await;
    }

    async fn notify_user(&self, recipient: &str, message: &str) {
        self.send(recipient, message).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_built_from_config() {
        let config = NotifyConfig {
            api_base: "http://telegram.test/".to_string(),
            admin_chat_id: Some(String::new()),
            ..Default::default()
        };
        let notifier = TelegramNotifier::new(&config, "123:abc").unwrap();

        assert_eq!(notifier.endpoint, "http://telegram.test/bot123:abc/sendMessage");
        assert_eq!(notifier.admin_chat_id, None);
    }

    #[test]
    fn test_retryable_status_codes() {
        assert!(TelegramNotifier::is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(TelegramNotifier::is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!TelegramNotifier::is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!TelegramNotifier::is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_does_not_fail_caller() {
        let config = NotifyConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            admin_chat_id: Some("1".to_string()),
            timeout_secs: 1,
            ..Default::default()
        };
        let notifier = TelegramNotifier::new(&config, "token").unwrap();

        notifier.notify_user("42", "hello").await;
    }
}
