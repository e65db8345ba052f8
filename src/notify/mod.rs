//! Best-effort notification side channel.
//!
//! The sync engine reports two things outward: admin alerts for failures that
//! need an operator, and owner messages for account state the owner must act
//! on. Delivery never fails the caller; implementations log their own errors.

mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::NotifyConfig;
use crate::model::AccountId;

pub use telegram::TelegramNotifier;

/// Failures while delivering a notification. Never leaves this module.
#[derive(Debug, thiserror::Error)]
pub(crate) enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Alert for the operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAlert {
    pub account_id: Option<AccountId>,
    /// Job or entry point that raised the alert.
    pub context: String,
    pub message: String,
    pub details: Option<String>,
}

impl AdminAlert {
    pub fn new(
        account_id: Option<AccountId>,
        context: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            context: context.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Plain-text rendering used by message-based channels.
    pub fn render(&self) -> String {
        let mut text = format!("[{}] {}", self.context, self.message);
        if let Some(account_id) = self.account_id {
            text.push_str(&format!("\naccount: {}", account_id));
        }
        if let Some(details) = &self.details {
            text.push_str(&format!("\n{}", details));
        }
        text
    }
}

/// Outbound notifications.
///
/// # Implementations
///
/// - `TelegramNotifier`: Telegram Bot API
/// - `LogNotifier`: writes to the log only
/// - `RecordingNotifier` (test_utils): captures calls for assertions
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_admin(&self, alert: AdminAlert);

    async fn notify_user(&self, recipient: &str, message: &str);
}

/// Notifier that only logs. Used when no channel is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_admin(&self, alert: AdminAlert) {
        warn!(
            account_id = ?alert.account_id,
            context = %alert.context,
            details = ?alert.details,
            "Admin alert: {}",
            alert.message
        );
    }

    async fn notify_user(&self, recipient: &str, message: &str) {
        info!(recipient, "Owner notification: {}", message);
    }
}

/// Pick the notifier for `config`: Telegram when a bot token is set,
/// otherwise log-only.
pub fn from_config(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match config.telegram_bot_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => match TelegramNotifier::new(config, token) {
            Ok(notifier) => {
                info!("Notifications: telegram");
                Arc::new(notifier)
            }
            Err(e) => {
                warn!(error = %e, "Telegram notifier unavailable, falling back to log");
                Arc::new(LogNotifier)
            }
        },
        None => {
            info!("Notifications: log only");
            Arc::new(LogNotifier)
        }
    }
}
