//! Payment and credential state transitions.
//!
//! Both transitions are compare-and-set in storage. Only the caller that moved
//! the account into the failure state sends notifications, so repeated
//! failures across runs produce one alert.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{with_storage_timeout, SyncError};
use crate::model::{Account, AccountId};
use crate::notify::{AdminAlert, Notifier};
use crate::storage::AccountStore;

const PAYMENT_REQUIRED_OWNER_MESSAGE: &str = "The vending platform has suspended data access for \
     your account until its subscription is paid. Sales and terminal status will resume syncing \
     automatically once payment is made.";

const INVALID_CREDENTIAL_OWNER_MESSAGE: &str = "The vending platform rejected your API token. \
     Please enter a new token in the dashboard settings to resume syncing.";

/// Drives the account's payment and credential state machines.
#[derive(Clone)]
pub struct AccountStateHandler {
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    storage_timeout: Duration,
}

impl AccountStateHandler {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            notifier,
            storage_timeout,
        }
    }

    /// Billing hold detected. Returns whether this call made the transition.
    pub async fn payment_required(&self, account: &Account, context: &str) -> Result<bool, SyncError> {
        let transitioned = with_storage_timeout(
            self.storage_timeout,
            self.accounts.mark_payment_required(account.id, Utc::now()),
        )
        .await?;

        if !transitioned {
            debug!(account_id = account.id, "Account already marked payment_required");
            return Ok(false);
        }

        warn!(account_id = account.id, context, "Account entered payment_required");
        self.notifier
            .notify_admin(AdminAlert::new(
                Some(account.id),
                context,
                "Vending platform requires payment for this account",
            ))
            .await;
        if let Some(recipient) = account.owner_chat_id.as_deref() {
            self.notifier
                .notify_user(recipient, PAYMENT_REQUIRED_OWNER_MESSAGE)
                .await;
        }
        Ok(true)
    }

    /// Vendor rejected the credential. Returns whether this call made the
    /// transition.
    pub async fn credential_rejected(
        &self,
        account: &Account,
        context: &str,
        detail: &str,
    ) -> Result<bool, SyncError> {
        let transitioned = with_storage_timeout(
            self.storage_timeout,
            self.accounts.mark_credentials_invalid(account.id),
        )
        .await?;

        if !transitioned {
            debug!(account_id = account.id, "Account already marked invalid_creds");
            return Ok(false);
        }

        warn!(account_id = account.id, context, "Account credential rejected");
        self.notifier
            .notify_admin(
                AdminAlert::new(
                    Some(account.id),
                    context,
                    "Vending platform rejected the account credential",
                )
                .with_details(detail),
            )
            .await;
        if let Some(recipient) = account.owner_chat_id.as_deref() {
            self.notifier
                .notify_user(recipient, INVALID_CREDENTIAL_OWNER_MESSAGE)
                .await;
        }
        Ok(true)
    }

    /// A vendor call with the credential succeeded.
    pub async fn credential_accepted(&self, account_id: AccountId) -> Result<bool, SyncError> {
        let transitioned = with_storage_timeout(
            self.storage_timeout,
            self.accounts.mark_credentials_valid(account_id),
        )
        .await?;

        if transitioned {
            info!(account_id, "Account credential valid again");
        }
        Ok(transitioned)
    }

    /// Route a failed vendor call to the matching transition.
    ///
    /// Errors other than billing hold or credential rejection are left to the
    /// caller. Storage failures here are logged, never returned, so they do
    /// not mask `error`.
    pub async fn apply(&self, account: &Account, context: &str, error: &SyncError) {
        let result = match error {
            e if e.is_payment_required() => self.payment_required(account, context).await,
            e if e.is_invalid_credential() => {
                self.credential_rejected(account, context, &e.to_string())
                    .await
            }
            _ => return,
        };

        if let Err(e) = result {
            warn!(
                account_id = account.id,
                context,
                error = %e,
                "Failed to record account state transition"
            );
        }
    }
}
