//! Terminal fleet reconciliation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::{with_storage_timeout, AccountStateHandler, SyncError};
use crate::model::{Account, FleetSummary};
use crate::notify::{AdminAlert, Notifier};
use crate::storage::FleetStore;
use crate::upstream::VendingPlatform;

/// Makes an account's stored terminals match the vendor's listing.
pub struct TerminalReconciler {
    platform: Arc<dyn VendingPlatform>,
    fleet: Arc<dyn FleetStore>,
    account_state: AccountStateHandler,
    notifier: Arc<dyn Notifier>,
    storage_timeout: Duration,
}

impl TerminalReconciler {
    pub fn new(
        platform: Arc<dyn VendingPlatform>,
        fleet: Arc<dyn FleetStore>,
        account_state: AccountStateHandler,
        notifier: Arc<dyn Notifier>,
        storage_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            fleet,
            account_state,
            notifier,
            storage_timeout,
        }
    }

    /// Fetch the fleet and apply it atomically.
    ///
    /// A billing hold or rejected credential goes through the one-shot state
    /// transition. Every other failure raises an admin alert.
    pub async fn reconcile(
        &self,
        account: &Account,
        credential: &str,
        context: &str,
    ) -> Result<FleetSummary, SyncError> {
        match self.fetch_and_apply(account, credential).await {
            Ok(summary) => {
                info!(
                    account_id = account.id,
                    created = summary.created,
                    updated = summary.updated,
                    deactivated = summary.deactivated,
                    "Terminals reconciled"
                );
                if summary.payment_recovered {
                    info!(account_id = account.id, "Account payment status back to active");
                }
                if summary.credentials_recovered {
                    info!(account_id = account.id, "Account credential valid again");
                }
                Ok(summary)
            }
            Err(e) if e.is_payment_required() || e.is_invalid_credential() => {
                self.account_state.apply(account, context, &e).await;
                Err(e)
            }
            Err(e) => {
                warn!(account_id = account.id, error = %e, "Terminal reconciliation failed");
                self.notifier
                    .notify_admin(
                        AdminAlert::new(Some(account.id), context, "Terminal reconciliation failed")
                            .with_details(e.to_string()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    async fn fetch_and_apply(
        &self,
        account: &Account,
        credential: &str,
    ) -> Result<FleetSummary, SyncError> {
        // Fetching writes nothing, so it stays outside the storage transaction.
        let listing = self.platform.list_terminals(credential).await?;

        with_storage_timeout(
            self.storage_timeout,
            self.fleet.apply_fleet(account.id, &listing, Utc::now()),
        )
        .await
    }
}
