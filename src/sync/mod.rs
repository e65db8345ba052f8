//! Synchronization engine.
//!
//! Pulls terminals and transactions for every account from the vending
//! platform and merges them into local storage:
//!
//! - [`TerminalReconciler`]: one atomic fleet reconciliation per account
//! - [`TransactionImporter`]: paginated, idempotent transaction merge
//! - [`AccountStateHandler`]: one-shot payment/credential state transitions
//! - [`ImportGuard`]: at most one run in flight per account
//! - [`JobAudit`]: best-effort audit log writer
//! - [`SyncEngine`]: ties the above into tier sweeps and manual entry points

mod account_state;
mod audit;
mod engine;
mod guard;
mod importer;
mod reconciler;
mod tier;


use std::future::Future;
use std::time::Duration;

pub use account_state::AccountStateHandler;
pub use audit::JobAudit;
pub use engine::{EngineSettings, SyncEngine, TierReport};
pub use guard::{ImportGuard, ImportPermit};
pub use importer::{ImportFailure, TransactionImporter};
pub use reconciler::TerminalReconciler;
pub use tier::Tier;

use crate::model::AccountId;
use crate::storage::StorageError;
use crate::upstream::UpstreamError;

/// Job name recorded for manual imports.
pub const MANUAL_IMPORT_JOB: &str = "manual_import";
/// Job name recorded for manual reconciliations.
pub const MANUAL_RECONCILE_JOB: &str = "manual_reconcile";

/// Errors raised while synchronizing one account.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("token decryption failed")]
    TokenDecryption,

    #[error("account has no stored credential")]
    NoCredential,

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("a run for account {0} is already in flight")]
    Locked(AccountId),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("storage call timed out after {0:?}")]
    StorageTimeout(Duration),
}

impl SyncError {
    /// Vendor billing hold.
    pub fn is_payment_required(&self) -> bool {
        matches!(self, SyncError::Upstream(UpstreamError::PaymentRequired))
    }

    /// Vendor rejected the credential.
    pub fn is_invalid_credential(&self) -> bool {
        matches!(self, SyncError::Upstream(UpstreamError::InvalidCredential(_)))
    }
}

/// Bound a storage call by `limit`; an expired call counts as a failure.
pub(crate) async fn with_storage_timeout<T, F>(limit: Duration, call: F) -> Result<T, SyncError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(SyncError::from),
        Err(_) => Err(SyncError::StorageTimeout(limit)),
    }
}
