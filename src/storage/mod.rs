//! Storage interfaces and implementations.
//!
//! Four narrow traits cover everything the sync engine persists:
//! - [`AccountStore`]: accounts and their credential/payment state machine
//! - [`FleetStore`]: terminals and inventory resources (atomic reconciliation)
//! - [`TransactionStore`]: idempotent transaction merge
//! - [`JobRunStore`]: append-only job audit log

use std::sync::Arc;

use tracing::info;

use crate::config::StorageConfig;
use crate::model::AccountId;

mod account_store;
mod fleet_store;
mod helpers;
mod job_run_store;
pub mod mock;
pub mod schema;
pub mod sqlite;
mod transaction_store;

pub use account_store::AccountStore;
pub use fleet_store::FleetStore;
pub use job_run_store::JobRunStore;
pub use mock::MockStore;
pub use sqlite::{SqliteAccountStore, SqliteFleetStore, SqliteJobRunStore, SqliteTransactionStore};
pub use transaction_store::TransactionStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// All stores the sync engine needs, behind trait objects.
#[derive(Clone)]
pub struct Storage {
    pub accounts: Arc<dyn AccountStore>,
    pub fleet: Arc<dyn FleetStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub job_runs: Arc<dyn JobRunStore>,
}

impl Storage {
    /// Back every store with the same shared implementation.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: AccountStore + FleetStore + TransactionStore + JobRunStore + 'static,
    {
        Self {
            accounts: store.clone(),
            fleet: store.clone(),
            transactions: store.clone(),
            job_runs: store,
        }
    }
}

/// Open the SQLite database described by `config` and create the schema.
pub async fn init_storage(config: &StorageConfig) -> Result<Storage> {
    info!(path = %config.path, "Storage: sqlite");

    let pool = sqlite::connect(config).await?;
    sqlite::init_schema(&pool).await?;

    Ok(Storage {
        accounts: Arc::new(SqliteAccountStore::new(pool.clone())),
        fleet: Arc::new(SqliteFleetStore::new(pool.clone())),
        transactions: Arc::new(SqliteTransactionStore::new(pool.clone())),
        job_runs: Arc::new(SqliteJobRunStore::new(pool)),
    })
}
