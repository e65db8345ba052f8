//! TransactionStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use crate::model::{AccountId, SyncCounts, Transaction, UpstreamTransactionId};

/// Interface for transaction persistence.
///
/// The vendor transaction id is globally unique and is the upsert key.
///
/// # Merge rule
///
/// On conflict every field is overwritten by the incoming row except
/// `item_id`, which is coalesced: an incoming `None` keeps the stored value.
///
/// # Implementations
///
/// - `SqliteTransactionStore`: SQLite storage
/// - `MockStore`: In-memory mock for testing
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Merge one page of transactions atomically.
    ///
    /// Returns `processed = page.len()` split into rows that did not exist
    /// before (`added`) and rows that did (`updated`). A repeated id within
    /// the page counts as added once and updated afterwards.
    async fn upsert_page(
        &self,
        page: &[Transaction],
        updated_at: DateTime<Utc>,
    ) -> Result<SyncCounts>;

    async fn get(&self, id: UpstreamTransactionId) -> Result<Option<Transaction>>;

    async fn count_for_account(&self, account_id: AccountId) -> Result<u64>;
}
