//! JobRunStore trait definition.

use async_trait::async_trait;

use super::Result;
use crate::model::{AccountId, JobRun};

/// Append-only job audit log.
///
/// The sync engine only writes. `recent` exists for operational tooling.
///
/// # Implementations
///
/// - `SqliteJobRunStore`: SQLite storage
/// - `MockStore`: In-memory mock for testing
#[async_trait]
pub trait JobRunStore: Send + Sync {
    async fn append(&self, run: &JobRun) -> Result<()>;

    /// Newest entries first. `None` returns entries for every account,
    /// including global ones.
    async fn recent(&self, account_id: Option<AccountId>, limit: u32) -> Result<Vec<JobRun>>;
}
