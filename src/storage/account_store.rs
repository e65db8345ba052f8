//! AccountStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::Result;
use crate::model::{Account, AccountId};

/// Interface for account persistence.
///
/// Accounts are created outside the sync engine. The engine reads them and
/// drives two small state machines with compare-and-set updates:
///
/// - payment: `active -> payment_required` (billing hold detected),
///   back to `active` inside a successful fleet reconciliation
/// - credential: `valid -> invalid_creds` (vendor rejected the token),
///   back to `valid` on the next successful call
///
/// The `mark_*` methods return `true` only for the caller that performed the
/// transition, which is what gates one-shot notifications.
///
/// # Implementations
///
/// - `SqliteAccountStore`: SQLite storage
/// - `MockStore`: In-memory mock for testing
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert or fully replace an account.
    async fn save(&self, account: &Account) -> Result<()>;

    /// Fetch one account.
    async fn get(&self, id: AccountId) -> Result<Option<Account>>;

    /// Accounts with a non-empty stored credential, ordered by id.
    async fn list_with_credentials(&self) -> Result<Vec<Account>>;

    /// Replace the stored (encrypted) credential and reset its status to valid.
    async fn set_credential(&self, id: AccountId, encrypted: &str) -> Result<()>;

    /// `active -> payment_required`, stamping `at` as the notification time.
    async fn mark_payment_required(&self, id: AccountId, at: DateTime<Utc>) -> Result<bool>;

    /// `valid -> invalid_creds`.
    async fn mark_credentials_invalid(&self, id: AccountId) -> Result<bool>;

    /// `invalid_creds -> valid`.
    async fn mark_credentials_valid(&self, id: AccountId) -> Result<bool>;
}
