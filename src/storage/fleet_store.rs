//! FleetStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Result;
use crate::model::{AccountId, FleetSummary, InventoryResource, Terminal, TerminalSnapshot};

/// Interface for terminal and inventory-resource persistence.
///
/// # Key
///
/// Terminals are matched on `(account_id, upstream_id)`. The `internal_id`
/// is generated on first sighting and never changes, even if the terminal
/// later disappears from the vendor listing and comes back.
///
/// # Implementations
///
/// - `SqliteFleetStore`: SQLite storage
/// - `MockStore`: In-memory mock for testing
#[async_trait]
pub trait FleetStore: Send + Sync {
    /// Make the account's terminals match `listing`, all or nothing.
    ///
    /// Within one storage transaction:
    /// 1. insert unseen terminals and provision the default resource catalog
    ///    for each (create-if-absent on `(terminal, name)`)
    /// 2. refresh name, serial, online flag, last-online time and reconciled-at
    ///    of known terminals, reactivating them
    /// 3. deactivate every terminal of the account not in `listing`
    ///    (all of them when `listing` is empty)
    /// 4. reset payment status to `active` (clearing the notification time)
    ///    and credential status to `valid` if they were not already
    ///
    /// Any error leaves storage exactly as it was.
    async fn apply_fleet(
        &self,
        account_id: AccountId,
        listing: &[TerminalSnapshot],
        synced_at: DateTime<Utc>,
    ) -> Result<FleetSummary>;

    /// All terminals of an account, active or not, ordered by upstream id.
    async fn list_terminals(&self, account_id: AccountId) -> Result<Vec<Terminal>>;

    /// Inventory resources of a terminal, ordered by name.
    async fn list_resources(&self, terminal_id: Uuid) -> Result<Vec<InventoryResource>>;
}
