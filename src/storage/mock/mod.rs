//! Mock storage implementations for testing.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, FleetStore, JobRunStore, Result, StorageError, TransactionStore};
use crate::model::{
    Account, AccountId, CredentialStatus, FleetSummary, InventoryResource, JobRun, PaymentStatus,
    SyncCounts, Terminal, TerminalSnapshot, Transaction, UpstreamTerminalId,
    UpstreamTransactionId, DEFAULT_RESOURCES,
};

#[derive(Default)]
struct MockState {
    accounts: BTreeMap<AccountId, Account>,
    terminals: BTreeMap<(AccountId, UpstreamTerminalId), Terminal>,
    resources: HashMap<Uuid, BTreeMap<String, InventoryResource>>,
    transactions: HashMap<UpstreamTransactionId, Transaction>,
    job_runs: Vec<JobRun>,
}

/// In-memory store implementing every storage trait.
///
/// All state sits behind one lock, so `apply_fleet` and `upsert_page` are
/// atomic the same way the SQLite transactions are.
#[derive(Default)]
pub struct MockStore {
    state: RwLock<MockState>,
    fail_on_accounts: RwLock<bool>,
    fail_on_fleet: RwLock<bool>,
    fail_on_transactions: RwLock<bool>,
    fail_on_job_runs: RwLock<bool>,
    fleet_delay: RwLock<Option<Duration>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail account listing.
    pub async fn set_fail_on_accounts(&self, fail: bool) {
        *self.fail_on_accounts.write().await = fail;
    }

    pub async fn set_fail_on_fleet(&self, fail: bool) {
        *self.fail_on_fleet.write().await = fail;
    }

    pub async fn set_fail_on_transactions(&self, fail: bool) {
        *self.fail_on_transactions.write().await = fail;
    }

    pub async fn set_fail_on_job_runs(&self, fail: bool) {
        *self.fail_on_job_runs.write().await = fail;
    }

    /// Stall every `apply_fleet` call before it touches state.
    pub async fn set_fleet_delay(&self, delay: Option<Duration>) {
        *self.fleet_delay.write().await = delay;
    }

    /// Every audit entry, oldest first.
    pub async fn job_runs(&self) -> Vec<JobRun> {
        self.state.read().await.job_runs.clone()
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait]
impl AccountStore for MockStore {
    async fn save(&self, account: &Account) -> Result<()> {
        self.state
            .write()
            .await
            .accounts
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn list_with_credentials(&self) -> Result<Vec<Account>> {
        if *self.fail_on_accounts.read().await {
            return Err(StorageError::Unavailable("mock account failure".to_string()));
        }
        Ok(self
            .state
            .read()
            .await
            .accounts
            .values()
            .filter(|a| a.has_credential())
            .cloned()
            .collect())
    }

    async fn set_credential(&self, id: AccountId, encrypted: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StorageError::AccountNotFound(id))?;
        account.encrypted_credential = Some(encrypted.to_string());
        account.credential_status = CredentialStatus::Valid;
        Ok(())
    }

    async fn mark_payment_required(&self, id: AccountId, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.accounts.get_mut(&id) {
            Some(account) if account.payment_status != PaymentStatus::PaymentRequired => {
                account.payment_status = PaymentStatus::PaymentRequired;
                account.payment_notified_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_credentials_invalid(&self, id: AccountId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.accounts.get_mut(&id) {
            Some(account) if account.credential_status != CredentialStatus::InvalidCreds => {
                account.credential_status = CredentialStatus::InvalidCreds;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_credentials_valid(&self, id: AccountId) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.accounts.get_mut(&id) {
            Some(account) if account.credential_status != CredentialStatus::Valid => {
                account.credential_status = CredentialStatus::Valid;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl FleetStore for MockStore {
    async fn apply_fleet(
        &self,
        account_id: AccountId,
        listing: &[TerminalSnapshot],
        synced_at: DateTime<Utc>,
    ) -> Result<FleetSummary> {
        let delay = *self.fleet_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_on_fleet.read().await {
            return Err(StorageError::Unavailable("mock fleet failure".to_string()));
        }

        let mut state = self.state.write().await;
        let mut summary = FleetSummary::default();

        for snapshot in listing {
            let key = (account_id, snapshot.upstream_id);
            if let Some(terminal) = state.terminals.get_mut(&key) {
                terminal.name = snapshot.name.clone();
                terminal.serial_number = snapshot.serial_number.clone();
                terminal.is_online = snapshot.is_online;
                terminal.last_online_at = snapshot.last_online_at;
                terminal.last_synced_at = synced_at;
                terminal.is_active = true;
                summary.updated += 1;
                continue;
            }

            let internal_id = Uuid::new_v4();
            state.terminals.insert(
                key,
                Terminal {
                    internal_id,
                    account_id,
                    upstream_id: snapshot.upstream_id,
                    name: snapshot.name.clone(),
                    serial_number: snapshot.serial_number.clone(),
                    is_active: true,
                    is_online: snapshot.is_online,
                    last_online_at: snapshot.last_online_at,
                    last_synced_at: synced_at,
                },
            );
            let resources = state.resources.entry(internal_id).or_default();
            for (name, max_capacity, critical_threshold) in DEFAULT_RESOURCES {
                resources
                    .entry((*name).to_string())
                    .or_insert_with(|| InventoryResource {
                        terminal_id: internal_id,
                        name: (*name).to_string(),
                        max_capacity: *max_capacity,
                        critical_threshold: *critical_threshold,
                    });
            }
            summary.created += 1;
        }

        for ((owner, upstream_id), terminal) in state.terminals.iter_mut() {
            if *owner != account_id || !terminal.is_active {
                continue;
            }
            if !listing.iter().any(|s| s.upstream_id == *upstream_id) {
                terminal.is_active = false;
                summary.deactivated += 1;
            }
        }

        if let Some(account) = state.accounts.get_mut(&account_id) {
            if account.payment_status != PaymentStatus::Active {
                account.payment_status = PaymentStatus::Active;
                account.payment_notified_at = None;
                summary.payment_recovered = true;
            }
            if account.credential_status != CredentialStatus::Valid {
                account.credential_status = CredentialStatus::Valid;
                summary.credentials_recovered = true;
            }
        }

        Ok(summary)
    }

    async fn list_terminals(&self, account_id: AccountId) -> Result<Vec<Terminal>> {
        Ok(self
            .state
            .read()
            .await
            .terminals
            .range((account_id, UpstreamTerminalId::MIN)..=(account_id, UpstreamTerminalId::MAX))
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn list_resources(&self, terminal_id: Uuid) -> Result<Vec<InventoryResource>> {
        Ok(self
            .state
            .read()
            .await
            .resources
            .get(&terminal_id)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl TransactionStore for MockStore {
    async fn upsert_page(
        &self,
        page: &[Transaction],
        _updated_at: DateTime<Utc>,
    ) -> Result<SyncCounts> {
        if *self.fail_on_transactions.read().await {
            return Err(StorageError::Unavailable(
                "mock transaction failure".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let mut counts = SyncCounts::default();

        for txn in page {
            counts.processed += 1;
            match state.transactions.get_mut(&txn.id) {
                Some(stored) => {
                    let item_id = txn.item_id.or(stored.item_id);
                    *stored = Transaction {
                        item_id,
                        ..txn.clone()
                    };
                    counts.updated += 1;
                }
                None => {
                    state.transactions.insert(txn.id, txn.clone());
                    counts.added += 1;
                }
            }
        }

        Ok(counts)
    }

    async fn get(&self, id: UpstreamTransactionId) -> Result<Option<Transaction>> {
        Ok(self.state.read().await.transactions.get(&id).cloned())
    }

    async fn count_for_account(&self, account_id: AccountId) -> Result<u64> {
        Ok(self
            .state
            .read()
            .await
            .transactions
            .values()
            .filter(|t| t.account_id == account_id)
            .count() as u64)
    }
}

#[async_trait]
impl JobRunStore for MockStore {
    async fn append(&self, run: &JobRun) -> Result<()> {
        if *self.fail_on_job_runs.read().await {
            return Err(StorageError::Unavailable("mock audit failure".to_string()));
        }
        self.state.write().await.job_runs.push(run.clone());
        Ok(())
    }

    async fn recent(&self, account_id: Option<AccountId>, limit: u32) -> Result<Vec<JobRun>> {
        Ok(self
            .state
            .read()
            .await
            .job_runs
            .iter()
            .rev()
            .filter(|r| account_id.is_none() || r.account_id == account_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    fn snapshot(upstream_id: i64) -> TerminalSnapshot {
        TerminalSnapshot {
            upstream_id,
            name: format!("T{upstream_id}"),
            serial_number: format!("SN{upstream_id}"),
            is_online: true,
            last_online_at: None,
        }
    }

    fn txn(id: i64, item_id: Option<i64>) -> Transaction {
        Transaction {
            id,
            account_id: 1,
            terminal_id: 10,
            amount_minor: 15000,
            occurred_at: Utc::now(),
            result_code: 0,
            reversal_id: 0,
            comment: String::new(),
            item_id,
        }
    }

    #[tokio::test]
    async fn test_apply_fleet_keeps_internal_id_across_absence() {
        let store = MockStore::new();
        store.save(&Account::new(1, Some("x".into()))).await.unwrap();

        store.apply_fleet(1, &[snapshot(10)], Utc::now()).await.unwrap();
        let first = store.list_terminals(1).await.unwrap()[0].internal_id;

        let summary = store.apply_fleet(1, &[], Utc::now()).await.unwrap();
        assert_eq!(summary.deactivated, 1);

        let summary = store.apply_fleet(1, &[snapshot(10)], Utc::now()).await.unwrap();
        assert_eq!(summary.updated, 1);
        let terminals = store.list_terminals(1).await.unwrap();
        assert_eq!(terminals[0].internal_id, first);
        assert!(terminals[0].is_active);
    }

    #[tokio::test]
    async fn test_fleet_failure_leaves_state_untouched() {
        let store = MockStore::new();
        store.set_fail_on_fleet(true).await;

        assert!(store.apply_fleet(1, &[snapshot(10)], Utc::now()).await.is_err());
        assert!(store.list_terminals(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_coalesces_item_id() {
        let store = MockStore::new();
        store.upsert_page(&[txn(5, Some(42))], Utc::now()).await.unwrap();

        let counts = store.upsert_page(&[txn(5, None)], Utc::now()).await.unwrap();
        assert_eq!(counts, SyncCounts { processed: 1, added: 0, updated: 1 });
        let stored = TransactionStore::get(&store, 5).await.unwrap().unwrap();
        assert_eq!(stored.item_id, Some(42));
    }

    #[tokio::test]
    async fn test_recent_job_runs_newest_first() {
        let store = MockStore::new();
        store.append(&JobRun::new(Some(1), "a", JobStatus::Success)).await.unwrap();
        store.append(&JobRun::new(Some(2), "b", JobStatus::Failure)).await.unwrap();
        store.append(&JobRun::new(Some(1), "c", JobStatus::Success)).await.unwrap();

        let all = store.recent(None, 10).await.unwrap();
        assert_eq!(all.iter().map(|r| r.job.as_str()).collect::<Vec<_>>(), ["c", "b", "a"]);

        let one = store.recent(Some(1), 1).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].job, "c");
    }
}
