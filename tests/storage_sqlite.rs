//! SQLite storage integration tests.
//!
//! Run with: cargo test --test storage_sqlite
//!
//! Uses an in-memory database, no external dependencies required.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;

use vendsync::config::StorageConfig;
use vendsync::model::{
    Account, CredentialStatus, JobRun, JobStatus, PaymentStatus, SyncCounts, Transaction,
    DEFAULT_RESOURCES,
};
use vendsync::storage::sqlite::{connect, init_schema};
use vendsync::storage::{
    AccountStore, FleetStore, JobRunStore, SqliteAccountStore, SqliteFleetStore,
    SqliteJobRunStore, SqliteTransactionStore, StorageError, TransactionStore,
};
use vendsync::test_utils::{date, terminal_snapshot};

async fn connect_and_migrate() -> SqlitePool {
    let config = StorageConfig {
        path: ":memory:".to_string(),
        ..Default::default()
    };
    let pool = connect(&config).await.expect("Failed to connect to SQLite");
    init_schema(&pool).await.expect("Failed to create schema");
    pool
}

fn transaction(id: i64, account_id: i64, item_id: Option<i64>) -> Transaction {
    Transaction {
        id,
        account_id,
        terminal_id: 10,
        amount_minor: 15000,
        occurred_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        result_code: 0,
        reversal_id: 0,
        comment: String::new(),
        item_id,
    }
}

#[tokio::test]
async fn test_sqlite_account_round_trip() {
    let pool = connect_and_migrate().await;
    let store = SqliteAccountStore::new(pool);

    let mut account = Account::new(1, Some("aa:bb".to_string()));
    account.setup_date = Some(date(2024, 3, 1));
    account.owner_chat_id = Some("555".to_string());
    store.save(&account).await.unwrap();
    store.save(&Account::new(2, None)).await.unwrap();
    store.save(&Account::new(3, Some(String::new()))).await.unwrap();

    let loaded = store.get(1).await.unwrap().unwrap();
    assert_eq!(loaded, account);
    assert!(store.get(99).await.unwrap().is_none());

    let listed: Vec<i64> = store
        .list_with_credentials()
        .await
        .unwrap()
        .iter()
        .map(|a| a.id)
        .collect();
    assert_eq!(listed, vec![1]);
}

#[tokio::test]
async fn test_sqlite_account_status_transitions_once() {
    let pool = connect_and_migrate().await;
    let store = SqliteAccountStore::new(pool);
    store.save(&Account::new(1, Some("aa:bb".to_string()))).await.unwrap();

    let at = Utc.with_ymd_and_hms(2024, 5, 8, 10, 0, 0).unwrap();
    assert!(store.mark_payment_required(1, at).await.unwrap());
    assert!(!store.mark_payment_required(1, at).await.unwrap());

    assert!(store.mark_credentials_invalid(1).await.unwrap());
    assert!(!store.mark_credentials_invalid(1).await.unwrap());

    let account = store.get(1).await.unwrap().unwrap();
    assert_eq!(account.payment_status, PaymentStatus::PaymentRequired);
    assert_eq!(account.payment_notified_at, Some(at));
    assert_eq!(account.credential_status, CredentialStatus::InvalidCreds);

    assert!(store.mark_credentials_valid(1).await.unwrap());
    assert!(!store.mark_credentials_valid(1).await.unwrap());
}

#[tokio::test]
async fn test_sqlite_set_credential() {
    let pool = connect_and_migrate().await;
    let store = SqliteAccountStore::new(pool);
    let mut account = Account::new(1, None);
    account.credential_status = CredentialStatus::InvalidCreds;
    store.save(&account).await.unwrap();

    store.set_credential(1, "cc:dd").await.unwrap();
    let account = store.get(1).await.unwrap().unwrap();
    assert_eq!(account.encrypted_credential.as_deref(), Some("cc:dd"));
    assert_eq!(account.credential_status, CredentialStatus::Valid);

    assert!(matches!(
        store.set_credential(42, "cc:dd").await,
        Err(StorageError::AccountNotFound(42))
    ));
}

#[tokio::test]
async fn test_sqlite_fleet_create_update_deactivate() {
    let pool = connect_and_migrate().await;
    let accounts = SqliteAccountStore::new(pool.clone());
    let fleet = SqliteFleetStore::new(pool);
    accounts.save(&Account::new(1, Some("aa:bb".to_string()))).await.unwrap();

    let synced_at = Utc::now();
    let summary = fleet
        .apply_fleet(1, &[terminal_snapshot(10), terminal_snapshot(11)], synced_at)
        .await
        .unwrap();
    assert_eq!((summary.created, summary.updated, summary.deactivated), (2, 0, 0));

    let before = fleet.list_terminals(1).await.unwrap();
    assert_eq!(before.len(), 2);
    assert!(before.iter().all(|t| t.is_active));

    // Terminal 11 disappears, then comes back renamed.
    let summary = fleet.apply_fleet(1, &[terminal_snapshot(10)], synced_at).await.unwrap();
    assert_eq!((summary.created, summary.updated, summary.deactivated), (0, 1, 1));
    let terminals = fleet.list_terminals(1).await.unwrap();
    assert!(terminals[0].is_active);
    assert!(!terminals[1].is_active);

    let mut renamed = terminal_snapshot(11);
    renamed.name = "Lobby".to_string();
    let summary = fleet
        .apply_fleet(1, &[terminal_snapshot(10), renamed], synced_at)
        .await
        .unwrap();
    assert_eq!((summary.created, summary.updated), (0, 2));

    let after = fleet.list_terminals(1).await.unwrap();
    assert_eq!(after[1].name, "Lobby");
    assert!(after[1].is_active);
    assert_eq!(after[0].internal_id, before[0].internal_id);
    assert_eq!(after[1].internal_id, before[1].internal_id);
}

#[tokio::test]
async fn test_sqlite_fleet_resources_provisioned_once() {
    let pool = connect_and_migrate().await;
    let fleet = SqliteFleetStore::new(pool);

    fleet.apply_fleet(1, &[terminal_snapshot(10)], Utc::now()).await.unwrap();
    fleet.apply_fleet(1, &[], Utc::now()).await.unwrap();
    fleet.apply_fleet(1, &[terminal_snapshot(10)], Utc::now()).await.unwrap();

    let terminal = fleet.list_terminals(1).await.unwrap().remove(0);
    let resources = fleet.list_resources(terminal.internal_id).await.unwrap();
    assert_eq!(resources.len(), DEFAULT_RESOURCES.len());
    assert!(resources.windows(2).all(|w| w[0].name < w[1].name));
}

#[tokio::test]
async fn test_sqlite_fleet_empty_listing_deactivates_all() {
    let pool = connect_and_migrate().await;
    let fleet = SqliteFleetStore::new(pool);

    fleet
        .apply_fleet(1, &[terminal_snapshot(10), terminal_snapshot(11)], Utc::now())
        .await
        .unwrap();
    fleet.apply_fleet(2, &[terminal_snapshot(20)], Utc::now()).await.unwrap();

    let summary = fleet.apply_fleet(1, &[], Utc::now()).await.unwrap();
    assert_eq!(summary.deactivated, 2);
    assert!(fleet.list_terminals(1).await.unwrap().iter().all(|t| !t.is_active));
    // Other accounts are untouched.
    assert!(fleet.list_terminals(2).await.unwrap()[0].is_active);
}

#[tokio::test]
async fn test_sqlite_fleet_resets_account_statuses() {
    let pool = connect_and_migrate().await;
    let accounts = SqliteAccountStore::new(pool.clone());
    let fleet = SqliteFleetStore::new(pool);
    accounts.save(&Account::new(1, Some("aa:bb".to_string()))).await.unwrap();
    accounts.mark_payment_required(1, Utc::now()).await.unwrap();
    accounts.mark_credentials_invalid(1).await.unwrap();

    let summary = fleet.apply_fleet(1, &[], Utc::now()).await.unwrap();
    assert!(summary.payment_recovered);
    assert!(summary.credentials_recovered);

    let account = accounts.get(1).await.unwrap().unwrap();
    assert_eq!(account.payment_status, PaymentStatus::Active);
    assert!(account.payment_notified_at.is_none());
    assert_eq!(account.credential_status, CredentialStatus::Valid);

    let summary = fleet.apply_fleet(1, &[], Utc::now()).await.unwrap();
    assert!(!summary.payment_recovered);
    assert!(!summary.credentials_recovered);
}

#[tokio::test]
async fn test_sqlite_fleet_failure_rolls_back() {
    let pool = connect_and_migrate().await;
    let fleet = SqliteFleetStore::new(pool.clone());
    fleet.apply_fleet(1, &[terminal_snapshot(10)], Utc::now()).await.unwrap();

    // Provisioning a new terminal fails after the terminal row is written.
    sqlx::query("DROP TABLE inventory_resources")
        .execute(&pool)
        .await
        .unwrap();

    let result = fleet.apply_fleet(1, &[terminal_snapshot(11)], Utc::now()).await;
    assert!(result.is_err());

    let terminals = fleet.list_terminals(1).await.unwrap();
    assert_eq!(terminals.len(), 1);
    assert_eq!(terminals[0].upstream_id, 10);
    assert!(terminals[0].is_active);
}

/// Timeouts short enough to cancel some attempts between statements.
const CANCEL_AFTER_MICROS: [u64; 8] = [10, 50, 100, 250, 500, 1_000, 2_500, 5_000];

#[tokio::test]
async fn test_sqlite_cancelled_fleet_apply_leaves_no_partial_state() {
    let pool = connect_and_migrate().await;
    let fleet = SqliteFleetStore::new(pool);
    let listing: Vec<_> = (1..=500).map(terminal_snapshot).collect();

    for (account_id, micros) in (1i64..).zip(CANCEL_AFTER_MICROS) {
        let _ = tokio::time::timeout(
            Duration::from_micros(micros),
            fleet.apply_fleet(account_id, &listing, Utc::now()),
        )
        .await;

        // Either the whole listing landed or none of it did.
        let stored = fleet.list_terminals(account_id).await.unwrap().len();
        assert!(
            stored == 0 || stored == listing.len(),
            "{} of {} terminals stored after cancellation",
            stored,
            listing.len()
        );

        // The connection is usable for the next reconciliation.
        let summary = fleet
            .apply_fleet(1_000 + account_id, &[terminal_snapshot(1)], Utc::now())
            .await
            .unwrap();
        assert_eq!(summary.created, 1);
    }
}

#[tokio::test]
async fn test_sqlite_cancelled_upsert_leaves_no_partial_page() {
    let pool = connect_and_migrate().await;
    let store = SqliteTransactionStore::new(pool);

    for (account_id, micros) in (1i64..).zip(CANCEL_AFTER_MICROS) {
        let page: Vec<Transaction> = (0..500)
            .map(|n| transaction(account_id * 10_000 + n, account_id, None))
            .collect();
        let _ = tokio::time::timeout(
            Duration::from_micros(micros),
            store.upsert_page(&page, Utc::now()),
        )
        .await;

        let stored = store.count_for_account(account_id).await.unwrap();
        assert!(
            stored == 0 || stored == page.len() as u64,
            "{} of {} transactions stored after cancellation",
            stored,
            page.len()
        );

        let counts = store
            .upsert_page(&[transaction(-account_id, 1_000 + account_id, None)], Utc::now())
            .await
            .unwrap();
        assert_eq!(counts.added, 1);
    }
}

#[tokio::test]
async fn test_sqlite_transactions_upsert_counts() {
    let pool = connect_and_migrate().await;
    let store = SqliteTransactionStore::new(pool);

    let counts = store
        .upsert_page(&[transaction(1, 1, Some(42)), transaction(2, 1, None)], Utc::now())
        .await
        .unwrap();
    assert_eq!(counts, SyncCounts { processed: 2, added: 2, updated: 0 });

    let counts = store
        .upsert_page(&[transaction(2, 1, None), transaction(3, 1, None)], Utc::now())
        .await
        .unwrap();
    assert_eq!(counts, SyncCounts { processed: 2, added: 1, updated: 1 });

    assert_eq!(store.count_for_account(1).await.unwrap(), 3);
    assert_eq!(store.count_for_account(2).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sqlite_transactions_duplicate_within_page() {
    let pool = connect_and_migrate().await;
    let store = SqliteTransactionStore::new(pool);

    let counts = store
        .upsert_page(&[transaction(7, 1, None), transaction(7, 1, Some(3))], Utc::now())
        .await
        .unwrap();
    assert_eq!(counts, SyncCounts { processed: 2, added: 1, updated: 1 });
    assert_eq!(store.count_for_account(1).await.unwrap(), 1);
    assert_eq!(store.get(7).await.unwrap().unwrap().item_id, Some(3));
}

#[tokio::test]
async fn test_sqlite_transactions_keep_item_id() {
    let pool = connect_and_migrate().await;
    let store = SqliteTransactionStore::new(pool);

    store.upsert_page(&[transaction(5, 1, Some(42))], Utc::now()).await.unwrap();

    let mut refund = transaction(5, 1, None);
    refund.amount_minor = -15000;
    store.upsert_page(&[refund], Utc::now()).await.unwrap();

    let stored = store.get(5).await.unwrap().unwrap();
    assert_eq!(stored.item_id, Some(42));
    assert_eq!(stored.amount_minor, -15000);
    assert_eq!(stored.occurred_at, transaction(5, 1, None).occurred_at);

    store.upsert_page(&[transaction(5, 1, Some(7))], Utc::now()).await.unwrap();
    assert_eq!(store.get(5).await.unwrap().unwrap().item_id, Some(7));

    assert!(store.get(6).await.unwrap().is_none());
}

#[tokio::test]
async fn test_sqlite_transactions_empty_page() {
    let pool = connect_and_migrate().await;
    let store = SqliteTransactionStore::new(pool);

    let counts = store.upsert_page(&[], Utc::now()).await.unwrap();
    assert_eq!(counts, SyncCounts::default());
}

#[tokio::test]
async fn test_sqlite_job_runs_recent() {
    let pool = connect_and_migrate().await;
    let store = SqliteJobRunStore::new(pool);

    let counts = SyncCounts { processed: 3, added: 2, updated: 1 };
    store
        .append(&JobRun::new(Some(1), "tier_weekly", JobStatus::Success).with_counts(counts))
        .await
        .unwrap();
    store
        .append(&JobRun::new(None, "tier_weekly", JobStatus::Failure).with_message("listing"))
        .await
        .unwrap();
    store
        .append(&JobRun::new(Some(1), "tier_realtime", JobStatus::SkippedDueToLock))
        .await
        .unwrap();
    store
        .append(&JobRun::new(Some(2), "manual_import", JobStatus::SkippedNoToken))
        .await
        .unwrap();

    let all = store.recent(None, 10).await.unwrap();
    let jobs: Vec<&str> = all.iter().map(|r| r.job.as_str()).collect();
    assert_eq!(
        jobs,
        vec!["manual_import", "tier_realtime", "tier_weekly", "tier_weekly"]
    );
    assert_eq!(all[2].account_id, None);
    assert_eq!(all[2].message.as_deref(), Some("listing"));

    let mine = store.recent(Some(1), 10).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert_eq!(mine[0].status, JobStatus::SkippedDueToLock);
    assert_eq!(mine[1].status, JobStatus::Success);
    assert_eq!(mine[1].counts, counts);

    assert_eq!(store.recent(None, 1).await.unwrap().len(), 1);
}
