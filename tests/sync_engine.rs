//! End-to-end sync engine tests against SQLite storage.
//!
//! The vending platform and notifier are scripted; everything between them
//! runs for real.

use std::sync::Arc;

use vendsync::config::StorageConfig;
use vendsync::model::{Account, CredentialStatus, DateWindow, JobStatus, PaymentStatus};
use vendsync::storage::{init_storage, Storage};
use vendsync::sync::{EngineSettings, SyncEngine, Tier};
use vendsync::test_utils::{
    date, terminal_snapshot, test_cipher, upstream_transaction, MockVendingPlatform,
    RecordingNotifier,
};
use vendsync::upstream::UpstreamError;

struct Fixture {
    storage: Storage,
    platform: Arc<MockVendingPlatform>,
    notifier: Arc<RecordingNotifier>,
    engine: SyncEngine,
}

async fn fixture() -> Fixture {
    let storage = init_storage(&StorageConfig {
        path: ":memory:".to_string(),
        ..Default::default()
    })
    .await
    .expect("Failed to open storage");

    let platform = Arc::new(MockVendingPlatform::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = SyncEngine::new(
        storage.clone(),
        platform.clone(),
        notifier.clone(),
        test_cipher(),
        EngineSettings::default(),
    );

    Fixture {
        storage,
        platform,
        notifier,
        engine,
    }
}

async fn seed_account(storage: &Storage, id: i64, owner_chat_id: Option<&str>) {
    let encrypted = test_cipher().encrypt("vendor-token").unwrap();
    let mut account = Account::new(id, Some(encrypted));
    account.owner_chat_id = owner_chat_id.map(str::to_string);
    storage.accounts.save(&account).await.unwrap();
}

#[tokio::test]
async fn test_weekly_sweep_persists_fleet_and_transactions() {
    let f = fixture().await;
    seed_account(&f.storage, 1, None).await;
    f.platform
        .set_terminals(vec![terminal_snapshot(10), terminal_snapshot(11)])
        .await;
    f.platform
        .set_transaction_pages(vec![vec![
            upstream_transaction(100, Some(1)),
            upstream_transaction(101, None),
            upstream_transaction(102, Some(2)),
        ]])
        .await;

    let report = f.engine.run_tier_on(Tier::Weekly, date(2024, 5, 12)).await;
    assert_eq!(report.succeeded, 1);

    let terminals = f.storage.fleet.list_terminals(1).await.unwrap();
    assert_eq!(terminals.len(), 2);
    assert_eq!(f.storage.transactions.count_for_account(1).await.unwrap(), 3);

    let runs = f.storage.job_runs.recent(Some(1), 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].job, "tier_weekly");
    assert_eq!(runs[0].status, JobStatus::Success);
    assert_eq!(runs[0].counts.added, 3);

    assert_eq!(
        f.platform.requested().await[0].0,
        DateWindow::new(date(2024, 5, 5), date(2024, 5, 12))
    );

    // Same data again: nothing new, nothing duplicated.
    f.engine.run_tier_on(Tier::Weekly, date(2024, 5, 12)).await;
    assert_eq!(f.storage.transactions.count_for_account(1).await.unwrap(), 3);
    let runs = f.storage.job_runs.recent(Some(1), 1).await.unwrap();
    assert_eq!(runs[0].counts.added, 0);
    assert_eq!(runs[0].counts.updated, 3);
}

#[tokio::test]
async fn test_billing_hold_persists_and_recovers() {
    let f = fixture().await;
    seed_account(&f.storage, 1, Some("555")).await;
    f.platform
        .set_terminal_error(Some(UpstreamError::PaymentRequired))
        .await;

    f.engine.run_tier_on(Tier::Realtime, date(2024, 5, 8)).await;
    f.engine.run_tier_on(Tier::Realtime, date(2024, 5, 8)).await;

    let account = f.storage.accounts.get(1).await.unwrap().unwrap();
    assert_eq!(account.payment_status, PaymentStatus::PaymentRequired);
    assert!(account.payment_notified_at.is_some());
    assert_eq!(f.notifier.admin_alerts().await.len(), 1);
    let messages = f.notifier.user_messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].0, "555");

    f.platform.set_terminal_error(None).await;
    let report = f.engine.run_tier_on(Tier::Realtime, date(2024, 5, 8)).await;
    assert_eq!(report.succeeded, 1);

    let account = f.storage.accounts.get(1).await.unwrap().unwrap();
    assert_eq!(account.payment_status, PaymentStatus::Active);
    assert!(account.payment_notified_at.is_none());
}

#[tokio::test]
async fn test_invalid_credential_persists_and_manual_import_restores() {
    let f = fixture().await;
    seed_account(&f.storage, 1, None).await;
    f.platform
        .set_terminal_error(Some(UpstreamError::InvalidCredential(
            "token revoked".to_string(),
        )))
        .await;

    f.engine.run_tier_on(Tier::EndOfDay, date(2024, 5, 8)).await;
    let account = f.storage.accounts.get(1).await.unwrap().unwrap();
    assert_eq!(account.credential_status, CredentialStatus::InvalidCreds);
    // Reconciliation failed, so no import was attempted.
    assert_eq!(f.platform.transaction_calls(), 0);

    f.platform.set_terminal_error(None).await;
    f.platform
        .set_transaction_pages(vec![vec![upstream_transaction(200, None)]])
        .await;
    let counts = f
        .engine
        .import_account(1, DateWindow::new(date(2024, 4, 1), date(2024, 4, 30)))
        .await
        .unwrap();
    assert_eq!(counts.added, 1);

    let account = f.storage.accounts.get(1).await.unwrap().unwrap();
    assert_eq!(account.credential_status, CredentialStatus::Valid);

    let runs = f.storage.job_runs.recent(Some(1), 10).await.unwrap();
    assert_eq!(runs[0].job, "manual_import");
    assert_eq!(runs[1].status, JobStatus::Failure);
}

#[tokio::test]
async fn test_sweep_isolates_accounts() {
    let f = fixture().await;
    seed_account(&f.storage, 1, None).await;
    f.storage
        .accounts
        .save(&Account::new(2, Some("garbage".to_string())))
        .await
        .unwrap();
    seed_account(&f.storage, 3, None).await;

    let report = f.engine.run_tier_on(Tier::EndOfDay, date(2024, 5, 8)).await;
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);

    let failed = f.storage.job_runs.recent(Some(2), 1).await.unwrap();
    assert_eq!(failed[0].status, JobStatus::Failure);
    assert_eq!(failed[0].message.as_deref(), Some("token decryption failed"));
}
