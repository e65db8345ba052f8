//! Tier sweeps and manual entry points.

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use tracing::{debug, error, info, warn};

use super::{
    with_storage_timeout, AccountStateHandler, ImportFailure, ImportGuard, JobAudit, SyncError,
    TerminalReconciler, Tier, TransactionImporter, MANUAL_IMPORT_JOB, MANUAL_RECONCILE_JOB,
};
use crate::config::Config;
use crate::crypto::CredentialCipher;
use crate::model::{
    Account, AccountId, CredentialStatus, DateWindow, FleetSummary, JobRun, JobStatus, PageMode,
    SyncCounts,
};
use crate::notify::Notifier;
use crate::storage::Storage;
use crate::upstream::VendingPlatform;

/// Tunables the engine takes from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Items per transaction page.
    pub page_size: u32,
    /// Limit for every storage call.
    pub storage_timeout: Duration,
    /// Offset used to compute "today" for import windows.
    pub offset: FixedOffset,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            page_size: 1000,
            storage_timeout: Duration::from_secs(20),
            offset: Utc.fix(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &Config, offset: FixedOffset) -> Self {
        Self {
            page_size: config.upstream.page_size,
            storage_timeout: config.storage.timeout(),
            offset,
        }
    }
}

/// Per-status totals of one tier sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierReport {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped_due_to_lock: usize,
    pub skipped_no_token: usize,
    /// The account list could not be read; nothing else ran.
    pub listing_failed: bool,
}

impl TierReport {
    fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Success => self.succeeded += 1,
            JobStatus::Failure => self.failed += 1,
            JobStatus::SkippedDueToLock => self.skipped_due_to_lock += 1,
            JobStatus::SkippedNoToken => self.skipped_no_token += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped_due_to_lock + self.skipped_no_token
    }
}

/// The synchronization engine.
///
/// Owns the concurrency guard; tier tasks and manual entry points share one
/// engine (behind an `Arc`) so they see the same in-flight set.
pub struct SyncEngine {
    storage: Storage,
    cipher: CredentialCipher,
    guard: ImportGuard,
    importer: TransactionImporter,
    reconciler: TerminalReconciler,
    account_state: AccountStateHandler,
    audit: JobAudit,
    settings: EngineSettings,
}

impl SyncEngine {
    pub fn new(
        storage: Storage,
        platform: Arc<dyn VendingPlatform>,
        notifier: Arc<dyn Notifier>,
        cipher: CredentialCipher,
        settings: EngineSettings,
    ) -> Self {
        let timeout = settings.storage_timeout;
        let account_state =
            AccountStateHandler::new(storage.accounts.clone(), notifier.clone(), timeout);

        Self {
            importer: TransactionImporter::new(
                platform.clone(),
                storage.transactions.clone(),
                settings.page_size,
                timeout,
            ),
            reconciler: TerminalReconciler::new(
                platform,
                storage.fleet.clone(),
                account_state.clone(),
                notifier,
                timeout,
            ),
            audit: JobAudit::new(storage.job_runs.clone(), timeout),
            account_state,
            guard: ImportGuard::new(),
            cipher,
            storage,
            settings,
        }
    }

    /// The engine's concurrency guard.
    pub fn guard(&self) -> &ImportGuard {
        &self.guard
    }

    /// Operator-local date.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.settings.offset).date_naive()
    }

    /// Sweep every account with a stored credential, sequentially.
    pub async fn run_tier(&self, tier: Tier) -> TierReport {
        self.run_tier_on(tier, self.today()).await
    }

    /// [`run_tier`](Self::run_tier) with an explicit "today".
    pub async fn run_tier_on(&self, tier: Tier, today: NaiveDate) -> TierReport {
        let job = tier.job_name();
        let window = tier.window(today);
        let mut report = TierReport::default();

        let accounts = match with_storage_timeout(
            self.settings.storage_timeout,
            self.storage.accounts.list_with_credentials(),
        )
        .await
        {
            Ok(accounts) => accounts,
            Err(e) => {
                error!(job, error = %e, "Failed to list accounts");
                self.audit
                    .record(
                        JobRun::new(None, job, JobStatus::Failure)
                            .with_message(format!("account listing failed: {}", e)),
                    )
                    .await;
                report.listing_failed = true;
                return report;
            }
        };

        info!(job, accounts = accounts.len(), from = %window.from, to = %window.to, "Tier sweep started");

        for account in &accounts {
            let status = self.run_account(account, tier, window).await;
            report.record(status);
        }

        info!(
            job,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped_due_to_lock = report.skipped_due_to_lock,
            skipped_no_token = report.skipped_no_token,
            "Tier sweep finished"
        );
        report
    }

    /// One account within a tier sweep. Every outcome is audited.
    async fn run_account(&self, account: &Account, tier: Tier, window: DateWindow) -> JobStatus {
        let job = tier.job_name();

        let Some(encrypted) = account.credential() else {
            self.audit
                .record(JobRun::new(Some(account.id), job, JobStatus::SkippedNoToken))
                .await;
            return JobStatus::SkippedNoToken;
        };

        let Some(credential) = self.cipher.decrypt(encrypted) else {
            warn!(account_id = account.id, job, "Token decryption failed, skipping account");
            self.audit
                .record(
                    JobRun::new(Some(account.id), job, JobStatus::Failure)
                        .with_message(SyncError::TokenDecryption.to_string()),
                )
                .await;
            return JobStatus::Failure;
        };

        let Some(_permit) = self.guard.try_acquire(account.id) else {
            info!(account_id = account.id, job, "Run already in flight, skipping account");
            self.audit
                .record(JobRun::new(Some(account.id), job, JobStatus::SkippedDueToLock))
                .await;
            return JobStatus::SkippedDueToLock;
        };

        match self
            .sync_account(account, &credential, window, tier.page_mode(), job)
            .await
        {
            Ok(counts) => {
                self.audit
                    .record(JobRun::new(Some(account.id), job, JobStatus::Success).with_counts(counts))
                    .await;
                JobStatus::Success
            }
            Err(failure) => {
                self.audit
                    .record(
                        JobRun::new(Some(account.id), job, JobStatus::Failure)
                            .with_counts(failure.counts)
                            .with_message(failure.error.to_string()),
                    )
                    .await;
                JobStatus::Failure
            }
        }
    }

    /// Reconcile terminals, then import transactions. Caller holds the permit.
    async fn sync_account(
        &self,
        account: &Account,
        credential: &str,
        window: DateWindow,
        mode: PageMode,
        job: &str,
    ) -> Result<SyncCounts, ImportFailure> {
        self.reconciler.reconcile(account, credential, job).await?;
        self.import_window(account, credential, window, mode, job)
            .await
    }

    /// Clamp to the setup date, import, and route vendor rejections.
    async fn import_window(
        &self,
        account: &Account,
        credential: &str,
        window: DateWindow,
        mode: PageMode,
        job: &str,
    ) -> Result<SyncCounts, ImportFailure> {
        let Some(window) = window.clamp_start(account.setup_date) else {
            debug!(
                account_id = account.id,
                setup_date = ?account.setup_date,
                "Import window ends before setup date"
            );
            return Ok(SyncCounts::default());
        };

        match self.importer.import(account.id, credential, window, mode).await {
            Ok(counts) => Ok(counts),
            Err(failure) => {
                self.account_state.apply(account, job, &failure.error).await;
                Err(failure)
            }
        }
    }

    async fn load_account(&self, account_id: AccountId) -> Result<Account, SyncError> {
        with_storage_timeout(
            self.settings.storage_timeout,
            self.storage.accounts.get(account_id),
        )
        .await?
        .ok_or(SyncError::AccountNotFound(account_id))
    }

    /// Import transactions for one account over `window`, all pages.
    ///
    /// Uses the stored credential and the same guard as the tier sweeps.
    pub async fn import_account(
        &self,
        account_id: AccountId,
        window: DateWindow,
    ) -> Result<SyncCounts, ImportFailure> {
        let job = MANUAL_IMPORT_JOB;
        let account = self.load_account(account_id).await?;

        let result = self.import_account_inner(&account, window).await;

        let run = match &result {
            Ok(counts) => JobRun::new(Some(account_id), job, JobStatus::Success).with_counts(*counts),
            Err(failure) => {
                let status = match failure.error {
                    SyncError::NoCredential => JobStatus::SkippedNoToken,
                    SyncError::Locked(_) => JobStatus::SkippedDueToLock,
                    _ => JobStatus::Failure,
                };
                JobRun::new(Some(account_id), job, status)
                    .with_counts(failure.counts)
                    .with_message(failure.error.to_string())
            }
        };
        self.audit.record(run).await;

        result
    }

    async fn import_account_inner(
        &self,
        account: &Account,
        window: DateWindow,
    ) -> Result<SyncCounts, ImportFailure> {
        let encrypted = account.credential().ok_or(SyncError::NoCredential)?;
        let credential = self
            .cipher
            .decrypt(encrypted)
            .ok_or(SyncError::TokenDecryption)?;
        let _permit = self
            .guard
            .try_acquire(account.id)
            .ok_or(SyncError::Locked(account.id))?;

        let counts = self
            .import_window(account, &credential, window, PageMode::AllPages, MANUAL_IMPORT_JOB)
            .await?;

        if account.credential_status == CredentialStatus::InvalidCreds {
            if let Err(e) = self.account_state.credential_accepted(account.id).await {
                warn!(account_id = account.id, error = %e, "Failed to mark credential valid");
            }
        }
        Ok(counts)
    }

    /// Reconcile terminals for one account with a plaintext credential,
    /// typically one the owner just entered.
    pub async fn reconcile_account(
        &self,
        account_id: AccountId,
        credential: &str,
    ) -> Result<FleetSummary, SyncError> {
        let job = MANUAL_RECONCILE_JOB;
        let account = self.load_account(account_id).await?;

        let result = match self.guard.try_acquire(account_id) {
            Some(_permit) => self.reconciler.reconcile(&account, credential, job).await,
            None => Err(SyncError::Locked(account_id)),
        };

        let run = match &result {
            Ok(summary) => JobRun::new(Some(account_id), job, JobStatus::Success).with_counts(
                SyncCounts {
                    processed: summary.created + summary.updated,
                    added: summary.created,
                    updated: summary.updated,
                },
            ),
            Err(SyncError::Locked(_)) => {
                JobRun::new(Some(account_id), job, JobStatus::SkippedDueToLock)
            }
            Err(e) => JobRun::new(Some(account_id), job, JobStatus::Failure).with_message(e.to_string()),
        };
        self.audit.record(run).await;

        result
    }
}
