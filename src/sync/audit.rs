//! Job audit log writer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use super::with_storage_timeout;
use crate::model::JobRun;
use crate::storage::JobRunStore;

/// Appends job run records. A failed append is logged and swallowed so it
/// never fails the job being audited.
#[derive(Clone)]
pub struct JobAudit {
    store: Arc<dyn JobRunStore>,
    timeout: Duration,
}

impl JobAudit {
    pub fn new(store: Arc<dyn JobRunStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn record(&self, run: JobRun) {
        match with_storage_timeout(self.timeout, self.store.append(&run)).await {
            Ok(()) => debug!(
                account_id = ?run.account_id,
                job = %run.job,
                status = run.status.as_str(),
                processed = run.counts.processed,
                added = run.counts.added,
                updated = run.counts.updated,
                "Job run recorded"
            ),
            Err(e) => error!(
                account_id = ?run.account_id,
                job = %run.job,
                status = run.status.as_str(),
                error = %e,
                "Failed to record job run"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;
    use crate::storage::MockStore;

    #[tokio::test]
    async fn test_record_appends() {
        let store = Arc::new(MockStore::new());
        let audit = JobAudit::new(store.clone(), Duration::from_secs(1));

        audit
            .record(JobRun::new(Some(1), "tier_realtime", JobStatus::Success))
            .await;

        assert_eq!(store.job_runs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_append_is_swallowed() {
        let store = Arc::new(MockStore::new());
        store.set_fail_on_job_runs(true).await;
        let audit = JobAudit::new(store.clone(), Duration::from_secs(1));

        audit
            .record(JobRun::new(Some(1), "tier_realtime", JobStatus::Failure))
            .await;

        assert!(store.job_runs().await.is_empty());
    }
}
