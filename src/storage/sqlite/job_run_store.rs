//! SQLite JobRunStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqlitePool};

use crate::model::{AccountId, JobRun, JobStatus, SyncCounts};
use crate::storage::helpers::parse_timestamp;
use crate::storage::schema::JobRuns;
use crate::storage::{JobRunStore, Result};

/// SQLite implementation of JobRunStore.
pub struct SqliteJobRunStore {
    pool: SqlitePool,
}

impl SqliteJobRunStore {
    /// Create a new SQLite job run store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_status(value: &str) -> JobStatus {
    match value {
        "success" => JobStatus::Success,
        "skipped_due_to_lock" => JobStatus::SkippedDueToLock,
        "skipped_no_token" => JobStatus::SkippedNoToken,
        _ => JobStatus::Failure,
    }
}

#[async_trait]
impl JobRunStore for SqliteJobRunStore {
    async fn append(&self, run: &JobRun) -> Result<()> {
        let query = Query::insert()
            .into_table(JobRuns::Table)
            .columns([
                JobRuns::AccountId,
                JobRuns::Job,
                JobRuns::RanAt,
                JobRuns::Status,
                JobRuns::Processed,
                JobRuns::Added,
                JobRuns::Updated,
                JobRuns::Message,
            ])
            .values_panic([
                run.account_id.into(),
                run.job.clone().into(),
                run.ran_at.to_rfc3339().into(),
                run.status.as_str().into(),
                (run.counts.processed as i64).into(),
                (run.counts.added as i64).into(),
                (run.counts.updated as i64).into(),
                run.message.clone().into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn recent(&self, account_id: Option<AccountId>, limit: u32) -> Result<Vec<JobRun>> {
        let query = {
            let mut select = Query::select();
            select
                .columns([
                    JobRuns::AccountId,
                    JobRuns::Job,
                    JobRuns::RanAt,
                    JobRuns::Status,
                    JobRuns::Processed,
                    JobRuns::Added,
                    JobRuns::Updated,
                    JobRuns::Message,
                ])
                .from(JobRuns::Table)
                .order_by(JobRuns::Id, Order::Desc)
                .limit(u64::from(limit));
            if let Some(account_id) = account_id {
                select.and_where(Expr::col(JobRuns::AccountId).eq(account_id));
            }
            select.to_string(SqliteQueryBuilder)
        };

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in rows {
            let ran_at: String = row.get("ran_at");
            let status: String = row.get("status");
            let processed: i64 = row.get("processed");
            let added: i64 = row.get("added");
            let updated: i64 = row.get("updated");

            runs.push(JobRun {
                account_id: row.get("account_id"),
                job: row.get("job"),
                ran_at: parse_timestamp(&ran_at)?,
                status: parse_status(&status),
                counts: SyncCounts {
                    processed: processed.max(0) as u64,
                    added: added.max(0) as u64,
                    updated: updated.max(0) as u64,
                },
                message: row.get("message"),
            });
        }

        Ok(runs)
    }
}
