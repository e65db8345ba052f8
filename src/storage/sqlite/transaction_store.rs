//! SQLite TransactionStore implementation.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::model::{AccountId, SyncCounts, Transaction, UpstreamTransactionId};
use crate::storage::helpers::parse_timestamp;
use crate::storage::schema::Transactions;
use crate::storage::{Result, TransactionStore};

/// SQLite implementation of TransactionStore.
pub struct SqliteTransactionStore {
    pool: SqlitePool,
}

impl SqliteTransactionStore {
    /// Create a new SQLite transaction store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn upsert_in_transaction(
        conn: &mut SqliteConnection,
        page: &[Transaction],
        updated_at: DateTime<Utc>,
    ) -> Result<SyncCounts> {
        let ids: Vec<UpstreamTransactionId> = page.iter().map(|t| t.id).collect();
        let query = Query::select()
            .column(Transactions::Id)
            .from(Transactions::Table)
            .and_where(Expr::col(Transactions::Id).is_in(ids))
            .to_string(SqliteQueryBuilder);

        let mut existing: HashSet<UpstreamTransactionId> = sqlx::query(&query)
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|row| row.get("id"))
            .collect();

        let updated_at = updated_at.to_rfc3339();
        let mut counts = SyncCounts::default();

        for txn in page {
            let query = Query::insert()
                .into_table(Transactions::Table)
                .columns([
                    Transactions::Id,
                    Transactions::AccountId,
                    Transactions::TerminalId,
                    Transactions::AmountMinor,
                    Transactions::OccurredAt,
                    Transactions::ResultCode,
                    Transactions::ReversalId,
                    Transactions::Comment,
                    Transactions::ItemId,
                    Transactions::UpdatedAt,
                ])
                .values_panic([
                    txn.id.into(),
                    txn.account_id.into(),
                    txn.terminal_id.into(),
                    txn.amount_minor.into(),
                    txn.occurred_at.to_rfc3339().into(),
                    txn.result_code.into(),
                    txn.reversal_id.into(),
                    txn.comment.clone().into(),
                    txn.item_id.into(),
                    updated_at.clone().into(),
                ])
                .on_conflict(
                    OnConflict::column(Transactions::Id)
                        .update_columns([
                            Transactions::AccountId,
                            Transactions::TerminalId,
                            Transactions::AmountMinor,
                            Transactions::OccurredAt,
                            Transactions::ResultCode,
                            Transactions::ReversalId,
                            Transactions::Comment,
                            Transactions::UpdatedAt,
                        ])
                        // A missing item id must not erase a known one.
                        .value(
                            Transactions::ItemId,
                            Expr::cust("COALESCE(excluded.item_id, transactions.item_id)"),
                        )
                        .to_owned(),
                )
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&mut *conn).await?;

            counts.processed += 1;
            if existing.insert(txn.id) {
                counts.added += 1;
            } else {
                counts.updated += 1;
            }
        }

        Ok(counts)
    }
}

#[async_trait]
impl TransactionStore for SqliteTransactionStore {
    async fn upsert_page(
        &self,
        page: &[Transaction],
        updated_at: DateTime<Utc>,
    ) -> Result<SyncCounts> {
        if page.is_empty() {
            return Ok(SyncCounts::default());
        }

        // Dropping `tx` uncommitted (error or cancellation) rolls back.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let counts = Self::upsert_in_transaction(&mut *tx, page, updated_at).await?;

        tx.commit().await?;
        Ok(counts)
    }

    async fn get(&self, id: UpstreamTransactionId) -> Result<Option<Transaction>> {
        let query = Query::select()
            .columns([
                Transactions::Id,
                Transactions::AccountId,
                Transactions::TerminalId,
                Transactions::AmountMinor,
                Transactions::OccurredAt,
                Transactions::ResultCode,
                Transactions::ReversalId,
                Transactions::Comment,
                Transactions::ItemId,
            ])
            .from(Transactions::Table)
            .and_where(Expr::col(Transactions::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let Some(row) = sqlx::query(&query).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let occurred_at: String = row.get("occurred_at");
        Ok(Some(Transaction {
            id: row.get("id"),
            account_id: row.get("account_id"),
            terminal_id: row.get("terminal_id"),
            amount_minor: row.get("amount_minor"),
            occurred_at: parse_timestamp(&occurred_at)?,
            result_code: row.get("result_code"),
            reversal_id: row.get("reversal_id"),
            comment: row.get("comment"),
            item_id: row.get("item_id"),
        }))
    }

    async fn count_for_account(&self, account_id: AccountId) -> Result<u64> {
        let query = Query::select()
            .expr(Expr::col(Transactions::Id).count())
            .from(Transactions::Table)
            .and_where(Expr::col(Transactions::AccountId).eq(account_id))
            .to_string(SqliteQueryBuilder);

        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }
}
