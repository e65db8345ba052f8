//! SQLite FleetStore implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::model::{
    AccountId, CredentialStatus, FleetSummary, InventoryResource, PaymentStatus, Terminal,
    TerminalSnapshot, UpstreamTerminalId, DEFAULT_RESOURCES,
};
use crate::storage::helpers::{flag, parse_optional_timestamp, parse_timestamp};
use crate::storage::schema::{Accounts, InventoryResources, Terminals};
use crate::storage::{FleetStore, Result};

/// SQLite implementation of FleetStore.
pub struct SqliteFleetStore {
    pool: SqlitePool,
}

impl SqliteFleetStore {
    /// Create a new SQLite fleet store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Steps 1-4 of a reconciliation, within an already-started transaction.
    async fn apply_in_transaction(
        conn: &mut SqliteConnection,
        account_id: AccountId,
        listing: &[TerminalSnapshot],
        synced_at: DateTime<Utc>,
    ) -> Result<FleetSummary> {
        let synced_at = synced_at.to_rfc3339();
        let mut summary = FleetSummary::default();

        let mut known: HashMap<UpstreamTerminalId, String> = {
            let query = Query::select()
                .columns([Terminals::UpstreamId, Terminals::InternalId])
                .from(Terminals::Table)
                .and_where(Expr::col(Terminals::AccountId).eq(account_id))
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query)
                .fetch_all(&mut *conn)
                .await?
                .iter()
                .map(|row| (row.get("upstream_id"), row.get("internal_id")))
                .collect()
        };

        for terminal in listing {
            let last_online_at = terminal.last_online_at.map(|t| t.to_rfc3339());

            if let Some(internal_id) = known.get(&terminal.upstream_id) {
                let query = Query::update()
                    .table(Terminals::Table)
                    .values([
                        (Terminals::Name, terminal.name.clone().into()),
                        (Terminals::SerialNumber, terminal.serial_number.clone().into()),
                        (Terminals::IsOnline, flag(terminal.is_online).into()),
                        (Terminals::LastOnlineAt, last_online_at.into()),
                        (Terminals::LastSyncedAt, synced_at.clone().into()),
                        (Terminals::IsActive, flag(true).into()),
                    ])
                    .and_where(Expr::col(Terminals::InternalId).eq(internal_id.as_str()))
                    .to_string(SqliteQueryBuilder);

                sqlx::query(&query).execute(&mut *conn).await?;
                summary.updated += 1;
                continue;
            }

            let internal_id = Uuid::new_v4().to_string();
            let query = Query::insert()
                .into_table(Terminals::Table)
                .columns([
                    Terminals::InternalId,
                    Terminals::AccountId,
                    Terminals::UpstreamId,
                    Terminals::Name,
                    Terminals::SerialNumber,
                    Terminals::IsActive,
                    Terminals::IsOnline,
                    Terminals::LastOnlineAt,
                    Terminals::LastSyncedAt,
                ])
                .values_panic([
                    internal_id.clone().into(),
                    account_id.into(),
                    terminal.upstream_id.into(),
                    terminal.name.clone().into(),
                    terminal.serial_number.clone().into(),
                    flag(true).into(),
                    flag(terminal.is_online).into(),
                    last_online_at.into(),
                    synced_at.clone().into(),
                ])
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&mut *conn).await?;
            Self::provision_default_resources(conn, &internal_id).await?;

            debug!(
                account_id,
                upstream_id = terminal.upstream_id,
                internal_id = %internal_id,
                "New terminal discovered"
            );
            known.insert(terminal.upstream_id, internal_id);
            summary.created += 1;
        }

        // Soft-delete everything the vendor no longer lists.
        let seen: Vec<UpstreamTerminalId> = listing.iter().map(|t| t.upstream_id).collect();
        let query = {
            let mut deactivate = Query::update();
            deactivate
                .table(Terminals::Table)
                .values([(Terminals::IsActive, flag(false).into())])
                .and_where(Expr::col(Terminals::AccountId).eq(account_id))
                .and_where(Expr::col(Terminals::IsActive).eq(flag(true)));
            if !seen.is_empty() {
                deactivate.and_where(Expr::col(Terminals::UpstreamId).is_not_in(seen));
            }
            deactivate.to_string(SqliteQueryBuilder)
        };
        summary.deactivated = sqlx::query(&query).execute(&mut *conn).await?.rows_affected();

        let query = Query::update()
            .table(Accounts::Table)
            .values([
                (Accounts::PaymentStatus, PaymentStatus::Active.as_str().into()),
                (Accounts::PaymentNotifiedAt, Option::<String>::None.into()),
            ])
            .and_where(Expr::col(Accounts::Id).eq(account_id))
            .and_where(Expr::col(Accounts::PaymentStatus).ne(PaymentStatus::Active.as_str()))
            .to_string(SqliteQueryBuilder);
        summary.payment_recovered = sqlx::query(&query).execute(&mut *conn).await?.rows_affected() > 0;

        let query = Query::update()
            .table(Accounts::Table)
            .values([(
                Accounts::CredentialStatus,
                CredentialStatus::Valid.as_str().into(),
            )])
            .and_where(Expr::col(Accounts::Id).eq(account_id))
            .and_where(Expr::col(Accounts::CredentialStatus).ne(CredentialStatus::Valid.as_str()))
            .to_string(SqliteQueryBuilder);
        summary.credentials_recovered =
            sqlx::query(&query).execute(&mut *conn).await?.rows_affected() > 0;

        Ok(summary)
    }

    /// Create-if-absent the default resource catalog for one terminal.
    async fn provision_default_resources(
        conn: &mut SqliteConnection,
        terminal_id: &str,
    ) -> Result<()> {
        let query = {
            let mut insert = Query::insert();
            insert.into_table(InventoryResources::Table).columns([
                InventoryResources::TerminalId,
                InventoryResources::Name,
                InventoryResources::MaxCapacity,
                InventoryResources::CriticalThreshold,
            ]);
            for (name, max_capacity, critical_threshold) in DEFAULT_RESOURCES {
                insert.values_panic([
                    terminal_id.into(),
                    (*name).into(),
                    (*max_capacity).into(),
                    (*critical_threshold).into(),
                ]);
            }
            insert
                .on_conflict(
                    OnConflict::columns([InventoryResources::TerminalId, InventoryResources::Name])
                        .do_nothing()
                        .to_owned(),
                )
                .to_string(SqliteQueryBuilder)
        };

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }
}

#[async_trait]
impl FleetStore for SqliteFleetStore {
    async fn apply_fleet(
        &self,
        account_id: AccountId,
        listing: &[TerminalSnapshot],
        synced_at: DateTime<Utc>,
    ) -> Result<FleetSummary> {
        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        // Dropping `tx` uncommitted (error or cancellation) rolls back.
        let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

        let summary = Self::apply_in_transaction(&mut *tx, account_id, listing, synced_at).await?;

        tx.commit().await?;
        Ok(summary)
    }

    async fn list_terminals(&self, account_id: AccountId) -> Result<Vec<Terminal>> {
        let query = Query::select()
            .columns([
                Terminals::InternalId,
                Terminals::AccountId,
                Terminals::UpstreamId,
                Terminals::Name,
                Terminals::SerialNumber,
                Terminals::IsActive,
                Terminals::IsOnline,
                Terminals::LastOnlineAt,
                Terminals::LastSyncedAt,
            ])
            .from(Terminals::Table)
            .and_where(Expr::col(Terminals::AccountId).eq(account_id))
            .order_by(Terminals::UpstreamId, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut terminals = Vec::with_capacity(rows.len());
        for row in rows {
            let internal_id: String = row.get("internal_id");
            let is_active: i64 = row.get("is_active");
            let is_online: i64 = row.get("is_online");
            let last_synced_at: String = row.get("last_synced_at");

            terminals.push(Terminal {
                internal_id: Uuid::parse_str(&internal_id)?,
                account_id: row.get("account_id"),
                upstream_id: row.get("upstream_id"),
                name: row.get("name"),
                serial_number: row.get("serial_number"),
                is_active: is_active != 0,
                is_online: is_online != 0,
                last_online_at: parse_optional_timestamp(row.get("last_online_at"))?,
                last_synced_at: parse_timestamp(&last_synced_at)?,
            });
        }

        Ok(terminals)
    }

    async fn list_resources(&self, terminal_id: Uuid) -> Result<Vec<InventoryResource>> {
        let query = Query::select()
            .columns([
                InventoryResources::Name,
                InventoryResources::MaxCapacity,
                InventoryResources::CriticalThreshold,
            ])
            .from(InventoryResources::Table)
            .and_where(Expr::col(InventoryResources::TerminalId).eq(terminal_id.to_string()))
            .order_by(InventoryResources::Name, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| InventoryResource {
                terminal_id,
                name: row.get("name"),
                max_capacity: row.get("max_capacity"),
                critical_threshold: row.get("critical_threshold"),
            })
            .collect())
    }
}
