//! SQLite AccountStore implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::model::{Account, AccountId, CredentialStatus, PaymentStatus};
use crate::storage::helpers::{parse_optional_date, parse_optional_timestamp};
use crate::storage::schema::Accounts;
use crate::storage::{AccountStore, Result};

/// SQLite implementation of AccountStore.
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    /// Create a new SQLite account store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn select_columns() -> sea_query::SelectStatement {
        Query::select()
            .columns([
                Accounts::Id,
                Accounts::EncryptedCredential,
                Accounts::CredentialStatus,
                Accounts::PaymentStatus,
                Accounts::PaymentNotifiedAt,
                Accounts::SetupDate,
                Accounts::OwnerChatId,
            ])
            .from(Accounts::Table)
            .to_owned()
    }
}

fn account_from_row(row: &SqliteRow) -> Result<Account> {
    let credential_status: String = row.get("credential_status");
    let payment_status: String = row.get("payment_status");

    Ok(Account {
        id: row.get("id"),
        encrypted_credential: row.get("encrypted_credential"),
        credential_status: CredentialStatus::parse(&credential_status),
        payment_status: PaymentStatus::parse(&payment_status),
        payment_notified_at: parse_optional_timestamp(row.get("payment_notified_at"))?,
        setup_date: parse_optional_date(row.get("setup_date"))?,
        owner_chat_id: row.get("owner_chat_id"),
    })
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn save(&self, account: &Account) -> Result<()> {
        let query = Query::insert()
            .into_table(Accounts::Table)
            .columns([
                Accounts::Id,
                Accounts::EncryptedCredential,
                Accounts::CredentialStatus,
                Accounts::PaymentStatus,
                Accounts::PaymentNotifiedAt,
                Accounts::SetupDate,
                Accounts::OwnerChatId,
            ])
            .values_panic([
                account.id.into(),
                account.encrypted_credential.clone().into(),
                account.credential_status.as_str().into(),
                account.payment_status.as_str().into(),
                account.payment_notified_at.map(|t| t.to_rfc3339()).into(),
                account
                    .setup_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .into(),
                account.owner_chat_id.clone().into(),
            ])
            .on_conflict(
                OnConflict::column(Accounts::Id)
                    .update_columns([
                        Accounts::EncryptedCredential,
                        Accounts::CredentialStatus,
                        Accounts::PaymentStatus,
                        Accounts::PaymentNotifiedAt,
                        Accounts::SetupDate,
                        Accounts::OwnerChatId,
                    ])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }

    async fn get(&self, id: AccountId) -> Result<Option<Account>> {
        let query = Self::select_columns()
            .and_where(Expr::col(Accounts::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_with_credentials(&self) -> Result<Vec<Account>> {
        let query = Self::select_columns()
            .and_where(Expr::col(Accounts::EncryptedCredential).is_not_null())
            .and_where(Expr::col(Accounts::EncryptedCredential).ne(""))
            .order_by(Accounts::Id, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn set_credential(&self, id: AccountId, encrypted: &str) -> Result<()> {
        let query = Query::update()
            .table(Accounts::Table)
            .values([
                (Accounts::EncryptedCredential, encrypted.into()),
                (
                    Accounts::CredentialStatus,
                    CredentialStatus::Valid.as_str().into(),
                ),
            ])
            .and_where(Expr::col(Accounts::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(crate::storage::StorageError::AccountNotFound(id));
        }
        Ok(())
    }

    async fn mark_payment_required(&self, id: AccountId, at: DateTime<Utc>) -> Result<bool> {
        let query = Query::update()
            .table(Accounts::Table)
            .values([
                (
                    Accounts::PaymentStatus,
                    PaymentStatus::PaymentRequired.as_str().into(),
                ),
                (Accounts::PaymentNotifiedAt, at.to_rfc3339().into()),
            ])
            .and_where(Expr::col(Accounts::Id).eq(id))
            .and_where(Expr::col(Accounts::PaymentStatus).ne(PaymentStatus::PaymentRequired.as_str()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_credentials_invalid(&self, id: AccountId) -> Result<bool> {
        let query = Query::update()
            .table(Accounts::Table)
            .values([(
                Accounts::CredentialStatus,
                CredentialStatus::InvalidCreds.as_str().into(),
            )])
            .and_where(Expr::col(Accounts::Id).eq(id))
            .and_where(
                Expr::col(Accounts::CredentialStatus).ne(CredentialStatus::InvalidCreds.as_str()),
            )
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_credentials_valid(&self, id: AccountId) -> Result<bool> {
        let query = Query::update()
            .table(Accounts::Table)
            .values([(
                Accounts::CredentialStatus,
                CredentialStatus::Valid.as_str().into(),
            )])
            .and_where(Expr::col(Accounts::Id).eq(id))
            .and_where(Expr::col(Accounts::CredentialStatus).ne(CredentialStatus::Valid.as_str()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }
}
