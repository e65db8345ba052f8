//! SQLite implementations of storage interfaces.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::StorageConfig;
use crate::storage::schema::ALL_TABLES;
use crate::storage::Result;

mod account_store;
mod fleet_store;
mod job_run_store;
mod transaction_store;

pub use account_store::SqliteAccountStore;
pub use fleet_store::SqliteFleetStore;
pub use job_run_store::SqliteJobRunStore;
pub use transaction_store::SqliteTransactionStore;

/// Open a connection pool for `config`.
///
/// An in-memory database lives only as long as its connection, so `:memory:`
/// gets a single connection that is never recycled.
pub async fn connect(config: &StorageConfig) -> Result<SqlitePool> {
    let options = if config.is_memory() {
        SqliteConnectOptions::from_str("sqlite::memory:")?
    } else {
        if let Some(parent) = std::path::Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .busy_timeout(config.timeout())
    };

    let pool_options = SqlitePoolOptions::new().acquire_timeout(config.timeout());
    let pool_options = if config.is_memory() {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(config.max_connections.max(1))
    };

    Ok(pool_options.connect_with(options).await?)
}

/// Create every table and index if missing.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    for statement in ALL_TABLES {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
