//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Accounts table schema.
#[derive(Iden)]
pub enum Accounts {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "encrypted_credential"]
    EncryptedCredential,
    #[iden = "credential_status"]
    CredentialStatus,
    #[iden = "payment_status"]
    PaymentStatus,
    #[iden = "payment_notified_at"]
    PaymentNotifiedAt,
    #[iden = "setup_date"]
    SetupDate,
    #[iden = "owner_chat_id"]
    OwnerChatId,
}

/// Terminals table schema.
#[derive(Iden)]
pub enum Terminals {
    Table,
    #[iden = "internal_id"]
    InternalId,
    #[iden = "account_id"]
    AccountId,
    #[iden = "upstream_id"]
    UpstreamId,
    #[iden = "name"]
    Name,
    #[iden = "serial_number"]
    SerialNumber,
    #[iden = "is_active"]
    IsActive,
    #[iden = "is_online"]
    IsOnline,
    #[iden = "last_online_at"]
    LastOnlineAt,
    #[iden = "last_synced_at"]
    LastSyncedAt,
}

/// Inventory resources table schema.
#[derive(Iden)]
pub enum InventoryResources {
    Table,
    #[iden = "terminal_id"]
    TerminalId,
    #[iden = "name"]
    Name,
    #[iden = "max_capacity"]
    MaxCapacity,
    #[iden = "critical_threshold"]
    CriticalThreshold,
}

/// Transactions table schema.
#[derive(Iden)]
pub enum Transactions {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "account_id"]
    AccountId,
    #[iden = "terminal_id"]
    TerminalId,
    #[iden = "amount_minor"]
    AmountMinor,
    #[iden = "occurred_at"]
    OccurredAt,
    #[iden = "result_code"]
    ResultCode,
    #[iden = "reversal_id"]
    ReversalId,
    #[iden = "comment"]
    Comment,
    #[iden = "item_id"]
    ItemId,
    #[iden = "updated_at"]
    UpdatedAt,
}

/// Job runs table schema.
#[derive(Iden)]
pub enum JobRuns {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "account_id"]
    AccountId,
    #[iden = "job"]
    Job,
    #[iden = "ran_at"]
    RanAt,
    #[iden = "status"]
    Status,
    #[iden = "processed"]
    Processed,
    #[iden = "added"]
    Added,
    #[iden = "updated"]
    Updated,
    #[iden = "message"]
    Message,
}

/// SQL for creating the accounts table.
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    encrypted_credential TEXT,
    credential_status TEXT NOT NULL DEFAULT 'valid',
    payment_status TEXT NOT NULL DEFAULT 'active',
    payment_notified_at TEXT,
    setup_date TEXT,
    owner_chat_id TEXT
);
"#;

/// SQL for creating the terminals table.
pub const CREATE_TERMINALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS terminals (
    internal_id TEXT PRIMARY KEY,
    account_id INTEGER NOT NULL,
    upstream_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    serial_number TEXT NOT NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    is_online INTEGER NOT NULL DEFAULT 0,
    last_online_at TEXT,
    last_synced_at TEXT NOT NULL,
    UNIQUE (account_id, upstream_id)
);
"#;

/// SQL for creating the inventory resources table.
pub const CREATE_INVENTORY_RESOURCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inventory_resources (
    terminal_id TEXT NOT NULL,
    name TEXT NOT NULL,
    max_capacity INTEGER NOT NULL,
    critical_threshold INTEGER NOT NULL,
    PRIMARY KEY (terminal_id, name)
);
"#;

/// SQL for creating the transactions table.
pub const CREATE_TRANSACTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL,
    terminal_id INTEGER NOT NULL,
    amount_minor INTEGER NOT NULL,
    occurred_at TEXT NOT NULL,
    result_code INTEGER NOT NULL,
    reversal_id INTEGER NOT NULL DEFAULT 0,
    comment TEXT NOT NULL DEFAULT '',
    item_id INTEGER,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_account_time ON transactions(account_id, occurred_at);
"#;

/// SQL for creating the job runs table.
pub const CREATE_JOB_RUNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS job_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER,
    job TEXT NOT NULL,
    ran_at TEXT NOT NULL,
    status TEXT NOT NULL,
    processed INTEGER NOT NULL DEFAULT 0,
    added INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    message TEXT
);
"#;

/// Every table, in creation order.
pub const ALL_TABLES: &[&str] = &[
    CREATE_ACCOUNTS_TABLE,
    CREATE_TERMINALS_TABLE,
    CREATE_INVENTORY_RESOURCES_TABLE,
    CREATE_TRANSACTIONS_TABLE,
    CREATE_JOB_RUNS_TABLE,
];
