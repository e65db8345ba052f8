//! Domain records shared by storage, the vendor client and the sync engine.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Local account (vending-machine owner) identifier.
pub type AccountId = i64;

/// Terminal identifier assigned by the vending platform.
pub type UpstreamTerminalId = i64;

/// Transaction identifier assigned by the vending platform. Globally unique.
pub type UpstreamTransactionId = i64;

/// Whether the vendor currently accepts the account's credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialStatus {
    #[default]
    Valid,
    InvalidCreds,
}

impl CredentialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialStatus::Valid => "valid",
            CredentialStatus::InvalidCreds => "invalid_creds",
        }
    }

    /// Parse the stored representation. Unknown values read as `Valid`.
    pub fn parse(value: &str) -> Self {
        match value {
            "invalid_creds" => CredentialStatus::InvalidCreds,
            _ => CredentialStatus::Valid,
        }
    }
}

/// Billing state of the account on the vendor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaymentStatus {
    #[default]
    Active,
    PaymentRequired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Active => "active",
            PaymentStatus::PaymentRequired => "payment_required",
        }
    }

    /// Parse the stored representation. Unknown values read as `Active`.
    pub fn parse(value: &str) -> Self {
        match value {
            "payment_required" => PaymentStatus::PaymentRequired,
            _ => PaymentStatus::Active,
        }
    }
}

/// One vending-machine owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    /// Encrypted vendor API token (`<nonce-hex>:<cipher-hex>`).
    pub encrypted_credential: Option<String>,
    pub credential_status: CredentialStatus,
    pub payment_status: PaymentStatus,
    pub payment_notified_at: Option<DateTime<Utc>>,
    /// Transactions before this date are never imported.
    pub setup_date: Option<NaiveDate>,
    /// Notification recipient for the owner (Telegram chat id).
    pub owner_chat_id: Option<String>,
}

impl Account {
    /// Account with a stored credential and default statuses.
    pub fn new(id: AccountId, encrypted_credential: Option<String>) -> Self {
        Self {
            id,
            encrypted_credential,
            credential_status: CredentialStatus::Valid,
            payment_status: PaymentStatus::Active,
            payment_notified_at: None,
            setup_date: None,
            owner_chat_id: None,
        }
    }

    /// The stored encrypted credential, if any. An empty string counts as none.
    pub fn credential(&self) -> Option<&str> {
        self.encrypted_credential
            .as_deref()
            .filter(|c| !c.is_empty())
    }

    pub fn has_credential(&self) -> bool {
        self.credential().is_some()
    }
}

/// A vending machine as stored locally.
#[derive(Debug, Clone, PartialEq)]
pub struct Terminal {
    /// Local primary key. Generated once, never changed.
    pub internal_id: Uuid,
    pub account_id: AccountId,
    pub upstream_id: UpstreamTerminalId,
    pub name: String,
    pub serial_number: String,
    pub is_active: bool,
    pub is_online: bool,
    pub last_online_at: Option<DateTime<Utc>>,
    pub last_synced_at: DateTime<Utc>,
}

/// A terminal as reported by the vending platform.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalSnapshot {
    pub upstream_id: UpstreamTerminalId,
    pub name: String,
    pub serial_number: String,
    pub is_online: bool,
    pub last_online_at: Option<DateTime<Utc>>,
}

/// What one fleet reconciliation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetSummary {
    pub created: u64,
    pub updated: u64,
    pub deactivated: u64,
    /// The account left `payment_required` during this reconciliation.
    pub payment_recovered: bool,
    /// The account left `invalid_creds` during this reconciliation.
    pub credentials_recovered: bool,
}

/// A consumable or container slot attached to a terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryResource {
    pub terminal_id: Uuid,
    pub name: String,
    pub max_capacity: i64,
    pub critical_threshold: i64,
}

/// Default resource: (name, max capacity, critical threshold).
pub type ResourceTemplate = (&'static str, i64, i64);

/// Resources provisioned for every newly discovered terminal.
///
/// Capacities are in grams, millilitres or pieces depending on the resource.
pub const DEFAULT_RESOURCES: &[ResourceTemplate] = &[
    ("coffee", 2000, 300),
    ("milk_powder", 1000, 150),
    ("chocolate", 1000, 150),
    ("sugar", 1500, 200),
    ("water", 19000, 3000),
    ("cups", 100, 15),
    ("lids", 100, 15),
    ("stirrers", 200, 30),
];

/// One sale or refund event.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: UpstreamTransactionId,
    pub account_id: AccountId,
    pub terminal_id: UpstreamTerminalId,
    /// Signed amount in minor currency units; negative for refunds.
    pub amount_minor: i64,
    pub occurred_at: DateTime<Utc>,
    pub result_code: i64,
    /// Id of the reversed transaction; `0` when this is not a reversal.
    pub reversal_id: i64,
    pub comment: String,
    pub item_id: Option<i64>,
}

/// Outcome of one job execution for one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failure,
    SkippedDueToLock,
    SkippedNoToken,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::SkippedDueToLock => "skipped_due_to_lock",
            JobStatus::SkippedNoToken => "skipped_no_token",
        }
    }
}

/// Running totals of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub processed: u64,
    pub added: u64,
    pub updated: u64,
}

impl SyncCounts {
    pub fn absorb(&mut self, other: SyncCounts) {
        self.processed += other.processed;
        self.added += other.added;
        self.updated += other.updated;
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
    /// `None` for global (not account-scoped) entries.
    pub account_id: Option<AccountId>,
    pub job: String,
    pub ran_at: DateTime<Utc>,
    pub status: JobStatus,
    pub counts: SyncCounts,
    pub message: Option<String>,
}

impl JobRun {
    pub fn new(account_id: Option<AccountId>, job: &str, status: JobStatus) -> Self {
        Self {
            account_id,
            job: job.to_string(),
            ran_at: Utc::now(),
            status,
            counts: SyncCounts::default(),
            message: None,
        }
    }

    pub fn with_counts(mut self, counts: SyncCounts) -> Self {
        self.counts = counts;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Inclusive calendar-date window for a transaction import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// Window covering `days_back` days before `today` plus `today` itself.
    pub fn ending_on(today: NaiveDate, days_back: u64) -> Self {
        let from = today
            .checked_sub_days(chrono::Days::new(days_back))
            .unwrap_or(today);
        Self { from, to: today }
    }

    /// Clamp the start to `floor`. Returns `None` when nothing remains.
    pub fn clamp_start(self, floor: Option<NaiveDate>) -> Option<Self> {
        let from = match floor {
            Some(floor) if floor > self.from => floor,
            _ => self.from,
        };
        (from <= self.to).then_some(Self { from, to: self.to })
    }
}

/// How many transaction pages an import requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMode {
    FirstPageOnly,
    AllPages,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_status_round_trip_strings() {
        assert_eq!(CredentialStatus::parse("invalid_creds"), CredentialStatus::InvalidCreds);
        assert_eq!(CredentialStatus::parse("valid"), CredentialStatus::Valid);
        assert_eq!(PaymentStatus::parse("payment_required"), PaymentStatus::PaymentRequired);
        assert_eq!(PaymentStatus::parse("garbage"), PaymentStatus::Active);
        assert_eq!(JobStatus::SkippedDueToLock.as_str(), "skipped_due_to_lock");
    }

    #[test]
    fn test_window_ending_on() {
        let window = DateWindow::ending_on(date(2024, 3, 1), 1);
        assert_eq!(window.from, date(2024, 2, 29));
        assert_eq!(window.to, date(2024, 3, 1));
    }

    #[test]
    fn test_window_clamp_start() {
        let window = DateWindow::new(date(2024, 1, 1), date(2024, 1, 7));

        assert_eq!(window.clamp_start(None), Some(window));
        assert_eq!(window.clamp_start(Some(date(2023, 12, 1))), Some(window));
        assert_eq!(
            window.clamp_start(Some(date(2024, 1, 5))),
            Some(DateWindow::new(date(2024, 1, 5), date(2024, 1, 7)))
        );
        assert_eq!(window.clamp_start(Some(date(2024, 2, 1))), None);
    }

    #[test]
    fn test_account_has_credential() {
        assert!(Account::new(1, Some("aa:bb".into())).has_credential());
        assert!(!Account::new(1, Some(String::new())).has_credential());
        assert!(!Account::new(1, None).has_credential());

        assert_eq!(Account::new(1, Some("aa:bb".into())).credential(), Some("aa:bb"));
        assert_eq!(Account::new(1, Some(String::new())).credential(), None);
    }
}
