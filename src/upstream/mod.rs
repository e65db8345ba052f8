//! Vending-platform API client.
//!
//! Two read operations: list the account's terminals and list transactions in
//! a date window, page by page. Every failure is classified here, once, into
//! [`UpstreamError`]; callers never inspect raw status codes or response text.

mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    AccountId, DateWindow, TerminalSnapshot, Transaction, UpstreamTerminalId,
    UpstreamTransactionId,
};

pub use http::HttpVendingPlatform;

/// Errors from the vending platform, already classified.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// The vendor put the account on a billing hold.
    #[error("Payment required by vending platform")]
    PaymentRequired,

    /// The vendor rejected the access token.
    #[error("Vending platform rejected the credential: {0}")]
    InvalidCredential(String),

    /// Timeout, connection failure, rate limiting or a 5xx response.
    #[error("Vending platform unavailable: {0}")]
    Transient(String),

    /// Any other non-success response.
    #[error("Vending platform returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A successful HTTP response whose envelope reports failure.
    #[error("Vending platform rejected the request: {0}")]
    Rejected(String),

    /// The response could not be understood.
    #[error("Malformed vending platform response: {0}")]
    Decode(String),
}

/// A transaction as reported by the vendor, before it is attached to an account.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamTransaction {
    pub id: UpstreamTransactionId,
    pub terminal_id: UpstreamTerminalId,
    pub amount_minor: i64,
    pub occurred_at: DateTime<Utc>,
    pub result_code: i64,
    pub reversal_id: i64,
    pub comment: String,
    pub item_id: Option<i64>,
}

impl UpstreamTransaction {
    pub fn into_transaction(self, account_id: AccountId) -> Transaction {
        Transaction {
            id: self.id,
            account_id,
            terminal_id: self.terminal_id,
            amount_minor: self.amount_minor,
            occurred_at: self.occurred_at,
            result_code: self.result_code,
            reversal_id: self.reversal_id,
            comment: self.comment,
            item_id: self.item_id,
        }
    }
}

/// Read access to the vending platform for one credential at a time.
///
/// # Implementations
///
/// - `HttpVendingPlatform`: the vendor's REST API
/// - `MockVendingPlatform` (test_utils): scripted responses
#[async_trait]
pub trait VendingPlatform: Send + Sync {
    /// The account's whole fleet in one call.
    async fn list_terminals(
        &self,
        credential: &str,
    ) -> Result<Vec<TerminalSnapshot>, UpstreamError>;

    /// One page (1-based) of transactions within `window`, inclusive.
    async fn list_transactions(
        &self,
        credential: &str,
        window: &DateWindow,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<UpstreamTransaction>, UpstreamError>;
}
