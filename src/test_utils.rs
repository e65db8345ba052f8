//! Test utilities and mock implementations.
//!
//! Mock implementations of the vending platform and notifier traits, plus
//! small fixture builders, for testing without network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use tokio::sync::RwLock;

use crate::crypto::CredentialCipher;
use crate::model::{DateWindow, TerminalSnapshot};
use crate::notify::{AdminAlert, Notifier};
use crate::upstream::{UpstreamError, UpstreamTransaction, VendingPlatform};

/// Scripted vending platform.
///
/// Transaction pages are served by page number (1-based); pages past the
/// script come back empty. Errors, once set, are returned on every matching
/// call until cleared.
#[derive(Default)]
pub struct MockVendingPlatform {
    terminals: RwLock<Vec<TerminalSnapshot>>,
    terminal_error: RwLock<Option<UpstreamError>>,
    transaction_pages: RwLock<Vec<Vec<UpstreamTransaction>>>,
    transaction_errors: RwLock<HashMap<u32, UpstreamError>>,
    delay: RwLock<Option<Duration>>,
    requested: RwLock<Vec<(DateWindow, u32)>>,
    terminal_calls: AtomicUsize,
    transaction_calls: AtomicUsize,
}

impl MockVendingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_terminals(&self, terminals: Vec<TerminalSnapshot>) {
        *self.terminals.write().await = terminals;
    }

    pub async fn set_terminal_error(&self, error: Option<UpstreamError>) {
        *self.terminal_error.write().await = error;
    }

    pub async fn set_transaction_pages(&self, pages: Vec<Vec<UpstreamTransaction>>) {
        *self.transaction_pages.write().await = pages;
    }

    pub async fn fail_transaction_page(&self, page: u32, error: UpstreamError) {
        self.transaction_errors.write().await.insert(page, error);
    }

    /// Stall every call, to hold a run in flight.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.write().await = delay;
    }

    pub fn terminal_calls(&self) -> usize {
        self.terminal_calls.load(Ordering::SeqCst)
    }

    pub fn transaction_calls(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.terminal_calls() + self.transaction_calls()
    }

    /// Window and page of every transaction request, in order.
    pub async fn requested(&self) -> Vec<(DateWindow, u32)> {
        self.requested.read().await.clone()
    }

    async fn stall(&self) {
        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl VendingPlatform for MockVendingPlatform {
    async fn list_terminals(
        &self,
        _credential: &str,
    ) -> Result<Vec<TerminalSnapshot>, UpstreamError> {
        self.terminal_calls.fetch_add(1, Ordering::SeqCst);
        self.stall().await;

        if let Some(error) = self.terminal_error.read().await.clone() {
            return Err(error);
        }
        Ok(self.terminals.read().await.clone())
    }

    async fn list_transactions(
        &self,
        _credential: &str,
        window: &DateWindow,
        page: u32,
        _page_size: u32,
    ) -> Result<Vec<UpstreamTransaction>, UpstreamError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        self.requested.write().await.push((*window, page));
        self.stall().await;

        if let Some(error) = self.transaction_errors.read().await.get(&page).cloned() {
            return Err(error);
        }
        let index = page.saturating_sub(1) as usize;
        Ok(self
            .transaction_pages
            .read()
            .await
            .get(index)
            .cloned()
            .unwrap_or_default())
    }
}

/// Notifier that records every call.
#[derive(Default)]
pub struct RecordingNotifier {
    admin_alerts: RwLock<Vec<AdminAlert>>,
    user_messages: RwLock<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn admin_alerts(&self) -> Vec<AdminAlert> {
        self.admin_alerts.read().await.clone()
    }

    /// `(recipient, message)` pairs.
    pub async fn user_messages(&self) -> Vec<(String, String)> {
        self.user_messages.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_admin(&self, alert: AdminAlert) {
        self.admin_alerts.write().await.push(alert);
    }

    async fn notify_user(&self, recipient: &str, message: &str) {
        self.user_messages
            .write()
            .await
            .push((recipient.to_string(), message.to_string()));
    }
}

/// Calendar date shorthand. Panics on an invalid date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

/// Online terminal named after its id.
pub fn terminal_snapshot(upstream_id: i64) -> TerminalSnapshot {
    TerminalSnapshot {
        upstream_id,
        name: format!("Terminal {}", upstream_id),
        serial_number: format!("SN-{:05}", upstream_id),
        is_online: true,
        last_online_at: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).single(),
    }
}

/// Sale of 150.00 on terminal 10.
pub fn upstream_transaction(id: i64, item_id: Option<i64>) -> UpstreamTransaction {
    UpstreamTransaction {
        id,
        terminal_id: 10,
        amount_minor: 15000,
        occurred_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
            .single()
            .unwrap_or_default(),
        result_code: 0,
        reversal_id: 0,
        comment: String::new(),
        item_id,
    }
}

/// Cipher with a fixed test key.
pub fn test_cipher() -> CredentialCipher {
    CredentialCipher::from_key([7u8; 32])
}
