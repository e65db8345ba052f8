//! REST client for the vending platform.
//!
//! Responses are JSON envelopes `{"items": [...], "success": bool, "error": str}`.
//! The access token travels as the `token` query parameter, so request URLs
//! are stripped from every error before it is logged or returned.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{UpstreamError, UpstreamTransaction, VendingPlatform};
use crate::config::UpstreamConfig;
use crate::model::{DateWindow, TerminalSnapshot};

/// Response text fragments the vendor uses for a rejected token.
const INVALID_CREDENTIAL_MARKERS: &[&str] = &["invalid token", "token is invalid", "unauthorized"];

/// Response text fragments the vendor uses for a billing hold.
const PAYMENT_REQUIRED_MARKERS: &[&str] = &["payment required"];

/// Longest response body carried inside an error.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
struct Envelope<T> {
    #[serde(default)]
    items: Vec<T>,
    success: Option<bool>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTerminal {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    last_online_time: Option<String>,
    #[serde(default)]
    recent_activity_flag: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransaction {
    id: i64,
    terminal_id: i64,
    amount_minor: i64,
    time: String,
    #[serde(default)]
    result_code: i64,
    #[serde(default)]
    reversal_id: i64,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    item_id: Option<i64>,
}

/// Vending platform over HTTPS.
pub struct HttpVendingPlatform {
    client: Client,
    base_url: String,
    terminal_page_size: u32,
}

impl HttpVendingPlatform {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| UpstreamError::Transient(e.without_url().to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            terminal_page_size: config.terminal_page_size,
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, UpstreamError> {
        let url = format!("{}/{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            let error = classify_status(status, &body);
            warn!(path, status = %status, error = %error, "Vending platform request failed");
            return Err(error);
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;

        if envelope.success == Some(false) {
            let error = classify_rejection(envelope.error.as_deref().unwrap_or_default());
            warn!(path, error = %error, "Vending platform reported failure");
            return Err(error);
        }

        debug!(path, items = envelope.items.len(), "Vending platform response");
        Ok(envelope.items)
    }
}

#[async_trait]
impl VendingPlatform for HttpVendingPlatform {
    async fn list_terminals(
        &self,
        credential: &str,
    ) -> Result<Vec<TerminalSnapshot>, UpstreamError> {
        // The whole fleet is expected in one page.
        let items: Vec<WireTerminal> = self
            .get(
                "terminals",
                &[
                    ("token", credential.to_string()),
                    ("ItemsOnPage", self.terminal_page_size.to_string()),
                ],
            )
            .await?;

        items.into_iter().map(terminal_from_wire).collect()
    }

    async fn list_transactions(
        &self,
        credential: &str,
        window: &DateWindow,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<UpstreamTransaction>, UpstreamError> {
        let items: Vec<WireTransaction> = self
            .get(
                "transactions",
                &[
                    ("token", credential.to_string()),
                    ("DateFrom", format!("{}T00:00:00", window.from.format("%Y-%m-%d"))),
                    ("DateTo", format!("{}T23:59:59", window.to.format("%Y-%m-%d"))),
                    ("PageNumber", page.to_string()),
                    ("ItemsOnPage", page_size.to_string()),
                ],
            )
            .await?;

        items.into_iter().map(transaction_from_wire).collect()
    }
}

fn terminal_from_wire(wire: WireTerminal) -> Result<TerminalSnapshot, UpstreamError> {
    Ok(TerminalSnapshot {
        upstream_id: wire.id,
        name: wire.name.unwrap_or_default(),
        serial_number: wire.serial_number.unwrap_or_default(),
        is_online: wire.recent_activity_flag,
        last_online_at: wire
            .last_online_time
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(parse_vendor_time)
            .transpose()?,
    })
}

fn transaction_from_wire(wire: WireTransaction) -> Result<UpstreamTransaction, UpstreamError> {
    Ok(UpstreamTransaction {
        id: wire.id,
        terminal_id: wire.terminal_id,
        amount_minor: wire.amount_minor,
        occurred_at: parse_vendor_time(&wire.time)?,
        result_code: wire.result_code,
        reversal_id: wire.reversal_id,
        comment: wire.comment.unwrap_or_default(),
        item_id: wire.item_id,
    })
}

/// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC.
fn parse_vendor_time(value: &str) -> Result<DateTime<Utc>, UpstreamError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|_| UpstreamError::Decode(format!("invalid timestamp {:?}", value)))
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

fn contains_marker(text: &str, markers: &[&str]) -> bool {
    let lower = text.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

fn classify_transport(err: reqwest::Error) -> UpstreamError {
    if err.is_decode() {
        return UpstreamError::Decode(err.without_url().to_string());
    }
    // Builder/redirect/body errors are as retryable as a dropped connection.
    UpstreamError::Transient(err.without_url().to_string())
}

fn classify_status(status: StatusCode, body: &str) -> UpstreamError {
    if status == StatusCode::PAYMENT_REQUIRED || contains_marker(body, PAYMENT_REQUIRED_MARKERS) {
        return UpstreamError::PaymentRequired;
    }
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || contains_marker(body, INVALID_CREDENTIAL_MARKERS)
    {
        return UpstreamError::InvalidCredential(format!("HTTP {} - {}", status, truncate(body)));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return UpstreamError::Transient(format!("HTTP {} - {}", status, truncate(body)));
    }
    UpstreamError::Status {
        status: status.as_u16(),
        body: truncate(body),
    }
}

fn classify_rejection(message: &str) -> UpstreamError {
    if contains_marker(message, PAYMENT_REQUIRED_MARKERS) {
        UpstreamError::PaymentRequired
    } else if contains_marker(message, INVALID_CREDENTIAL_MARKERS) {
        UpstreamError::InvalidCredential(truncate(message))
    } else {
        UpstreamError::Rejected(truncate(message))
    }
}
