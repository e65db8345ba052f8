//! Vendor API configuration.

use std::time::Duration;

use serde::Deserialize;

/// Vending-platform API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API root, without trailing slash.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Items per transaction page.
    pub page_size: u32,
    /// Items requested when listing terminals. One page is expected to
    /// cover an entire fleet.
    pub terminal_page_size: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vendista.ru:99".to_string(),
            timeout_secs: 30,
            page_size: 1000,
            terminal_page_size: 1000,
        }
    }
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
