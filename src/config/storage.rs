//! Storage configuration types.

use std::time::Duration;

use serde::Deserialize;

/// SQLite storage configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path, or `:memory:` for an in-process database.
    pub path: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Upper bound for any single storage step, in seconds.
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/vendsync.db".to_string(),
            max_connections: 4,
            timeout_secs: 20,
        }
    }
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_memory(&self) -> bool {
        self.path == ":memory:"
    }
}
