//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod notify;
mod scheduler;
mod storage;
mod upstream;

pub use notify::NotifyConfig;
pub use scheduler::{ResolvedSchedule, SchedulerConfig};
pub use storage::StorageConfig;
pub use upstream::UpstreamConfig;

use serde::Deserialize;

use crate::crypto::{CipherError, CredentialCipher};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "VENDSYNC_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "VENDSYNC";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "VENDSYNC_LOG";
/// Environment variable for the credential encryption key.
pub const ENCRYPTION_KEY_ENV_VAR: &str = "VENDSYNC_ENCRYPTION_KEY";

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error(
        "Credential encryption key is missing: set credentials.encryption_key or {}",
        ENCRYPTION_KEY_ENV_VAR
    )]
    MissingEncryptionKey,

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Credential encryption settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// 64 hex characters (raw AES-256 key) or a passphrase.
    pub encryption_key: Option<String>,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Vendor API configuration.
    pub upstream: UpstreamConfig,
    /// Credential encryption.
    pub credentials: CredentialsConfig,
    /// Tier scheduling.
    pub scheduler: SchedulerConfig,
    /// Admin and owner notifications.
    pub notify: NotifyConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = config.try_deserialize()?;

        // Flat variable for deployments that inject secrets one by one.
        if config.credentials.encryption_key.is_none() {
            config.credentials.encryption_key = std::env::var(ENCRYPTION_KEY_ENV_VAR).ok();
        }

        Ok(config)
    }

    /// Build the credential cipher, refusing to continue without a key.
    pub fn credential_cipher(&self) -> Result<CredentialCipher, ConfigError> {
        let secret = self
            .credentials
            .encryption_key
            .as_deref()
            .ok_or(ConfigError::MissingEncryptionKey)?;

        CredentialCipher::from_secret(secret).map_err(|e| match e {
            CipherError::MissingKey => ConfigError::MissingEncryptionKey,
            other => ConfigError::Invalid {
                field: "credentials.encryption_key",
                reason: other.to_string(),
            },
        })
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.credentials.encryption_key = Some("test-encryption-key".to_string());
        config.storage.path = ":memory:".to_string();
        config
    }
}
