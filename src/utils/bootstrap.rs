//! Bootstrap utilities for vendsync binaries.
//!
//! Shared initialization code for the daemon and the admin CLI.

use std::future::Future;
use std::time::Duration;

use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the VENDSYNC_LOG environment variable.
///
/// Defaults to "info" level if VENDSYNC_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run a startup step with exponential backoff, giving up after `max_attempts`.
///
/// # Arguments
/// * `what` - Human-readable name for logging (e.g., "storage")
/// * `max_attempts` - Total attempts, including the first
/// * `step` - Async function that attempts the step
///
/// # Returns
/// The step's output on success, or the last error after max attempts.
pub async fn with_startup_retry<T, E, F, Fut>(what: &str, max_attempts: u32, step: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    const INITIAL_DELAY: Duration = Duration::from_millis(100);
    const MAX_DELAY: Duration = Duration::from_secs(5);

    let max_attempts = max_attempts.max(1);
    let mut delay = INITIAL_DELAY;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match step().await {
            Ok(value) => {
                tracing::info!("{} ready", what);
                return Ok(value);
            }
            Err(e) if attempt < max_attempts => {
                warn!(
                    "Failed to initialize {} (attempt {}/{}): {}. Retrying in {:?}...",
                    what, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, MAX_DELAY);
            }
            Err(e) => {
                tracing::error!(
                    "Failed to initialize {} after {} attempts: {}",
                    what,
                    max_attempts,
                    e
                );
                return Err(e);
            }
        }
    }
}
