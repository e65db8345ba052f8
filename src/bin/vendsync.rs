//! vendsync: synchronization daemon
//!
//! Loads configuration, opens storage and runs the three sync tiers on their
//! schedules until interrupted.
//!
//! ## Configuration
//! ```yaml
//! storage:
//!   path: data/vendsync.db
//! upstream:
//!   base_url: https://vendor.example/api
//! credentials:
//!   encryption_key: <64 hex chars or passphrase>
//! scheduler:
//!   realtime_interval_secs: 900
//!   daily_at: "23:30"
//!   weekly_day: sun
//!   weekly_at: "23:30"
//!   utc_offset_hours: 3
//! notify:
//!   telegram_bot_token: <token>
//!   admin_chat_id: "12345"
//! ```

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use vendsync::config::Config;
use vendsync::notify;
use vendsync::scheduler::Scheduler;
use vendsync::storage::init_storage;
use vendsync::sync::{EngineSettings, SyncEngine};
use vendsync::upstream::HttpVendingPlatform;
use vendsync::utils::bootstrap::{init_tracing, with_startup_retry};

const STORAGE_STARTUP_ATTEMPTS: u32 = 10;

#[derive(Debug, Parser)]
#[command(name = "vendsync", version, about = "Vending-platform sync daemon")]
struct Args {
    /// Configuration file (YAML).
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let config = Config::load(args.config.as_deref())?;
    let cipher = config.credential_cipher()?;
    let schedule = config.scheduler.resolve()?;

    info!(path = %config.storage.path, "Opening storage");
    let storage = with_startup_retry("storage", STORAGE_STARTUP_ATTEMPTS, || {
        init_storage(&config.storage)
    })
    .await?;

    let platform = Arc::new(HttpVendingPlatform::new(&config.upstream)?);
    let notifier = notify::from_config(&config.notify);
    let engine = Arc::new(SyncEngine::new(
        storage,
        platform,
        notifier,
        cipher,
        EngineSettings::from_config(&config, schedule.offset),
    ));

    let handles = if config.scheduler.enabled {
        Scheduler::new(engine.clone(), schedule).spawn()
    } else {
        warn!("Scheduler disabled; only manual triggers will run");
        Vec::new()
    };

    info!("vendsync started");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    for handle in handles {
        handle.abort();
    }

    Ok(())
}
