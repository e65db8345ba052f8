//! vendsync-admin: operational commands
//!
//! One-shot entry points into the sync engine, sharing the daemon's
//! configuration and storage. Manual runs take the same per-account guard as
//! the tiers, but only within this process.

use std::process;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

use vendsync::config::Config;
use vendsync::model::{AccountId, DateWindow};
use vendsync::notify;
use vendsync::storage::{init_storage, Storage};
use vendsync::sync::{EngineSettings, SyncEngine, Tier};
use vendsync::upstream::HttpVendingPlatform;
use vendsync::utils::bootstrap::init_tracing;

#[derive(Parser, Debug)]
#[clap(author, version, about = "vendsync operational commands", long_about = None)]
struct Opts {
    /// Configuration file (YAML)
    #[arg(long, short = 'c', global = true)]
    config: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Import transactions for one account over a date range
    Import {
        #[arg(long)]
        account: AccountId,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        from: NaiveDate,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        to: NaiveDate,
    },
    /// Reconcile terminals for one account with a plaintext API token
    Reconcile {
        #[arg(long)]
        account: AccountId,
        #[arg(long, env = "VENDSYNC_ADMIN_TOKEN")]
        token: String,
    },
    /// Encrypt an API token; stores it when an account is given
    EncryptToken {
        #[arg(long, env = "VENDSYNC_ADMIN_TOKEN")]
        token: String,
        #[arg(long)]
        account: Option<AccountId>,
    },
    /// Run one tier sweep now (realtime, end-of-day, weekly)
    RunTier { tier: Tier },
}

#[tokio::main]
async fn main() {
    init_tracing();
    let opts = Opts::parse();

    if let Err(e) = run(opts).await {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

async fn run(opts: Opts) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(opts.config.as_deref())?;
    let cipher = config.credential_cipher()?;

    match opts.command {
        Command::EncryptToken { token, account } => {
            let encrypted = cipher.encrypt(token.trim())?;
            match account {
                Some(id) => {
                    let storage = init_storage(&config.storage).await?;
                    storage.accounts.set_credential(id, &encrypted).await?;
                    info!(account_id = id, "Credential stored");
                }
                None => println!("{}", encrypted),
            }
        }
        Command::Import { account, from, to } => {
            if from > to {
                return Err(format!("--from {} is after --to {}", from, to).into());
            }
            let engine = build_engine(&config, init_storage(&config.storage).await?)?;
            let counts = engine
                .import_account(account, DateWindow::new(from, to))
                .await?;
            println!(
                "processed={} added={} updated={}",
                counts.processed, counts.added, counts.updated
            );
        }
        Command::Reconcile { account, token } => {
            let engine = build_engine(&config, init_storage(&config.storage).await?)?;
            let summary = engine.reconcile_account(account, token.trim()).await?;
            println!(
                "created={} updated={} deactivated={}",
                summary.created, summary.updated, summary.deactivated
            );
        }
        Command::RunTier { tier } => {
            let engine = build_engine(&config, init_storage(&config.storage).await?)?;
            let report = engine.run_tier(tier).await;
            println!(
                "tier={} succeeded={} failed={} locked={} no_token={}",
                tier,
                report.succeeded,
                report.failed,
                report.skipped_due_to_lock,
                report.skipped_no_token
            );
            if report.listing_failed {
                return Err("account listing failed".into());
            }
        }
    }

    Ok(())
}

fn build_engine(
    config: &Config,
    storage: Storage,
) -> Result<SyncEngine, Box<dyn std::error::Error>> {
    let schedule = config.scheduler.resolve()?;
    Ok(SyncEngine::new(
        storage,
        Arc::new(HttpVendingPlatform::new(&config.upstream)?),
        notify::from_config(&config.notify),
        config.credential_cipher()?,
        EngineSettings::from_config(config, schedule.offset),
    ))
}
