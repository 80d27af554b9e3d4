//! CLI for the HDM hoster download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hdm_core::config::HdmConfig;
use hdm_core::store::StateDb;

use commands::{run_add, run_engine, run_hosters, run_seed, run_status};

/// Top-level CLI for the HDM download manager.
#[derive(Debug, Parser)]
#[command(name = "hdm")]
#[command(about = "HDM: quota-aware download scheduler for hoster services", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the scheduling engine until interrupted (Ctrl-C).
    Run {
        /// Override the orchestration interval in seconds.
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },

    /// Add a pending download request for a hoster.
    Add {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Hoster the download belongs to.
        #[arg(long)]
        hoster: String,
        /// Scheduling priority (higher runs first).
        #[arg(long, default_value = "0")]
        priority: i64,
        /// Dedup fingerprint; defaults to the URL itself.
        #[arg(long)]
        fingerprint: Option<String>,
    },

    /// Show downloads grouped by lifecycle status.
    Status,

    /// List hosters with concurrency ceilings and remaining quota.
    Hosters,

    /// Insert sample hosters, limits, and pending downloads.
    Seed,
}

impl CliCommand {
    /// Parse arguments and execute the selected command.
    pub async fn run_from_args(cfg: HdmConfig) -> Result<()> {
        let cli = Cli::parse();
        let db = StateDb::open_default().await?;

        match cli.command {
            CliCommand::Run { interval } => {
                let mut cfg = cfg;
                if let Some(secs) = interval {
                    cfg.orchestrate_interval_secs = secs;
                }
                run_engine(db, cfg).await
            }
            CliCommand::Add {
                url,
                hoster,
                priority,
                fingerprint,
            } => run_add(db, &url, &hoster, priority, fingerprint.as_deref()).await,
            CliCommand::Status => run_status(db).await,
            CliCommand::Hosters => run_hosters(db).await,
            CliCommand::Seed => run_seed(db).await,
        }
    }
}
