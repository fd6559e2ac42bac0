//! CLI Commands - the binary's surface over the sentinel
//!
//! - `hunt`: run until Ctrl-C, then stop and print final status
//! - `hunts`: recent hunt records from the on-disk journal
//! - `trap`: pretty-print one trap record

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::constants::{APP_NAME, APP_VERSION};
use crate::logic::config::SentinelConfig;
use crate::logic::hunt_loop::HealthStatus;
use crate::logic::response::TrapStore;
use crate::logic::sentinel::Sentinel;
use crate::logic::telemetry::{read_recent, HUNT_LOG_FILE};

/// How often `hunt` checks status while waiting for Ctrl-C
const STATUS_TICK: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "wolf-sentinel", version, about = "Hunts processes whose window title keeps changing")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sentinel until Ctrl-C
    Hunt(HuntArgs),
    /// Show the most recent hunt records, newest first
    Hunts(HuntsArgs),
    /// Pretty-print a trap record
    Trap {
        /// Path to a trap_pid*.json file
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct HuntArgs {
    /// JSON config file
    #[arg(long, env = "WOLF_CONFIG")]
    config: Option<PathBuf>,

    /// Scan interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Distinct titles allowed before a process is suspicious
    #[arg(long)]
    threshold: Option<usize>,

    /// Trap and trace, never signal
    #[arg(long)]
    observe_only: bool,
}

impl HuntArgs {
    fn apply(&self, config: &mut SentinelConfig) {
        if let Some(ms) = self.interval_ms {
            config.scan_interval_ms = ms;
        }
        if let Some(threshold) = self.threshold {
            config.mutation_threshold = threshold;
        }
        if self.observe_only {
            config.eliminate = false;
        }
    }
}

#[derive(Args, Debug)]
struct HuntsArgs {
    /// JSON config file (for the log directory)
    #[arg(long, env = "WOLF_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 20)]
    limit: usize,
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Hunt(args) => hunt(args).await,
        Commands::Hunts(args) => hunts(args),
        Commands::Trap { file } => show_trap(&file),
    }
}

// ============================================================================
// HUNT
// ============================================================================

async fn hunt(args: HuntArgs) -> Result<()> {
    let mut config = SentinelConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    log::info!("{} v{} starting", APP_NAME, APP_VERSION);
    log::info!("   Traps: {:?}", config.trap_dir);
    log::info!("   Logs: {:?}", config.log_dir);

    let sentinel = Arc::new(Sentinel::with_system(config));
    sentinel.start()?;

    let mut ticker = tokio::time::interval(STATUS_TICK);
    ticker.tick().await;
    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("failed to listen for Ctrl-C")?;
                log::info!("Ctrl-C received, stopping sentinel...");
                break;
            }
            _ = ticker.tick() => {
                let status = sentinel.status();
                if status.suspicious_count > 0 {
                    log::warn!(
                        "{} suspicious process(es) pending: {:?}",
                        status.suspicious_count,
                        status.suspicious_pids
                    );
                }
                if status.health == HealthStatus::Degraded {
                    log::warn!(
                        "Sentinel degraded: {} consecutive failed cycles ({})",
                        status.consecutive_failures,
                        status.last_error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
    }

    let stopper = sentinel.clone();
    let stopped = tokio::task::spawn_blocking(move || stopper.stop()).await?;
    if !stopped {
        log::warn!("Hunt worker still running at exit");
    }

    println!("{}", serde_json::to_string_pretty(&sentinel.status())?);
    Ok(())
}

// ============================================================================
// HUNTS / TRAP
// ============================================================================

fn hunts(args: HuntsArgs) -> Result<()> {
    let config = SentinelConfig::load(args.config.as_deref())?;
    let path = config.log_dir.join(HUNT_LOG_FILE);
    let records = read_recent(&path, args.limit)
        .with_context(|| format!("failed to read hunt log {:?}", path))?;

    if records.is_empty() {
        println!("No hunts recorded in {:?}", path);
        return Ok(());
    }

    for record in records {
        let children = record
            .elimination
            .as_ref()
            .map(|e| e.children.len())
            .unwrap_or(0);
        println!(
            "{}  PID {:<7} {:<20} {:<15} titles={} children={}{}",
            record.resolved_at.format("%Y-%m-%d %H:%M:%S"),
            record.pid,
            record.name,
            record.resolution.as_str(),
            record.title_history.len(),
            children,
            record
                .trap_path
                .as_ref()
                .map(|p| format!(" trap={}", p.display()))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn show_trap(file: &std::path::Path) -> Result<()> {
    let record = TrapStore::load(file).with_context(|| format!("failed to load trap {:?}", file))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
