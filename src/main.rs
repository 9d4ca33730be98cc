//! Binary entrypoint for the mushcore CLI.
//!
//! Commands:
//! - `init` - create a starter `config.toml` and the container table in `data/containers.cfg`
//! - `inspect [--json]` - load the stored world and summarize what the load found
//! - `verify [--fix]` - recompute container totals and report drift
//! - `advance --minutes <n>` - move the world clock forward, run due timers, and save
//!
//! See the library crate docs for module-level details: `mushcore::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

use mushcore::config::Config;
use mushcore::storage::{LoadReport, WorldStore};
use mushcore::World;

const DEFAULT_CONTAINER_TABLE: &str = include_str!("../data/containers.cfg");

#[derive(Parser)]
#[command(name = "mushcore")]
#[command(about = "Container engine and versioned world store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and container table
    Init,
    /// Load the world store and print a summary
    Inspect {
        /// Print the load report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute totals from scratch and compare with the stored aggregates
    Verify {
        /// Save the recomputed totals back to the store
        #[arg(long)]
        fix: bool,
    },
    /// Advance the world clock, firing corpse decay timers, then save
    Advance {
        #[arg(short, long)]
        minutes: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing new mushcore configuration");
            if Path::new(&cli.config).exists() {
                warn!("{} already exists; leaving it untouched", cli.config);
            } else {
                Config::create_default(&cli.config).await?;
                info!("Configuration file created at {}", cli.config);
            }

            let cfg = Config::load(&cli.config).await?;
            let table = Path::new(&cfg.containers.table);
            if table.exists() {
                info!("Container table {} already present", table.display());
            } else {
                if let Some(dir) = table.parent() {
                    tokio::fs::create_dir_all(dir).await?;
                }
                tokio::fs::write(table, DEFAULT_CONTAINER_TABLE).await?;
                info!("Container table written to {}", table.display());
            }

            let store = WorldStore::open(cfg.storage.world_db_path())?;
            info!(
                "World store ready at {} ({} items, {} mobiles)",
                cfg.storage.world_db_path().display(),
                store.item_record_count(),
                store.mobile_record_count()
            );
        }
        Commands::Inspect { json } => {
            let config = require_config(pre_config, &cli.config).await?;
            let (world, report, _store) = load(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&world, &report);
            }
        }
        Commands::Verify { fix } => {
            let config = require_config(pre_config, &cli.config).await?;
            let (world, report, store) = load(&config)?;
            let drift = &report.totals_drift;
            if drift.is_empty() {
                println!("Stored totals consistent across {} items", world.item_count());
            } else {
                for entry in drift {
                    println!(
                        "{}: stored {:?}, recomputed {:?}",
                        entry.serial, entry.stored, entry.fresh
                    );
                }
                if fix {
                    store.save_world(&world)?;
                    println!("Saved {} recomputed aggregates", drift.len());
                } else {
                    return Err(anyhow!("{} stored aggregates drifted", drift.len()));
                }
            }
        }
        Commands::Advance { minutes } => {
            let config = require_config(pre_config, &cli.config).await?;
            let (mut world, _report, store) = load(&config)?;
            let fired = world.advance(chrono::Duration::minutes(minutes))?;
            let summary = store.save_world(&world)?;
            println!(
                "Advanced {} minutes: {} timers fired, {} items remain (generation {})",
                minutes, fired, summary.items, summary.generation
            );
        }
    }

    Ok(())
}

async fn require_config(pre_config: Option<Config>, path: &str) -> Result<Config> {
    match pre_config {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

fn load(config: &Config) -> Result<(World, LoadReport, WorldStore)> {
    let registry = Arc::new(config.containers.load_registry()?);
    let store = WorldStore::open(config.storage.world_db_path())?;
    let (world, report) = store.load_world(config.world.clone(), registry, chrono::Utc::now())?;
    Ok((world, report, store))
}

fn print_report(world: &World, report: &LoadReport) {
    println!("mushcore v{}", env!("CARGO_PKG_VERSION"));
    if let Some(saved_at) = report.saved_at {
        println!("Saved at: {}", saved_at.to_rfc3339());
    }
    println!("Records:");
    for (kind, count) in &report.counts {
        println!("  {:<24} {}", kind, count);
    }
    println!("Items in world: {}", world.item_count());
    println!("Mobiles in world: {}", world.mobile_count());
    if !report.upgrades.is_empty() {
        println!("Upgraded layers:");
        for upgrade in &report.upgrades {
            println!(
                "  {} {} v{} -> v{}",
                upgrade.serial, upgrade.layer, upgrade.from_version, upgrade.to_version
            );
        }
    }
    if !report.skipped.is_empty() {
        println!("Skipped records:");
        for skipped in &report.skipped {
            println!("  {}/{}: {}", skipped.tree, skipped.key, skipped.reason);
        }
    }
    println!(
        "Repairs: {} reparented, {} bank boxes destroyed, {} trade containers dissolved",
        report.reparented.len(),
        report.banks_destroyed,
        report.trades_dissolved
    );
    println!("Corpse timers running: {}", report.corpse_timers);
    println!("Drifted aggregates: {}", report.totals_drift.len());
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
