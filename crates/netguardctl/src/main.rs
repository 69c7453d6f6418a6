//! Netguard Control - CLI client for the Netguard daemon
//!
//! Requests daemon work by dropping trigger files into the shared trigger
//! directory; the daemon consumes them on its next control cycle.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netguard_common::triggers::{rebalance_path, reset_path, DEFAULT_TRIGGER_DIR};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "netguardctl")]
#[command(about = "Netguard - autonomic network control", long_about = None)]
#[command(version)]
struct Cli {
    /// Trigger directory shared with the daemon
    #[arg(long, default_value = DEFAULT_TRIGGER_DIR)]
    trigger_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Redistribute routes across both gateways on the next cycle
    Rebalance,

    /// Clear anomaly state and re-enable every interface
    Reset,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (path, message) = match cli.command {
        Commands::Rebalance => (
            rebalance_path(&cli.trigger_dir),
            "Rebalance requested; the daemon will redistribute routes on its next cycle",
        ),
        Commands::Reset => (
            reset_path(&cli.trigger_dir),
            "Anomaly reset requested; all interfaces will be re-enabled on the next cycle",
        ),
    };

    write_trigger(&path)?;
    println!("{} {}", "ok:".green().bold(), message);
    Ok(())
}

fn write_trigger(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating trigger directory {}", dir.display()))?;
    }
    std::fs::write(path, b"").with_context(|| format!("writing trigger {}", path.display()))?;
    Ok(())
}
