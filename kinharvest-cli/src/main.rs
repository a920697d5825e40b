// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! KinHarvest CLI - harvest DNA match data from consumer-genetics portals.
//!
//! # Examples
//!
//! ```bash
//! # Harvest a 23andMe account
//! kinharvest twentythree -u alice@example.com -p secret
//!
//! # Harvest an AncestryDNA account, with the extended per-match data
//! kinharvest ancestry -u alice@example.com -p secret -x
//!
//! # Custom output prefix and timeout
//! kinharvest 23 -u alice@example.com -p secret -o family -t 120
//! ```

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{ancestry, twentythree, VendorArgs};

// ============================================================================
// CLI Definition
// ============================================================================

/// KinHarvest CLI - DNA match harvesting.
#[derive(Parser)]
#[command(name = "kinharvest")]
#[command(about = "Harvest DNA match data from consumer-genetics portals")]
#[command(version)]
#[command(author = "KinHarvest Contributors")]
pub struct Cli {
    /// Portal to harvest.
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands, one per portal.
#[derive(Subcommand)]
pub enum Commands {
    /// Harvest a 23andMe account.
    #[command(name = "twentythree", visible_alias = "23")]
    TwentyThree(VendorArgs),

    /// Harvest an AncestryDNA account.
    Ancestry(VendorArgs),
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return; // No logging in quiet mode
    }

    let filter = if verbose {
        EnvFilter::new("kinharvest=debug,info")
    } else {
        EnvFilter::new("kinharvest=warn")
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::TwentyThree(args) => twentythree::run(args).await,
        Commands::Ancestry(args) => ancestry::run(args).await,
    };

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {}", e);
        }
        std::process::exit(ExitCode::Error as i32);
    }

    Ok(())
}
