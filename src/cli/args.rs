//! CLI argument definitions using clap
//!
//! Commands:
//! - txncore init --config <path>
//! - txncore inspect --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// txncore - a recoverable two-phase-commit transaction coordinator
#[derive(Parser, Debug)]
#[command(name = "txncore")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a coordinator data directory
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./txncore.json")]
        config: PathBuf,
    },

    /// Report the transaction log's service data and live units
    Inspect {
        /// Path to configuration file
        #[arg(long, default_value = "./txncore.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
