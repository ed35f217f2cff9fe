//! CLI module for txncore
//!
//! Provides the command-line interface:
//! - init: create the data directory and an empty transaction log
//! - inspect: replay the log read-only and report live units

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{init, inspect, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
