//! Command line interface for kodegen_push_stress.
//!
//! Parses arguments, builds the ledger and retry policy for the selected
//! command, runs the dispatcher and renders the report.

mod args;
pub mod commands;
mod output;
mod retry_config;

pub use args::{Args, Command, PolicyKind, RunArgs, RuntimeConfig};
pub use commands::execute_command;
pub use output::OutputManager;
pub use retry_config::RetrySettings;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
