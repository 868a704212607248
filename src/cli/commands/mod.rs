//! Command execution functions coordinating push runs.
//!
//! Each command builds a ledger, hands a retry engine to the dispatcher and
//! renders the resulting report.

mod helpers;
mod push;
mod report;
mod simulate;

use crate::cli::{Args, Command, RetrySettings, RunArgs, RuntimeConfig};
use crate::dispatch::{Dispatcher, FailureMode};
use crate::engine::RetryEngine;
use crate::error::Result;
use crate::ledger::RemoteLedger;
use std::sync::Arc;

use push::execute_push;
use simulate::execute_simulate;

/// Execute the main command based on parsed arguments
pub async fn execute_command(args: Args) -> Result<i32> {
    let config = RuntimeConfig::from(&args);

    let result = match args.validate() {
        Err(e) => Err(e),
        Ok(()) => match &args.command {
            Command::Push { .. } => execute_push(&args.command, &config).await,
            Command::Simulate { .. } => execute_simulate(&args.command, &config).await,
        },
    };

    match result {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            config.error_println(&format!(
                "Command '{}' failed: {}",
                args.command.name(),
                e
            ));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                config.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    config.println(&format!("  • {}", suggestion));
                }
            }

            Ok(1)
        }
    }
}

/// Build the dispatcher for a run against `ledger`
fn build_dispatcher(ledger: Arc<dyn RemoteLedger>, branch: &str, run: &RunArgs) -> Dispatcher {
    let settings = RetrySettings::from(run);
    let engine = RetryEngine::new(ledger, branch, settings.to_policy());
    let failure_mode = if run.abort_on_failure {
        FailureMode::AbortRun
    } else {
        FailureMode::Continue
    };

    Dispatcher::new(engine)
        .with_max_in_flight(run.max_in_flight)
        .with_failure_mode(failure_mode)
}
