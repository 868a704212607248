//! kodegen_push_stress - race concurrent commits onto one branch tip.
//!
//! Every unit appends one uniquely named file as its own commit and retries
//! until the branch accepts it or its retry policy gives up.

use kodegen_push_stress::cli;
use kodegen_push_stress::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("kodegen_push_stress=info"),
    )
    .init();

    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Never quiet for fatal errors
            let output = OutputManager::new(false, false);
            output.error(&format!("Fatal error: {e}"));

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                let _ = output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    let _ = output.indent(&suggestion);
                }
            }

            process::exit(1);
        }
    }
}
