//! Error types for kodegen_push_stress operations.
//!
//! This module defines all error types with actionable error messages and recovery suggestions.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias for kodegen_push_stress operations
pub type Result<T> = std::result::Result<T, PushError>;

/// Main error type for all kodegen_push_stress operations
#[derive(Error, Debug)]
pub enum PushError {
    /// Remote ledger errors that escaped the retry engine
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A unit ran out of attempts under the bounded policy
    #[error("Failed to push file {path} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Target path of the unit that gave up
        path: String,
        /// Number of attempts made
        attempts: u32,
        /// Error observed on the final attempt
        last_error: String,
    },

    /// The unit was cancelled before it could publish
    #[error("Push of {path} cancelled after {attempts} attempt(s)")]
    Cancelled {
        /// Target path of the cancelled unit
        path: String,
        /// Number of attempts made before cancellation
        attempts: u32,
    },

    /// A publish task panicked or was aborted by the runtime
    #[error("Publish task for unit {index} did not finish: {reason}")]
    TaskFailed {
        /// Dispatch index of the unit
        index: usize,
        /// Reason reported by the runtime
        reason: String,
    },

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// Generic errors from anyhow
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Errors reported by a remote ledger binding
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The remote's request budget is exhausted until `resume_at`
    #[error("Rate limit exceeded, resumes at {resume_at}")]
    RateLimited {
        /// Instant at which requests are accepted again
        resume_at: DateTime<Utc>,
    },

    /// The branch tip moved between read and compare-and-swap
    #[error("Branch '{branch}' moved away from {expected}")]
    Conflict {
        /// Branch that was being advanced
        branch: String,
        /// Tip value the swap expected to replace
        expected: String,
    },

    /// Object or reference not found
    #[error("Not found: {what}")]
    NotFound {
        /// What was looked up
        what: String,
    },

    /// Credentials rejected
    #[error("Authentication failed: {reason}")]
    Unauthorized {
        /// Message returned by the remote
        reason: String,
    },

    /// Unexpected status from the remote API
    #[error("API request {operation} failed with status {status}: {message}")]
    Api {
        /// Operation that failed
        operation: String,
        /// HTTP status code
        status: u16,
        /// Message returned by the remote
        message: String,
    },

    /// Transport-level failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("Failed to decode {operation} response: {reason}")]
    Decode {
        /// Operation whose response was malformed
        operation: String,
        /// Decoder message
        reason: String,
    },

    /// Fault injected by the simulated ledger
    #[error("Simulated fault during {operation}")]
    Injected {
        /// Operation the fault was injected into
        operation: String,
    },
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Missing required argument or environment variable
    #[error("Missing required argument: {argument}")]
    MissingArgument {
        /// Argument name
        argument: String,
    },
}

impl PushError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PushError::Ledger(LedgerError::Unauthorized { .. }) => vec![
                "Export a token with contents:write scope: export GITHUB_TOKEN=...".to_string(),
                "Verify the token has not expired".to_string(),
            ],
            PushError::Ledger(LedgerError::NotFound { .. }) => vec![
                "Check the owner/repo argument and the --branch name".to_string(),
                "Private repositories return 404 when the token lacks access".to_string(),
            ],
            PushError::RetriesExhausted { .. } => vec![
                "Raise --max-attempts or switch to --policy unlimited".to_string(),
                "Lower --count to reduce contention on the branch tip".to_string(),
            ],
            PushError::Cli(CliError::InvalidArguments { .. }) => vec![
                "Run with --help to see accepted values and defaults".to_string(),
                "Check KODEGEN_PUSH_* environment overrides".to_string(),
            ],
            PushError::Cli(CliError::MissingArgument { argument }) => {
                vec![format!("Provide {}", argument)]
            }
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}
