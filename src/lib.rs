//! # kodegen_push_stress
//!
//! Concurrent branch-tip append engine.
//!
//! Many independent units of work each add one uniquely named file to the
//! same branch of a remote repository as a separate commit. Units race on
//! the branch tip; the tip only moves through compare-and-swap, so a unit
//! that loses the race rebuilds its commit on the new tip and tries again.
//!
//! ## Features
//!
//! - **Optimistic concurrency**: read tip, build commit, swap tip, retry on conflict
//! - **Retry policies**: unlimited with uniform jitter, or bounded with linear jitter
//! - **Rate-limit aware**: throttled attempts wait until the advertised resume time
//! - **Cancellation**: a run can stop every in-flight unit on the first failure
//! - **Offline runs**: an in-process ledger with fault injection and history audit
//!
//! ## Usage
//!
//! ```bash
//! kodegen_push_stress push isindir/poc --branch master --count 200
//! kodegen_push_stress simulate --count 500 --writers 4
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod cli;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ledger;

// Re-export main types for public API
pub use cli::Args;
pub use dispatch::{Dispatcher, FailureMode, Report, UnitOfWork, UnitOutcome};
pub use engine::{Backoff, PublishReceipt, RetryEngine, RetryPolicy};
pub use error::{CliError, LedgerError, PushError, Result};
pub use ledger::{GitHubLedger, GitHubLedgerConfig, ObjectId, RemoteLedger, SimulatedLedger};
