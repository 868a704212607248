//! Fan-out of units of work onto the retry engine.
//!
//! The dispatcher builds one unit per requested item, runs every unit's
//! publish loop as its own task in a [`JoinSet`] and joins them all into a
//! [`Report`].

mod audit;
mod unit;

pub use audit::{AuditSummary, audit_history};
pub use unit::UnitOfWork;

use crate::engine::{PublishReceipt, RetryEngine};
use crate::error::{PushError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What to do with the remaining units once one fails for good
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Let the other units finish and report the failure
    #[default]
    Continue,
    /// Cancel every other unit
    AbortRun,
}

/// Terminal state of one unit
#[derive(Debug)]
pub struct UnitOutcome {
    /// Dispatch index
    pub index: usize,
    /// Unit identifier
    pub id: Uuid,
    /// Target path
    pub path: String,
    /// Receipt or terminal error
    pub result: Result<PublishReceipt>,
}

/// Result of a whole run
#[derive(Debug)]
pub struct Report {
    /// Wall-clock time from first dispatch to last join
    pub elapsed: Duration,
    /// One entry per dispatched unit, ordered by index
    pub outcomes: Vec<UnitOutcome>,
}

impl Report {
    /// Units that reached the branch
    pub fn succeeded(&self) -> impl Iterator<Item = (&UnitOutcome, &PublishReceipt)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|r| (o, r)))
    }

    /// Units that ended in an error
    pub fn failed(&self) -> impl Iterator<Item = (&UnitOutcome, &PushError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o, e)))
    }

    /// Whether every unit reached the branch
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// Attempts spent by successful units
    pub fn total_attempts(&self) -> u64 {
        self.succeeded().map(|(_, r)| u64::from(r.attempts)).sum()
    }

    /// Conflicts absorbed by successful units
    pub fn total_conflicts(&self) -> u64 {
        self.succeeded().map(|(_, r)| u64::from(r.conflicts)).sum()
    }

    /// Rate-limit waits taken by successful units
    pub fn total_rate_limits(&self) -> u64 {
        self.succeeded().map(|(_, r)| u64::from(r.rate_limits)).sum()
    }
}

/// Pending/completed bookkeeping of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunProgress {
    /// Units dispatched
    pub total: usize,
    /// Units in a terminal state
    pub completed: usize,
    /// Terminal units that failed
    pub failed: usize,
}

impl RunProgress {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
        }
    }

    /// Units still running
    pub fn pending(&self) -> usize {
        self.total - self.completed
    }

    /// Whether every unit is terminal
    pub fn is_done(&self) -> bool {
        self.completed == self.total
    }
}

/// Runs many units of work concurrently against one engine
pub struct Dispatcher {
    engine: RetryEngine,
    max_in_flight: Option<usize>,
    failure_mode: FailureMode,
}

impl Dispatcher {
    /// Create a dispatcher with no concurrency ceiling
    pub fn new(engine: RetryEngine) -> Self {
        Self {
            engine,
            max_in_flight: None,
            failure_mode: FailureMode::default(),
        }
    }

    /// Admit at most `limit` units into the engine at once
    pub fn with_max_in_flight(mut self, limit: Option<usize>) -> Self {
        self.max_in_flight = limit.filter(|n| *n > 0);
        self
    }

    /// Choose how a fatal unit failure affects the rest of the run
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Publish `count` fresh units and wait for all of them
    pub async fn run(&self, count: usize) -> Report {
        let units = (0..count).map(UnitOfWork::new).collect();
        self.run_units(units).await
    }

    /// Publish the given units and wait for all of them
    pub async fn run_units(&self, units: Vec<UnitOfWork>) -> Report {
        let started = Instant::now();
        let cancel = CancellationToken::new();
        let gate = self.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));

        let mut identities = HashMap::with_capacity(units.len());
        let mut tasks = JoinSet::new();
        let mut progress = RunProgress::new(units.len());

        log::info!(
            "Dispatching {} unit(s) to branch {}",
            progress.total,
            self.engine.branch()
        );

        for unit in units {
            let engine = self.engine.clone();
            let cancel = cancel.child_token();
            let gate = gate.clone();
            let index = unit.index;
            let identity = (unit.id, unit.path.clone());

            let handle = tasks.spawn(async move {
                let _permit = match gate {
                    Some(gate) => gate.acquire_owned().await.ok(),
                    None => None,
                };
                engine.publish(&unit, &cancel).await
            });
            identities.insert(handle.id(), (index, identity));
        }

        let mut outcomes = Vec::with_capacity(progress.total);

        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, result) = match joined {
                Ok((task_id, result)) => (task_id, result),
                Err(join_error) => {
                    let task_id = join_error.id();
                    let index = identities.get(&task_id).map_or(0, |(i, _)| *i);
                    let result = Err(PushError::TaskFailed {
                        index,
                        reason: join_error.to_string(),
                    });
                    (task_id, result)
                }
            };

            let Some((index, (id, path))) = identities.remove(&task_id) else {
                continue;
            };

            progress.completed += 1;
            if let Err(e) = &result {
                progress.failed += 1;
                if self.failure_mode == FailureMode::AbortRun && !cancel.is_cancelled() {
                    log::error!("Aborting run after unit {} failed: {}", index, e);
                    cancel.cancel();
                }
            }

            log::info!(
                "Progress: {}/{} unit(s) finished ({} failed), {} pending",
                progress.completed,
                progress.total,
                progress.failed,
                progress.pending()
            );

            outcomes.push(UnitOutcome {
                index,
                id,
                path,
                result,
            });
        }

        debug_assert!(progress.is_done());
        outcomes.sort_by_key(|o| o.index);

        Report {
            elapsed: started.elapsed(),
            outcomes,
        }
    }
}
