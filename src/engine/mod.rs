//! Optimistic-concurrency retry engine.
//!
//! Drives one [`UnitOfWork`] onto the branch tip: read the tip, build a commit
//! on top of it, compare-and-swap the tip, and on failure wait according to
//! the failure class before trying again from a fresh tip read.

mod backoff;

pub use backoff::{Backoff, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY};

use crate::dispatch::UnitOfWork;
use crate::error::{LedgerError, PushError, Result};
use crate::ledger::{LedgerResult, ObjectId, RemoteLedger, TreeEntry};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Attempt cap of the bounded policy
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// When to give up and how long to wait between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries until success
    pub max_attempts: Option<u32>,
    /// Delay after conflicts and transient errors
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Retry forever with uniform jitter
    pub fn unlimited() -> Self {
        Self {
            max_attempts: None,
            backoff: Backoff::uniform(),
        }
    }

    /// Give up after `max_attempts` attempts, with linear jitter
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff: Backoff::linear(),
        }
    }

    /// Replace the backoff strategy
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether `attempts` made so far use up the budget
    ///
    /// Rate-limited attempts count like any other, so under the bounded
    /// policy a throttled attempt consumes one slot.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|cap| attempts >= cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Classified result of a single publish attempt
#[derive(Debug)]
pub enum AttemptOutcome {
    /// The tip now points at `commit`
    Success {
        /// Commit that was published
        commit: ObjectId,
        /// Tip the commit was built on
        parent: ObjectId,
    },
    /// The tip moved between read and swap
    Conflict,
    /// The remote refuses requests until the given time
    RateLimited(DateTime<Utc>),
    /// Anything else
    TransientError(LedgerError),
}

impl AttemptOutcome {
    /// Sort a ledger result into one of the retry classes
    pub fn classify(result: LedgerResult<(ObjectId, ObjectId)>) -> Self {
        match result {
            Ok((commit, parent)) => AttemptOutcome::Success { commit, parent },
            Err(LedgerError::Conflict { .. }) => AttemptOutcome::Conflict,
            Err(LedgerError::RateLimited { resume_at }) => AttemptOutcome::RateLimited(resume_at),
            Err(other) => AttemptOutcome::TransientError(other),
        }
    }
}

/// Outcome of a unit that reached the branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Published commit
    pub commit: ObjectId,
    /// Tip the commit was built on
    pub parent: ObjectId,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Attempts lost to concurrent writers
    pub conflicts: u32,
    /// Attempts that hit the rate limit
    pub rate_limits: u32,
    /// Attempts that failed for any other reason
    pub transient_errors: u32,
}

/// Publishes units of work onto one branch of a ledger
#[derive(Clone)]
pub struct RetryEngine {
    ledger: Arc<dyn RemoteLedger>,
    branch: String,
    policy: RetryPolicy,
}

impl RetryEngine {
    /// Create an engine for `branch`
    pub fn new(ledger: Arc<dyn RemoteLedger>, branch: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            ledger,
            branch: branch.into(),
            policy,
        }
    }

    /// Branch this engine advances
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Drive `unit` onto the branch tip
    ///
    /// Returns once the tip points at a commit carrying the unit's change, or
    /// with [`PushError::RetriesExhausted`] when the bounded policy runs out of
    /// attempts, or [`PushError::Cancelled`] when `cancel` fires.
    ///
    /// A swap that fails without a verdict (timeout, dropped connection,
    /// cancellation mid-request) may still have moved the tip. Such a swap
    /// stays in doubt until the next tip read settles it, so the unit's change
    /// is never committed twice.
    pub async fn publish(
        &self,
        unit: &UnitOfWork,
        cancel: &CancellationToken,
    ) -> Result<PublishReceipt> {
        let mut tally = Tally::default();
        let mut in_doubt: Option<InDoubtSwap> = None;

        loop {
            if cancel.is_cancelled() {
                return self.stop(unit, &tally, in_doubt.as_ref()).await;
            }
            if tally.attempts > 0 {
                log::warn!(
                    "Retrying push for file {} (attempt {})",
                    unit.path,
                    tally.attempts + 1
                );
            }
            tally.attempts += 1;

            let outcome = match guarded(cancel, self.attempt(unit, &mut in_doubt)).await {
                Some(result) => AttemptOutcome::classify(result),
                None => return self.stop(unit, &tally, in_doubt.as_ref()).await,
            };

            let (wait, last_error) = match outcome {
                AttemptOutcome::Success { commit, parent } => {
                    log::info!(
                        "Successfully pushed file {} to {} as {} (attempt {})",
                        unit.path,
                        self.branch,
                        commit.short(),
                        tally.attempts
                    );
                    return Ok(tally.receipt(commit, parent));
                }
                AttemptOutcome::RateLimited(resume_at) => {
                    tally.rate_limits += 1;
                    let wait = (resume_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    log::warn!(
                        "Rate limit exceeded while pushing {}. Waiting for {:.1}s before retrying",
                        unit.path,
                        wait.as_secs_f64()
                    );
                    (wait, format!("rate limited until {}", resume_at))
                }
                AttemptOutcome::Conflict => {
                    tally.conflicts += 1;
                    log::warn!(
                        "Branch {} moved while pushing {}",
                        self.branch,
                        unit.path
                    );
                    let delay = self.policy.backoff.delay(tally.attempts, &mut rand::thread_rng());
                    (delay, format!("branch {} moved", self.branch))
                }
                AttemptOutcome::TransientError(e) => {
                    tally.transient_errors += 1;
                    log::warn!("Error pushing file {}: {}", unit.path, e);
                    let delay = self.policy.backoff.delay(tally.attempts, &mut rand::thread_rng());
                    (delay, e.to_string())
                }
            };

            if self.policy.is_exhausted(tally.attempts) {
                log::error!(
                    "Failed to push file {} after {} attempts",
                    unit.path,
                    tally.attempts
                );
                return Err(PushError::RetriesExhausted {
                    path: unit.path.clone(),
                    attempts: tally.attempts,
                    last_error,
                });
            }

            log::debug!("Backing off {:?} before next push of {}", wait, unit.path);
            if guarded(cancel, tokio::time::sleep(wait)).await.is_none() {
                return self.stop(unit, &tally, in_doubt.as_ref()).await;
            }
        }
    }

    /// One read-build-swap round against the ledger
    ///
    /// Returns the published commit and the tip it replaced. The swap expects
    /// exactly the tip read at the start of this round. If `in_doubt` holds an
    /// earlier swap that turns out to have landed, that swap is the result and
    /// nothing new is built.
    async fn attempt(
        &self,
        unit: &UnitOfWork,
        in_doubt: &mut Option<InDoubtSwap>,
    ) -> LedgerResult<(ObjectId, ObjectId)> {
        let tip = self.ledger.read_tip(&self.branch).await?;
        let base = self.ledger.read_commit(&tip).await?;

        if let Some(swap) = in_doubt.clone() {
            if self.carries(unit, &swap, &tip, &base.tree).await? {
                log::info!(
                    "Earlier swap of {} had landed as {}",
                    unit.path,
                    swap.commit.short()
                );
                return Ok((swap.commit, swap.parent));
            }
            *in_doubt = None;
        }

        let blob = self.ledger.create_blob(&unit.content).await?;
        let tree = self
            .ledger
            .create_tree(&base.tree, &[TreeEntry::file(unit.path.clone(), blob.clone())])
            .await?;
        let commit = self
            .ledger
            .create_commit(&unit.message, &tree, std::slice::from_ref(&tip))
            .await?;

        *in_doubt = Some(InDoubtSwap {
            commit: commit.clone(),
            parent: tip.clone(),
            blob,
        });

        match self
            .ledger
            .compare_and_swap_tip(&self.branch, &tip, &commit)
            .await
        {
            Ok(()) => {
                *in_doubt = None;
                Ok((commit, tip))
            }
            // a definite rejection leaves the tip untouched
            Err(e @ (LedgerError::Conflict { .. } | LedgerError::RateLimited { .. })) => {
                *in_doubt = None;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether the branch at `tip` (with tree `tip_tree`) already holds `swap`
    async fn carries(
        &self,
        unit: &UnitOfWork,
        swap: &InDoubtSwap,
        tip: &ObjectId,
        tip_tree: &ObjectId,
    ) -> LedgerResult<bool> {
        if *tip == swap.commit {
            return Ok(true);
        }
        let entry = self.ledger.read_tree_entry(tip_tree, &unit.path).await?;
        Ok(entry.as_ref() == Some(&swap.blob))
    }

    /// Report cancellation, unless a swap left in doubt turns out to have landed
    async fn stop(
        &self,
        unit: &UnitOfWork,
        tally: &Tally,
        in_doubt: Option<&InDoubtSwap>,
    ) -> Result<PublishReceipt> {
        if let Some(swap) = in_doubt {
            let settled = async {
                let tip = self.ledger.read_tip(&self.branch).await?;
                let head = self.ledger.read_commit(&tip).await?;
                self.carries(unit, swap, &tip, &head.tree).await
            };
            match settled.await {
                Ok(true) => {
                    log::info!(
                        "Push of {} landed as {} before cancellation",
                        unit.path,
                        swap.commit.short()
                    );
                    return Ok(tally.receipt(swap.commit.clone(), swap.parent.clone()));
                }
                Ok(false) => {}
                Err(e) => log::warn!("Could not settle pending swap of {}: {}", unit.path, e),
            }
        }

        Err(PushError::Cancelled {
            path: unit.path.clone(),
            attempts: tally.attempts,
        })
    }
}

/// A swap whose verdict never arrived
#[derive(Debug, Clone)]
struct InDoubtSwap {
    commit: ObjectId,
    parent: ObjectId,
    blob: ObjectId,
}

/// Per-unit attempt counters
#[derive(Debug, Default)]
struct Tally {
    attempts: u32,
    conflicts: u32,
    rate_limits: u32,
    transient_errors: u32,
}

impl Tally {
    fn receipt(&self, commit: ObjectId, parent: ObjectId) -> PublishReceipt {
        PublishReceipt {
            commit,
            parent,
            attempts: self.attempts,
            conflicts: self.conflicts,
            rate_limits: self.rate_limits,
            transient_errors: self.transient_errors,
        }
    }
}

/// Run `future` unless `cancel` fires first
async fn guarded<T>(cancel: &CancellationToken, future: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        value = future => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CommitInfo, Fault, LedgerOp, SimulatedLedger};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn engine_with(ledger: &Arc<SimulatedLedger>, policy: RetryPolicy) -> RetryEngine {
        RetryEngine::new(ledger.clone(), "master", policy)
    }

    /// Applies the first swap on the inner ledger, then loses its response
    struct LostSwapResponse {
        inner: Arc<SimulatedLedger>,
        armed: AtomicBool,
        foreign_after: bool,
        cancel: Option<CancellationToken>,
    }

    impl LostSwapResponse {
        fn new(inner: &Arc<SimulatedLedger>) -> Self {
            Self {
                inner: inner.clone(),
                armed: AtomicBool::new(true),
                foreign_after: false,
                cancel: None,
            }
        }
    }

    #[async_trait]
    impl RemoteLedger for LostSwapResponse {
        async fn read_tip(&self, branch: &str) -> LedgerResult<ObjectId> {
            self.inner.read_tip(branch).await
        }

        async fn read_commit(&self, commit: &ObjectId) -> LedgerResult<CommitInfo> {
            self.inner.read_commit(commit).await
        }

        async fn read_tree_entry(
            &self,
            tree: &ObjectId,
            path: &str,
        ) -> LedgerResult<Option<ObjectId>> {
            self.inner.read_tree_entry(tree, path).await
        }

        async fn create_blob(&self, content: &str) -> LedgerResult<ObjectId> {
            self.inner.create_blob(content).await
        }

        async fn create_tree(
            &self,
            base_tree: &ObjectId,
            entries: &[TreeEntry],
        ) -> LedgerResult<ObjectId> {
            self.inner.create_tree(base_tree, entries).await
        }

        async fn create_commit(
            &self,
            message: &str,
            tree: &ObjectId,
            parents: &[ObjectId],
        ) -> LedgerResult<ObjectId> {
            self.inner.create_commit(message, tree, parents).await
        }

        async fn compare_and_swap_tip(
            &self,
            branch: &str,
            expected: &ObjectId,
            new: &ObjectId,
        ) -> LedgerResult<()> {
            self.inner.compare_and_swap_tip(branch, expected, new).await?;
            if !self.armed.swap(false, Ordering::SeqCst) {
                return Ok(());
            }
            if self.foreign_after {
                self.inner.land_foreign_commit(branch)?;
            }
            if let Some(cancel) = &self.cancel {
                cancel.cancel();
                std::future::pending::<()>().await;
            }
            Err(LedgerError::Injected {
                operation: "compare_and_swap_tip".to_string(),
            })
        }
    }

    fn unit_commits(ledger: &SimulatedLedger) -> usize {
        let history = ledger.history("master").expect("history");
        // the root commit has no parents
        history
            .iter()
            .filter(|c| !c.is_foreign() && !c.parents.is_empty())
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_first_try() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        let engine = engine_with(&ledger, RetryPolicy::unlimited());
        let unit = UnitOfWork::new(0);

        let receipt = engine
            .publish(&unit, &CancellationToken::new())
            .await
            .expect("publish");

        assert_eq!(receipt.attempts, 1);
        assert_eq!(ledger.tip("master"), Some(receipt.commit.clone()));
        let files = ledger.files("master").expect("files");
        assert_eq!(files.get(&unit.path), Some(&unit.content));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflicts_converge_after_k_plus_one_attempts() {
        const K: usize = 3;
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject(LedgerOp::CompareAndSwap, Fault::ForeignWrite, K);
        let engine = engine_with(&ledger, RetryPolicy::unlimited());

        let receipt = engine
            .publish(&UnitOfWork::new(1), &CancellationToken::new())
            .await
            .expect("publish");

        assert_eq!(receipt.attempts, K as u32 + 1);
        assert_eq!(receipt.conflicts, K as u32);
        assert_eq!(ledger.calls(LedgerOp::ReadTip), K + 1);

        // every attempt re-read a tip that a foreign writer had moved
        let tips = ledger.observed_tips();
        assert_eq!(tips.len(), K + 1);
        assert_eq!(tips.iter().collect::<HashSet<_>>().len(), K + 1);
        assert_eq!(receipt.parent, tips[K]);

        let history = ledger.history("master").expect("history");
        assert_eq!(history[0].id, receipt.commit);
        assert_eq!(history.iter().filter(|c| c.is_foreign()).count(), K);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_policy_gives_up_after_cap() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject_always(LedgerOp::ReadTip, Fault::Transient);
        let engine = engine_with(&ledger, RetryPolicy::bounded(DEFAULT_MAX_ATTEMPTS));
        let unit = UnitOfWork::new(2);

        let err = engine
            .publish(&unit, &CancellationToken::new())
            .await
            .expect_err("must exhaust");

        match err {
            PushError::RetriesExhausted { path, attempts, .. } => {
                assert_eq!(path, unit.path);
                assert_eq!(attempts, 5);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(ledger.calls(LedgerOp::ReadTip), 5);
        assert_eq!(ledger.calls(LedgerOp::CompareAndSwap), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_backoff_stays_under_linear_window() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject_always(LedgerOp::CreateBlob, Fault::Transient);
        let engine = engine_with(&ledger, RetryPolicy::bounded(5));

        let _ = engine
            .publish(&UnitOfWork::new(3), &CancellationToken::new())
            .await;

        let times = ledger.call_times(LedgerOp::ReadTip);
        assert_eq!(times.len(), 5);
        for (i, pair) in times.windows(2).enumerate() {
            let gap = pair[1] - pair[0];
            let attempt = i as u32 + 1;
            assert!(
                gap < Duration::from_secs(2) * attempt + Duration::from_millis(1),
                "gap after attempt {attempt} was {gap:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_until_resume() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject(
            LedgerOp::CreateCommit,
            Fault::RateLimited {
                retry_in: Duration::from_secs(30),
            },
            1,
        );
        let engine = engine_with(&ledger, RetryPolicy::unlimited());

        let receipt = engine
            .publish(&UnitOfWork::new(4), &CancellationToken::new())
            .await
            .expect("publish");

        assert_eq!(receipt.rate_limits, 1);
        assert_eq!(receipt.attempts, 2);

        let throttled_at = ledger.call_times(LedgerOp::CreateCommit)[0];
        let next_attempt = ledger.call_times(LedgerOp::ReadTip)[1];
        assert!(next_attempt - throttled_at >= Duration::from_millis(29_900));
        // no jitter on top of the resume time
        assert!(next_attempt - throttled_at < Duration::from_millis(30_050));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_never_exhaust_unlimited_policy() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject(
            LedgerOp::ReadTip,
            Fault::RateLimited {
                retry_in: Duration::from_secs(1),
            },
            12,
        );
        let engine = engine_with(&ledger, RetryPolicy::unlimited());

        let receipt = engine
            .publish(&UnitOfWork::new(5), &CancellationToken::new())
            .await
            .expect("publish");

        assert_eq!(receipt.rate_limits, 12);
        assert_eq!(receipt.attempts, 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_count_toward_bounded_cap() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject(
            LedgerOp::ReadTip,
            Fault::RateLimited {
                retry_in: Duration::from_secs(1),
            },
            3,
        );
        let engine = engine_with(&ledger, RetryPolicy::bounded(3));

        let err = engine
            .publish(&UnitOfWork::new(6), &CancellationToken::new())
            .await
            .expect_err("cap reached by throttled attempts");

        assert!(matches!(err, PushError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(ledger.calls(LedgerOp::ReadTip), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_anywhere_are_retried() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject(LedgerOp::ReadCommit, Fault::Transient, 1);
        ledger.inject(LedgerOp::CreateTree, Fault::Transient, 1);
        let engine = engine_with(&ledger, RetryPolicy::bounded(5));

        let receipt = engine
            .publish(&UnitOfWork::new(7), &CancellationToken::new())
            .await
            .expect("publish");

        assert_eq!(receipt.transient_errors, 2);
        assert_eq!(receipt.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_stops_before_any_call() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        let engine = engine_with(&ledger, RetryPolicy::unlimited());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .publish(&UnitOfWork::new(8), &cancel)
            .await
            .expect_err("cancelled");

        assert!(matches!(err, PushError::Cancelled { .. }));
        assert_eq!(ledger.calls(LedgerOp::ReadTip), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject_always(LedgerOp::ReadTip, Fault::Transient);
        let engine = engine_with(&ledger, RetryPolicy::unlimited());
        let cancel = CancellationToken::new();

        let task = {
            let cancel = cancel.clone();
            tokio::spawn(async move { engine.publish(&UnitOfWork::new(9), &cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(60)).await;
        cancel.cancel();

        let err = task.await.expect("join").expect_err("cancelled");
        assert!(matches!(err, PushError::Cancelled { attempts, .. } if attempts >= 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_applied_without_response_lands_once() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        let remote: Arc<dyn RemoteLedger> = Arc::new(LostSwapResponse::new(&ledger));
        let engine = RetryEngine::new(remote, "master", RetryPolicy::unlimited());
        let unit = UnitOfWork::new(10);

        let receipt = engine
            .publish(&unit, &CancellationToken::new())
            .await
            .expect("publish");

        assert_eq!(receipt.attempts, 2);
        assert_eq!(receipt.transient_errors, 1);
        assert_eq!(ledger.tip("master"), Some(receipt.commit.clone()));
        assert_eq!(unit_commits(&ledger), 1);
        assert_eq!(ledger.calls(LedgerOp::CreateCommit), 1);
        assert_eq!(ledger.calls(LedgerOp::ReadTreeEntry), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_applied_without_response_found_below_newer_tip() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        let remote = LostSwapResponse {
            foreign_after: true,
            ..LostSwapResponse::new(&ledger)
        };
        let engine = RetryEngine::new(Arc::new(remote), "master", RetryPolicy::unlimited());
        let unit = UnitOfWork::new(11);

        let receipt = engine
            .publish(&unit, &CancellationToken::new())
            .await
            .expect("publish");

        let history = ledger.history("master").expect("history");
        assert!(history[0].is_foreign());
        assert_eq!(history[1].id, receipt.commit);
        assert_eq!(unit_commits(&ledger), 1);
        assert_eq!(ledger.calls(LedgerOp::CreateCommit), 1);
        assert_eq!(ledger.calls(LedgerOp::ReadTreeEntry), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_landing_as_run_is_cancelled_counts_as_success() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        let cancel = CancellationToken::new();
        let remote = LostSwapResponse {
            cancel: Some(cancel.clone()),
            ..LostSwapResponse::new(&ledger)
        };
        let engine = RetryEngine::new(Arc::new(remote), "master", RetryPolicy::unlimited());

        let receipt = engine
            .publish(&UnitOfWork::new(12), &cancel)
            .await
            .expect("landed before cancellation");

        assert_eq!(receipt.attempts, 1);
        assert_eq!(ledger.tip("master"), Some(receipt.commit));
        assert_eq!(unit_commits(&ledger), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_swap_that_never_landed_is_rebuilt() {
        let ledger = Arc::new(SimulatedLedger::new("master"));
        ledger.inject(LedgerOp::CompareAndSwap, Fault::Transient, 1);
        let engine = engine_with(&ledger, RetryPolicy::unlimited());

        let receipt = engine
            .publish(&UnitOfWork::new(13), &CancellationToken::new())
            .await
            .expect("publish");

        assert_eq!(receipt.attempts, 2);
        assert_eq!(ledger.calls(LedgerOp::ReadTreeEntry), 1);
        assert_eq!(ledger.calls(LedgerOp::CreateCommit), 2);
        assert_eq!(unit_commits(&ledger), 1);
    }

    #[test]
    fn test_classify_maps_ledger_errors() {
        let conflict = AttemptOutcome::classify(Err(LedgerError::Conflict {
            branch: "master".into(),
            expected: "abc".into(),
        }));
        assert!(matches!(conflict, AttemptOutcome::Conflict));

        let resume_at = Utc::now();
        let limited = AttemptOutcome::classify(Err(LedgerError::RateLimited { resume_at }));
        assert!(matches!(limited, AttemptOutcome::RateLimited(t) if t == resume_at));

        let other = AttemptOutcome::classify(Err(LedgerError::NotFound {
            what: "branch".into(),
        }));
        assert!(matches!(other, AttemptOutcome::TransientError(_)));
    }
}
