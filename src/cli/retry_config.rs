//! Retry configuration for publish runs.
//!
//! Resolves the retry knobs from CLI flags and `KODEGEN_PUSH_*` environment
//! variables into a [`RetryPolicy`], rejecting values that would make a run
//! meaningless.

use super::args::{PolicyKind, RunArgs};
use crate::engine::{Backoff, RetryPolicy};
use crate::error::CliError;
use std::time::Duration;

/// Highest accepted attempt cap for the bounded policy
const MAX_ATTEMPTS_LIMIT: u32 = 100;

/// Highest accepted delay for any backoff bound (10 minutes)
const MAX_DELAY_LIMIT_MS: u64 = 600_000;

/// Retry knobs of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    /// Selected policy
    pub policy: PolicyKind,
    /// Attempt cap of the bounded policy
    pub max_attempts: u32,
    /// Uniform jitter lower bound
    pub min_delay: Duration,
    /// Uniform jitter upper bound (exclusive)
    pub max_delay: Duration,
    /// Linear jitter growth per attempt
    pub base_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            policy: PolicyKind::Unlimited,
            max_attempts: crate::engine::DEFAULT_MAX_ATTEMPTS,
            min_delay: crate::engine::DEFAULT_MIN_DELAY,
            max_delay: crate::engine::DEFAULT_MAX_DELAY,
            base_delay: crate::engine::DEFAULT_BASE_DELAY,
        }
    }
}

impl From<&RunArgs> for RetrySettings {
    fn from(run: &RunArgs) -> Self {
        Self {
            policy: run.policy,
            max_attempts: run.max_attempts,
            min_delay: Duration::from_millis(run.min_delay_ms),
            max_delay: Duration::from_millis(run.max_delay_ms),
            base_delay: Duration::from_millis(run.base_delay_ms),
        }
    }
}

impl RetrySettings {
    /// Validate the knobs relevant to the selected policy
    pub fn validate(&self) -> Result<(), CliError> {
        let limit = Duration::from_millis(MAX_DELAY_LIMIT_MS);

        match self.policy {
            PolicyKind::Unlimited => {
                if self.min_delay >= self.max_delay {
                    return Err(invalid(format!(
                        "min delay ({}ms) must be below max delay ({}ms)",
                        self.min_delay.as_millis(),
                        self.max_delay.as_millis()
                    )));
                }
                if self.max_delay > limit {
                    return Err(invalid(format!(
                        "max delay too high: {}ms (max: {}ms)",
                        self.max_delay.as_millis(),
                        MAX_DELAY_LIMIT_MS
                    )));
                }
            }
            PolicyKind::Bounded => {
                if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
                    return Err(invalid(format!(
                        "max attempts must be between 1 and {}, got {}",
                        MAX_ATTEMPTS_LIMIT, self.max_attempts
                    )));
                }
                if self.base_delay.is_zero() || self.base_delay > limit {
                    return Err(invalid(format!(
                        "base delay must be between 1ms and {}ms, got {}ms",
                        MAX_DELAY_LIMIT_MS,
                        self.base_delay.as_millis()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Build the engine policy
    pub fn to_policy(&self) -> RetryPolicy {
        match self.policy {
            PolicyKind::Unlimited => RetryPolicy::unlimited().with_backoff(Backoff::UniformJitter {
                min: self.min_delay,
                max: self.max_delay,
            }),
            PolicyKind::Bounded => RetryPolicy::bounded(self.max_attempts).with_backoff(
                Backoff::LinearJitter {
                    base: self.base_delay,
                },
            ),
        }
    }

    /// One-line description for the run banner
    pub fn describe(&self) -> String {
        match self.policy {
            PolicyKind::Unlimited => format!(
                "unlimited retries, jitter {}ms..{}ms",
                self.min_delay.as_millis(),
                self.max_delay.as_millis()
            ),
            PolicyKind::Bounded => format!(
                "up to {} attempts, jitter 0..{}ms x attempt",
                self.max_attempts,
                self.base_delay.as_millis()
            ),
        }
    }
}

fn invalid(reason: String) -> CliError {
    CliError::InvalidArguments { reason }
}
