//! Backoff delays between publish attempts.

use rand::Rng;
use std::time::Duration;

/// Lower bound of the uniform jitter window
pub const DEFAULT_MIN_DELAY: Duration = Duration::from_millis(50);

/// Upper bound (exclusive) of the uniform jitter window
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Per-attempt growth of the linear jitter window
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// How long to wait after a conflict or transient error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Uniform in `[min, max)` regardless of attempt number
    UniformJitter {
        /// Inclusive lower bound
        min: Duration,
        /// Exclusive upper bound
        max: Duration,
    },
    /// Uniform in `[0, base * attempt)`
    LinearJitter {
        /// Window growth per attempt
        base: Duration,
    },
}

impl Backoff {
    /// Uniform jitter with the default 50ms..5s window
    pub fn uniform() -> Self {
        Backoff::UniformJitter {
            min: DEFAULT_MIN_DELAY,
            max: DEFAULT_MAX_DELAY,
        }
    }

    /// Linear jitter with the default 2s base
    pub fn linear() -> Self {
        Backoff::LinearJitter {
            base: DEFAULT_BASE_DELAY,
        }
    }

    /// Sample the delay that follows the `attempt`-th failed attempt (1-based)
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        match *self {
            Backoff::UniformJitter { min, max } => {
                if max <= min {
                    min
                } else {
                    rng.gen_range(min..max)
                }
            }
            Backoff::LinearJitter { base } => {
                let upper = base.saturating_mul(attempt.max(1));
                if upper.is_zero() {
                    Duration::ZERO
                } else {
                    rng.gen_range(Duration::ZERO..upper)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_uniform_delays_stay_in_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let backoff = Backoff::uniform();

        for attempt in 1..=2_000 {
            let delay = backoff.delay(attempt, &mut rng);
            assert!(delay >= Duration::from_millis(50), "{delay:?} below window");
            assert!(delay < Duration::from_secs(5), "{delay:?} above window");
        }
    }

    #[test]
    fn test_linear_window_grows_with_attempt() {
        let mut rng = StdRng::seed_from_u64(11);
        let backoff = Backoff::linear();

        for attempt in 1..=10u32 {
            let upper = Duration::from_secs(2) * attempt;
            let mut widest = Duration::ZERO;
            for _ in 0..500 {
                let delay = backoff.delay(attempt, &mut rng);
                assert!(delay < upper, "attempt {attempt}: {delay:?} >= {upper:?}");
                widest = widest.max(delay);
            }
            // 500 samples land in the top half of the window with overwhelming probability
            assert!(widest >= upper / 2, "attempt {attempt}: window never explored");
        }
    }

    #[test]
    fn test_degenerate_windows() {
        let mut rng = StdRng::seed_from_u64(3);

        let fixed = Backoff::UniformJitter {
            min: Duration::from_millis(10),
            max: Duration::from_millis(10),
        };
        assert_eq!(fixed.delay(1, &mut rng), Duration::from_millis(10));

        let zero = Backoff::LinearJitter {
            base: Duration::ZERO,
        };
        assert_eq!(zero.delay(4, &mut rng), Duration::ZERO);
    }
}
