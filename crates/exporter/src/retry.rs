use std::time::Duration;

use crate::config::RetryConfig;

/// Back-off curve between export attempts.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// `base * multiplier^attempt`, optionally with deterministic jitter.
    Exponential {
        base: Duration,
        max: Duration,
        multiplier: f64,
        /// Stretch each delay by 0–40% depending on the attempt number so
        /// that workers failing together do not retry in lockstep.
        jitter: bool,
    },
    /// The same delay every time; used by disabled policies and tests.
    Constant { delay: Duration },
}

impl RetryStrategy {
    /// Delay before retrying after the zero-based `attempt` failed.
    ///
    /// ```
    /// use std::time::Duration;
    /// use telehouse_exporter::RetryStrategy;
    ///
    /// let strategy = RetryStrategy::Constant { delay: Duration::from_secs(1) };
    /// assert_eq!(strategy.delay_for(4), Duration::from_secs(1));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                base,
                max,
                multiplier,
                jitter,
            } => {
                // Attempt counts stay far below i32::MAX.
                #[allow(clippy::cast_possible_wrap)]
                let raw = base.as_secs_f64() * multiplier.powi(attempt as i32);
                let adjusted = if *jitter {
                    raw * (1.0 + 0.1 * f64::from(attempt % 5))
                } else {
                    raw
                };
                Duration::from_secs_f64(adjusted.min(max.as_secs_f64()))
            }
            Self::Constant { delay } => *delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryStrategy {
    fn from(config: &RetryConfig) -> Self {
        Self::Exponential {
            base: config.initial_interval,
            max: config.max_interval,
            multiplier: config.multiplier,
            jitter: true,
        }
    }
}

/// Whether, and after how long, a failed export is attempted again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    enabled: bool,
    strategy: RetryStrategy,
    max_elapsed: Duration,
}

impl RetryPolicy {
    pub fn new(strategy: RetryStrategy, max_elapsed: Duration) -> Self {
        Self {
            enabled: true,
            strategy,
            max_elapsed,
        }
    }

    /// A policy that never retries.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            strategy: RetryStrategy::Constant {
                delay: Duration::ZERO,
            },
            max_elapsed: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Delay before the next attempt, or `None` once retries are exhausted.
    ///
    /// `elapsed` is measured from the first attempt. A zero `max_elapsed`
    /// never gives up.
    pub fn next_delay(&self, attempt: u32, elapsed: Duration) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let delay = self.strategy.delay_for(attempt);
        if !self.max_elapsed.is_zero() && elapsed + delay > self.max_elapsed {
            return None;
        }
        Some(delay)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        if config.enabled {
            Self::new(RetryStrategy::from(config), config.max_elapsed_time)
        } else {
            Self::disabled()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}
