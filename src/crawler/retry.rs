//! Bounded exponential back-off for page fetches
//!
//! A [`RetryPolicy`] holds the back-off settings. Each fetch gets its own
//! [`RetryTracker`], which walks the attempt state machine:
//!
//! ```text
//! Idle -> Attempting -> Success
//!                    -> Waiting -> Attempting
//!                    -> Failed
//! ```

use crate::config::RetryConfig;
use crate::FetchError;
use std::time::Duration;

/// Largest share of the back-off delay added as jitter
const JITTER_FRACTION: f64 = 0.25;

/// Back-off settings for transient fetch failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    /// Creates a policy without jitter
    ///
    /// `max_attempts` counts every attempt, including the first one, and is
    /// raised to 1 if zero.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: false,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.base_delay_secs),
            Duration::from_secs(config.max_delay_secs),
        )
        .with_jitter(config.jitter)
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Un-jittered delay after the given failed attempt (1-based)
    ///
    /// `min(max_delay, base_delay * 2^(attempt - 1))`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay actually slept after the given failed attempt
    ///
    /// With jitter enabled, up to a quarter of the delay is added on top,
    /// never going past `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        if !self.jitter {
            return delay;
        }

        let extra = delay.mul_f64(fastrand::f64() * JITTER_FRACTION);
        (delay + extra).min(self.max_delay)
    }

    /// Starts tracking a new fetch
    pub fn start(&self) -> RetryTracker {
        RetryTracker {
            policy: *self,
            state: RetryState::Idle,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Where one fetch is in its retry lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
    Success { attempts: u32 },
    Failed { attempts: u32 },
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for this long, then attempt again
    Retry(Duration),
    /// Stop and surface the error
    GiveUp,
}

/// Retry state of a single fetch
#[derive(Debug, Clone)]
pub struct RetryTracker {
    policy: RetryPolicy,
    state: RetryState,
}

impl RetryTracker {
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Number of attempts started so far
    pub fn attempts(&self) -> u32 {
        match self.state {
            RetryState::Idle => 0,
            RetryState::Attempting { attempt } | RetryState::Waiting { attempt, .. } => attempt,
            RetryState::Success { attempts } | RetryState::Failed { attempts } => attempts,
        }
    }

    /// Moves to `Attempting` and returns the 1-based attempt number
    pub fn begin_attempt(&mut self) -> u32 {
        let attempt = self.attempts() + 1;
        self.state = RetryState::Attempting { attempt };
        attempt
    }

    pub fn on_success(&mut self) {
        self.state = RetryState::Success {
            attempts: self.attempts(),
        };
    }

    /// Decides whether the failed attempt is retried
    ///
    /// Fatal errors are never retried. Transient errors are retried until
    /// `max_attempts` attempts have been made.
    pub fn on_failure(&mut self, error: &FetchError) -> RetryDecision {
        let attempt = self.attempts();

        if !error.is_transient() || attempt >= self.policy.max_attempts {
            self.state = RetryState::Failed { attempts: attempt };
            return RetryDecision::GiveUp;
        }

        let delay = self.policy.backoff_delay(attempt);
        self.state = RetryState::Waiting { attempt, delay };
        RetryDecision::Retry(delay)
    }
}
