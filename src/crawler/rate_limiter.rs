//! Rate-limit pause decisions
//!
//! The rate limiter never tracks budget itself. It looks at the budget the
//! fetcher last observed and says whether the next request has to wait for
//! the window to reset.

use crate::config::RateLimitConfig;
use crate::model::RateBudget;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of wall-clock time for comparing against reset instants
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Decides when a crawl must sleep until the rate-limit window resets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiter {
    low_watermark: u32,
    safety_margin: Duration,
}

impl RateLimiter {
    pub fn new(low_watermark: u32, safety_margin: Duration) -> Self {
        Self {
            low_watermark,
            safety_margin,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            config.low_watermark,
            Duration::from_secs(config.safety_margin_secs),
        )
    }

    /// Returns how long to pause before the next request, if at all
    ///
    /// Pauses only when `remaining` is at or below the watermark and the
    /// reset instant is known and still in the future. The pause lasts until
    /// the reset plus the safety margin.
    pub fn should_pause(&self, budget: &RateBudget, now: DateTime<Utc>) -> Option<Duration> {
        if budget.remaining > self.low_watermark {
            return None;
        }

        let reset_at = budget.reset_at?;
        let until_reset = (reset_at - now).to_std().ok()?;
        if until_reset.is_zero() {
            return None;
        }

        Some(until_reset + self.safety_margin)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
