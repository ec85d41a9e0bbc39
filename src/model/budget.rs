use chrono::{DateTime, Utc};

/// GitHub's hourly GraphQL point allowance, assumed until the first response
pub const DEFAULT_REMAINING: u32 = 5000;

/// Rate-limit budget as last reported by the remote source
///
/// The budget is replaced wholesale after every response that carries
/// rate-limit information. It is never decremented locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    /// Requests (or points) left in the current window
    pub remaining: u32,

    /// When the window resets, if the source reported it
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateBudget {
    pub fn new(remaining: u32, reset_at: Option<DateTime<Utc>>) -> Self {
        Self {
            remaining,
            reset_at,
        }
    }
}

impl Default for RateBudget {
    fn default() -> Self {
        Self::new(DEFAULT_REMAINING, None)
    }
}
