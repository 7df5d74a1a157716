//! The outcome of a single admission check.

/// Admission result plus the quota metadata surfaced to the caller.
///
/// Rejection is an ordinary value here; only store faults are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may proceed
    pub admitted: bool,
    /// Configured requests per window
    pub limit: u64,
    /// Requests left in the current window, never negative
    pub remaining: u64,
    /// Seconds until the current window resets
    pub reset_seconds: u64,
}

impl RateDecision {
    pub fn admitted(limit: u64, remaining: u64, reset_seconds: u64) -> Self {
        Self {
            admitted: true,
            limit,
            remaining,
            reset_seconds,
        }
    }

    pub fn rejected(limit: u64, reset_seconds: u64) -> Self {
        Self {
            admitted: false,
            limit,
            remaining: 0,
            reset_seconds,
        }
    }

    /// Suggested delay before retrying a rejected request.
    pub fn retry_after(&self) -> u64 {
        self.reset_seconds
    }

    /// Human-readable explanation for a rejected request.
    pub fn rejection_message(&self) -> String {
        format!(
            "Rate limit exceeded. Try again in {} seconds.",
            self.retry_after()
        )
    }
}
