//! Rate limit policy: the fixed bounds a limiter enforces.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::key::DEFAULT_KEY_PREFIX;
use crate::error::{Result, TollgateError};

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u64 = 10;
/// Default window length in seconds.
pub const DEFAULT_WINDOW_SECS: u64 = 60;
/// Longest accepted window: one year.
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;
/// Default upper bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// How the limiter talks to the store when recording a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementMode {
    /// Read, then create or increment, in separate store calls.
    ///
    /// Concurrent requests for one identity can race between the read and
    /// the write, so more than `limit` requests may be admitted during a
    /// burst. The limit is a soft limit.
    #[default]
    BestEffort,
    /// One atomic increment-or-create call per request. Admits exactly
    /// `limit` requests per window, but requires store support.
    Strict,
}

/// What the request boundary does when the store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Let the request through without quota metadata.
    #[default]
    FailOpen,
    /// Refuse the request as unavailable.
    FailClosed,
}

/// Validated, immutable bounds for a [`RateLimiter`](super::RateLimiter).
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    limit: u64,
    window_secs: u64,
    key_prefix: String,
    enforcement: EnforcementMode,
    store_timeout: Duration,
}

impl RateLimitPolicy {
    /// Create a policy admitting `limit` requests per `window_secs`.
    ///
    /// Both bounds must be positive, and the window no longer than
    /// [`MAX_WINDOW_SECS`].
    pub fn new(limit: u64, window_secs: u64) -> Result<Self> {
        if limit == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "limit must be greater than zero".to_string(),
            ));
        }
        if window_secs == 0 {
            return Err(TollgateError::InvalidConfiguration(
                "window_secs must be greater than zero".to_string(),
            ));
        }
        if window_secs > MAX_WINDOW_SECS {
            return Err(TollgateError::InvalidConfiguration(format!(
                "window_secs must be at most {}",
                MAX_WINDOW_SECS
            )));
        }

        Ok(Self {
            limit,
            window_secs,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            enforcement: EnforcementMode::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        })
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_enforcement(mut self, enforcement: EnforcementMode) -> Self {
        self.enforcement = enforcement;
        self
    }

    /// Bound every store call by `timeout`.
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn enforcement(&self) -> EnforcementMode {
        self.enforcement
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window_secs: DEFAULT_WINDOW_SECS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            enforcement: EnforcementMode::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}
