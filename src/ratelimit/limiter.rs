//! Core rate limiter implementation.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::decision::RateDecision;
use super::key::RateKey;
use super::policy::{EnforcementMode, RateLimitPolicy};
use crate::error::{Result, TollgateError};
use crate::store::{StoreError, WindowStore};

/// Fixed-window rate limiter over a shared window store.
///
/// The limiter holds no counters of its own. All state lives in the store,
/// so one instance can be shared across any number of tasks and several
/// processes can enforce the same quota through the same store.
pub struct RateLimiter {
    /// Source of truth for every window counter
    store: Arc<dyn WindowStore>,
    /// Bounds enforced by this limiter
    policy: RateLimitPolicy,
}

impl RateLimiter {
    /// Create a limiter enforcing `policy` against `store`.
    ///
    /// Strict enforcement needs an atomic increment-or-create primitive; a
    /// store without one is refused.
    pub fn new(store: Arc<dyn WindowStore>, policy: RateLimitPolicy) -> Result<Self> {
        if policy.enforcement() == EnforcementMode::Strict && !store.supports_atomic_increment() {
            return Err(TollgateError::InvalidConfiguration(
                "strict enforcement requires a store with atomic increment-or-create".to_string(),
            ));
        }

        Ok(Self { store, policy })
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Decide whether a request from `identity` is admitted.
    ///
    /// Admitted requests are recorded in the store. Rejected requests leave
    /// the counter and its expiry untouched in best-effort mode.
    pub async fn decide(&self, identity: &str) -> Result<RateDecision> {
        let key = RateKey::new(self.policy.key_prefix(), identity);

        trace!(
            key = %key,
            enforcement = ?self.policy.enforcement(),
            "Checking rate limit"
        );

        let decision = match self.policy.enforcement() {
            EnforcementMode::BestEffort => self.check_then_act(&key).await?,
            EnforcementMode::Strict => self.increment_or_create(&key).await?,
        };

        if !decision.admitted {
            debug!(
                key = %key,
                limit = decision.limit,
                reset_seconds = decision.reset_seconds,
                "Rate limit exceeded"
            );
        }

        Ok(decision)
    }

    /// Report the quota for `identity` without recording a request.
    ///
    /// `remaining` is what a subsequent request would find available, and
    /// `admitted` tells whether that request would currently get through.
    pub async fn peek(&self, identity: &str) -> Result<RateDecision> {
        let key = RateKey::new(self.policy.key_prefix(), identity);
        let limit = self.policy.limit();

        match self.with_timeout(self.store.get(key.as_str())).await? {
            None => Ok(RateDecision::admitted(limit, limit, self.policy.window_secs())),
            Some(count) => {
                let remaining = limit.saturating_sub(count);
                let reset_seconds = self.reset_seconds(&key).await?;
                Ok(RateDecision {
                    admitted: remaining > 0,
                    limit,
                    remaining,
                    reset_seconds,
                })
            }
        }
    }

    /// Two-call sequence: read the count, then create or increment.
    async fn check_then_act(&self, key: &RateKey) -> Result<RateDecision> {
        let limit = self.policy.limit();

        let count = match self.with_timeout(self.store.get(key.as_str())).await? {
            None => return self.open_window(key).await,
            Some(count) => count,
        };

        // The request that brought the count to `limit` was the last one admitted.
        if count >= limit {
            let reset_seconds = self.reset_seconds(key).await?;
            return Ok(RateDecision::rejected(limit, reset_seconds));
        }

        match self.with_timeout(self.store.increment(key.as_str())).await? {
            Some(_) => {
                let reset_seconds = self.reset_seconds(key).await?;
                Ok(RateDecision::admitted(limit, limit - count - 1, reset_seconds))
            }
            None => {
                trace!(key = %key, "Counter expired between read and increment");
                self.open_window(key).await
            }
        }
    }

    /// Single atomic store call per request.
    async fn increment_or_create(&self, key: &RateKey) -> Result<RateDecision> {
        let limit = self.policy.limit();
        let window_secs = self.policy.window_secs();

        let snapshot = self
            .with_timeout(self.store.increment_or_create(key.as_str(), window_secs))
            .await?;

        if snapshot.count == 1 {
            debug!(key = %key, limit = limit, window_secs = window_secs, "Opened new rate limit window");
        }

        let reset_seconds = self.clamp_reset(snapshot.ttl_secs);
        if snapshot.count > limit {
            Ok(RateDecision::rejected(limit, reset_seconds))
        } else {
            Ok(RateDecision::admitted(limit, limit - snapshot.count, reset_seconds))
        }
    }

    /// Start a fresh window holding this request.
    async fn open_window(&self, key: &RateKey) -> Result<RateDecision> {
        let limit = self.policy.limit();
        let window_secs = self.policy.window_secs();

        debug!(key = %key, limit = limit, window_secs = window_secs, "Opened new rate limit window");

        self.with_timeout(self.store.set_with_ttl(key.as_str(), 1, window_secs))
            .await?;

        Ok(RateDecision::admitted(limit, limit - 1, window_secs))
    }

    async fn reset_seconds(&self, key: &RateKey) -> Result<u64> {
        let ttl = self.with_timeout(self.store.ttl(key.as_str())).await?;
        Ok(self.clamp_reset(ttl))
    }

    /// Missing expiry falls back to a full window; a live key reports at least one second.
    fn clamp_reset(&self, ttl: Option<u64>) -> u64 {
        let window_secs = self.policy.window_secs();
        match ttl {
            Some(secs) => secs.clamp(1, window_secs),
            None => window_secs,
        }
    }

    async fn with_timeout<T, F>(&self, op: F) -> std::result::Result<T, StoreError>
    where
        F: Future<Output = std::result::Result<T, StoreError>>,
    {
        let timeout = self.policy.store_timeout();
        match tokio::time::timeout(timeout, op).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "Window store call timed out");
                Err(StoreError::Timeout(timeout))
            }
        }
    }
}
