//! Rate limiting decisions over the shared window store.

mod decision;
mod key;
mod limiter;
mod policy;

pub use decision::RateDecision;
pub use key::{RateKey, DEFAULT_KEY_PREFIX};
pub use limiter::RateLimiter;
pub use policy::{
    EnforcementMode, FailurePolicy, RateLimitPolicy, DEFAULT_LIMIT, DEFAULT_STORE_TIMEOUT,
    DEFAULT_WINDOW_SECS, MAX_WINDOW_SECS,
};
