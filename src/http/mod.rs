//! HTTP boundary: routes, quota headers and rejection responses.

mod handlers;
mod middleware;
mod server;

pub use middleware::{
    HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, UNKNOWN_IDENTITY,
};
pub use server::{router, HttpServer};

use std::sync::Arc;

use crate::ratelimit::{FailurePolicy, RateLimiter};

/// State shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The rate limiter instance
    pub limiter: Arc<RateLimiter>,
    /// What to do when the window store is unavailable
    pub failure_policy: FailurePolicy,
}

impl AppState {
    pub fn new(limiter: Arc<RateLimiter>, failure_policy: FailurePolicy) -> Self {
        Self {
            limiter,
            failure_policy,
        }
    }
}
