//! Rate limit middleware.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, info, instrument, warn, Span};

use super::AppState;
use crate::ratelimit::{FailurePolicy, RateDecision};

pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Identity used when the peer address is not available.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// The peer IP address of the connection, used as the client identity.
fn client_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

/// Admit or reject the request against the client's quota.
///
/// Admitted responses carry the quota headers. Rejections become a 429
/// with `Retry-After`. When the store is unavailable the configured
/// failure policy decides between passing the request through and a 503.
#[instrument(skip_all, fields(identity = tracing::field::Empty))]
pub(crate) async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(&request);
    Span::current().record("identity", identity.as_str());

    match state.limiter.decide(&identity).await {
        Ok(decision) if decision.admitted => {
            let mut response = next.run(request).await;
            apply_quota_headers(response.headers_mut(), &decision);
            response
        }
        Ok(decision) => {
            info!(
                retry_after = decision.retry_after(),
                "Request rejected by rate limit"
            );
            too_many_requests(&decision)
        }
        Err(err) => match state.failure_policy {
            FailurePolicy::FailOpen => {
                warn!(error = %err, "Rate limiter unavailable, failing open");
                next.run(request).await
            }
            FailurePolicy::FailClosed => {
                error!(error = %err, "Rate limiter unavailable, failing closed");
                service_unavailable()
            }
        },
    }
}

/// Attach the client's current quota to an unmetered route without
/// recording the request.
pub(crate) async fn attach_quota_view(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let identity = client_identity(&request);
    let view = state.limiter.peek(&identity).await;

    let mut response = next.run(request).await;
    match view {
        Ok(decision) => apply_quota_headers(response.headers_mut(), &decision),
        Err(err) => warn!(error = %err, "Could not read quota for informational headers"),
    }
    response
}

fn apply_quota_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(decision.reset_seconds));
}

fn too_many_requests(decision: &RateDecision) -> Response {
    let body = Json(json!({ "detail": decision.rejection_message() }));
    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();

    let headers = response.headers_mut();
    apply_quota_headers(headers, decision);
    headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.retry_after()));
    response
}

fn service_unavailable() -> Response {
    let body = Json(json!({ "detail": "Rate limiter unavailable. Try again later." }));
    (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
}
