//! HTTP server implementation.

use std::net::SocketAddr;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::{handlers, middleware, AppState};
use crate::error::{Result, TollgateError};

/// Build the application router.
///
/// `/api/protected` is metered. `/api/status` and unmatched paths only
/// report the caller's quota.
pub fn router(state: AppState) -> Router {
    let metered = Router::new()
        .route("/api/protected", get(handlers::protected))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::enforce_rate_limit,
        ));

    let open = Router::new()
        .route("/api/status", get(handlers::status))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::attach_quota_view,
        ));

    let unmatched = Router::new()
        .fallback(handlers::not_found)
        .layer(from_fn_with_state(state, middleware::attach_quota_view));

    metered.merge(open).merge(unmatched)
}

/// HTTP server for the rate limited API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared handler state
    state: AppState,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;

        info!(
            addr = %self.addr,
            limit = self.state.limiter.policy().limit(),
            window_secs = self.state.limiter.policy().window_secs(),
            "Starting HTTP server"
        );

        axum::serve(
            listener,
            router(self.state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TollgateError::Io(e)
        })
    }
}
