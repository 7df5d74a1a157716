use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

/// Rate limited endpoint.
pub(crate) async fn protected() -> Json<Value> {
    Json(json!({ "message": "This is a protected API endpoint!" }))
}

/// Open endpoint; never counted against the quota.
pub(crate) async fn status() -> Json<Value> {
    Json(json!({ "message": "API is running smoothly!" }))
}

/// Fallback for unmatched paths.
pub(crate) async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not Found" })))
}
