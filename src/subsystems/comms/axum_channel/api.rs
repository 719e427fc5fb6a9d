//! Plain JSON `/api/*` handlers outside the RPC endpoint.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use super::AxumState;

/// Build a JSON error response body.
pub(super) fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

/// GET /api/health — `status` is `degraded` when the LLM endpoint is
/// unreachable.
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    let comms = &state.comms;
    let status = match comms.assistant().llm().ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "llm ping failed");
            "degraded"
        }
    };
    Json(json!({
        "status": status,
        "provider": comms.provider(),
        "model": comms.model(),
    }))
    .into_response()
}

/// Any other `/api/*` path.
pub(super) async fn not_found(uri: axum::http::Uri) -> Response {
    (StatusCode::NOT_FOUND, json_error("not_found", format!("no route for {}", uri.path())))
        .into_response()
}
