//! Axum-based HTTP channel — the RPC endpoint, OAuth routes, health, and
//! the browser bundle.
//!
//! ## URL layout
//!
//! ```text
//! GET  /api/trpc/{procedure}?input=<json>   queries, subscriptions (SSE)
//! POST /api/trpc/{procedure}                mutations
//! GET  /api/oauth/login                     → portal redirect
//! GET  /api/oauth/callback?code&state       → session cookie, redirect /
//! GET  /api/health
//! GET  /favicon.ico                         → 204
//! GET  /                                    → status page or index.html
//! GET  /*path                               → static bundle (SPA fallback)
//! ```

mod api;
mod oauth;
mod rpc;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;

use super::state::CommsState;

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone — all fields are reference-counted.
#[derive(Clone)]
pub(crate) struct AxumState {
    pub comms: Arc<CommsState>,
    /// Pre-built browser bundle, when configured.
    pub static_dir: Option<Arc<PathBuf>>,
}

// ── Server loop ───────────────────────────────────────────────────────────────

pub(super) async fn run_axum(
    bind_addr: String,
    comms: Arc<CommsState>,
    static_dir: Option<PathBuf>,
    body_limit_bytes: usize,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(comms, static_dir, body_limit_bytes);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Http(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "http channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Http(format!("server error: {e}")))?;

    info!("http channel shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the full application router. Public so integration tests can drive
/// it without binding a socket.
pub fn build_router(
    comms: Arc<CommsState>,
    static_dir: Option<PathBuf>,
    body_limit_bytes: usize,
) -> Router {
    let state = AxumState { comms, static_dir: static_dir.map(Arc::new) };

    Router::new()
        // API routes
        .route("/api/trpc/{procedure}", get(rpc::get_procedure).post(rpc::post_procedure))
        .route("/api/oauth/login",      get(oauth::login))
        .route("/api/oauth/callback",   get(oauth::callback))
        .route("/api/health",           get(api::health))
        .route("/api/{*path}",          get(api::not_found).post(api::not_found))
        // UI routes
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .route("/",            get(ui::root))
        .route("/{*path}",     get(ui::serve_path))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .with_state(state)
}
