//! Comms subsystem — the HTTP channel browsers talk to, plus the console
//! chat started with `-i`.
//!
//! [`start`] binds the axum listener and serves until the shared
//! [`CancellationToken`] is cancelled. Handlers reach the rest of the
//! system only through [`CommsState`].

pub mod axum_channel;
pub mod pty;
mod state;

pub use state::{CommsState, is_secure_request, request_origin};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::AppError;

/// Serve the HTTP channel until `shutdown` fires.
pub async fn start(
    config: &Config,
    state: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    axum_channel::run_axum(
        config.http.bind.clone(),
        state,
        config.http.static_dir.clone(),
        config.http.body_limit_bytes,
        shutdown,
    )
    .await
}
