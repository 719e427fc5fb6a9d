//! UI route handlers for the axum channel.
//!
//! Without a configured bundle the root serves a small status page. With
//! `http.static_dir` set, files are served from it and unknown paths fall
//! back to `index.html` so client-side routing works. File reads run on
//! the blocking pool.

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::State,
    http::{Response, StatusCode, header},
    response::{Html, IntoResponse},
};
use tracing::{debug, warn};

use super::AxumState;

// ── Root page ─────────────────────────────────────────────────────────────────

const ROOT_INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>CodeBuddy</title>
  <style>
    *, *::before, *::after { box-sizing: border-box; margin: 0; padding: 0; }
    body {
      font-family: system-ui, -apple-system, sans-serif;
      background: #0f0f0f; color: #e0e0e0;
      display: flex; align-items: center; justify-content: center;
      height: 100vh;
    }
    .card {
      text-align: center; padding: 2rem 3rem;
      border: 1px solid #333; border-radius: 12px;
      background: #1a1a1a;
    }
    h1 { font-size: 1.5rem; margin-bottom: 0.5rem; }
    p  { font-size: 0.9rem; color: #888; margin-bottom: 1rem; }
    a {
      display: inline-block; padding: 0.5rem 1.5rem;
      border-radius: 8px; background: #2a2a3a; color: #c0c0e0;
      text-decoration: none; font-size: 0.9rem;
      transition: background 0.15s;
    }
    a:hover { background: #3a3a5a; }
  </style>
</head>
<body>
  <div class="card">
    <h1>CodeBuddy</h1>
    <p>API server is running.</p>
    <a href="/api/health">Health &rarr;</a>
  </div>
</body>
</html>
"#;

/// A file read from the bundle, ready to send.
struct StaticFile {
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
}

impl IntoResponse for StaticFile {
    fn into_response(self) -> axum::response::Response {
        Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, self.content_type)
            .body(Body::from(self.body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET / — bundle `index.html`, or the built-in status page.
pub(super) async fn root(State(state): State<AxumState>) -> axum::response::Response {
    match state.static_dir {
        Some(dir) => serve_blocking(dir.to_path_buf(), "/".to_string()).await,
        None => Html(ROOT_INDEX_HTML).into_response(),
    }
}

/// GET /*path — static bundle with SPA fallback, or 404.
pub(super) async fn serve_path(
    State(state): State<AxumState>,
    uri: axum::http::Uri,
) -> axum::response::Response {
    let path = uri.path().to_string();

    // Reject paths that try to escape the static root.
    if path.contains("..") {
        return (StatusCode::BAD_REQUEST, "bad request\n").into_response();
    }

    match state.static_dir {
        Some(dir) => serve_blocking(dir.to_path_buf(), path).await,
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve_blocking(root: PathBuf, path: String) -> axum::response::Response {
    match tokio::task::spawn_blocking(move || serve_static(&root, &path)).await {
        Ok(file) => file.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

// ── Static file serving ───────────────────────────────────────────────────────

/// Serve a file from `root` for the given request `path`.
///
/// - `/` maps to `index.html`.
/// - If the exact file isn't found, falls back to `index.html` (SPA routing).
fn serve_static(root: &Path, path: &str) -> StaticFile {
    let relative = if path == "/" { "index.html" } else { path.trim_start_matches('/') };
    let file_path = root.join(relative);

    if file_path.is_file() {
        return read_static_file(&file_path);
    }

    let index = root.join("index.html");
    if index.is_file() {
        debug!(path, "SPA fallback to index.html");
        return read_static_file(&index);
    }

    StaticFile {
        status: StatusCode::NOT_FOUND,
        content_type: "text/plain; charset=utf-8",
        body: b"not found\n".to_vec(),
    }
}

fn read_static_file(path: &Path) -> StaticFile {
    match std::fs::read(path) {
        Ok(body) => StaticFile { status: StatusCode::OK, content_type: mime_from_extension(path), body },
        Err(e) => {
            warn!(path = %path.display(), "failed to read static file: {e}");
            StaticFile {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                content_type: "text/plain; charset=utf-8",
                body: b"internal server error\n".to_vec(),
            }
        }
    }
}

fn mime_from_extension(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") | Some("map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("wasm") => "application/wasm",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
