//! Public configuration types.
//!
//! These are the resolved, ready-to-use structs that subsystems consume.
//! Raw TOML deserialization types live in `raw.rs`.

use std::path::PathBuf;

// ── HTTP ─────────────────────────────────────────────────────────────────────

/// Axum listener configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Socket address to bind the listener to.
    pub bind: String,
    /// Maximum accepted request body size in bytes.
    pub body_limit_bytes: usize,
    /// Pre-built browser bundle. When set, non-API paths are served from it
    /// with an `index.html` fallback.
    pub static_dir: Option<PathBuf>,
}

// ── Database ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite database file. Relative paths are resolved against `work_dir`.
    pub path: PathBuf,
}

// ── LLM ──────────────────────────────────────────────────────────────────────

/// Settings for one OpenAI-compatible endpoint.
/// Populated from `[llm.openai]` or `[llm.groq]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Model name passed in the request body.
    pub model: String,
    /// Default sampling temperature; procedures may override it per request.
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"`, `"openai"`, `"groq"`).
    /// Maps to `default` in `[llm]` TOML.
    pub provider: String,
    pub openai: OpenAiConfig,
    pub groq: OpenAiConfig,
}

impl LlmConfig {
    /// Model name of the active provider, for logs and health output.
    pub fn active_model(&self) -> &str {
        match self.provider.as_str() {
            "groq" => &self.groq.model,
            "dummy" => "dummy",
            _ => &self.openai.model,
        }
    }
}

// ── Auth ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Name of the session cookie.
    pub cookie_name: String,
    /// Session lifetime, also used as the cookie `Max-Age`.
    pub session_ttl_days: u32,
    /// Browser-facing login portal (`<portal>/app-auth`).
    pub oauth_portal_url: String,
    /// Server-to-server OAuth API base URL.
    pub oauth_server_url: String,
    pub app_id: String,
    /// openId that is granted the `admin` role on first sign-in.
    pub owner_open_id: Option<String>,
}

// ── Top-level ────────────────────────────────────────────────────────────────

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub work_dir: PathBuf,
    pub log_level: String,
    /// When set, logs are appended to this file instead of stderr.
    pub log_file: Option<PathBuf>,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub auth: AuthConfig,
    /// API key for the active LLM provider — from `LLM_API_KEY` or
    /// `GROQ_API_KEY` env, never TOML.
    pub llm_api_key: Option<String>,
    /// HS256 signing secret for session tokens — from `JWT_SECRET` env.
    pub jwt_secret: Option<String>,
}

impl Config {
    /// Absolute path of the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        if self.database.path.is_absolute() {
            self.database.path.clone()
        } else {
            self.work_dir.join(&self.database.path)
        }
    }
}
