//! Raw TOML deserialization types.
//!
//! These structs mirror the TOML file shape and use `serde` defaults.
//! The `load` module converts them into the public `types` structs.

use serde::Deserialize;

// ── Top-level ────────────────────────────────────────────────────────────────

/// Raw TOML shape — serde target before resolution.
#[derive(Deserialize, Default)]
pub(super) struct RawConfig {
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub http: RawHttp,
    #[serde(default)]
    pub database: RawDatabase,
    #[serde(default)]
    pub llm: RawLlm,
    #[serde(default)]
    pub auth: RawAuth,
}

#[derive(Deserialize)]
pub(super) struct RawServer {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_work_dir")]
    pub work_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            name: default_name(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

// ── HTTP ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawHttp {
    #[serde(default = "default_http_bind")]
    pub bind: String,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
    #[serde(default)]
    pub static_dir: Option<String>,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            body_limit_bytes: default_body_limit_bytes(),
            static_dir: None,
        }
    }
}

// ── Database ─────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawDatabase {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for RawDatabase {
    fn default() -> Self {
        Self { path: default_database_path() }
    }
}

// ── LLM ──────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub openai: RawEndpoint,
    #[serde(default)]
    pub groq: RawEndpoint,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            openai: RawEndpoint::default(),
            groq: RawEndpoint::default(),
        }
    }
}

/// One `[llm.<provider>]` table. Missing keys are filled per provider in
/// `load` so an overlay can set just `model`.
#[derive(Deserialize, Default)]
pub(super) struct RawEndpoint {
    pub api_base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

// ── Auth ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RawAuth {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: u32,
    #[serde(default)]
    pub oauth_portal_url: String,
    #[serde(default)]
    pub oauth_server_url: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub owner_open_id: Option<String>,
}

impl Default for RawAuth {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            session_ttl_days: default_session_ttl_days(),
            oauth_portal_url: String::new(),
            oauth_server_url: String::new(),
            app_id: String::new(),
            owner_open_id: None,
        }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_name() -> String {
    "codebuddy".to_string()
}

fn default_work_dir() -> String {
    "~/.codebuddy".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

pub(super) fn default_http_bind() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_body_limit_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_database_path() -> String {
    "codebuddy.db".to_string()
}

fn default_llm_provider() -> String {
    "groq".to_string()
}

pub(super) fn default_cookie_name() -> String {
    "app_session_id".to_string()
}

pub(super) fn default_session_ttl_days() -> u32 {
    365
}

pub(super) const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
pub(super) const OPENAI_MODEL: &str = "gpt-4o-mini";
pub(super) const GROQ_API_BASE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub(super) const GROQ_MODEL: &str = "openai/gpt-oss-120b";
pub(super) const DEFAULT_TEMPERATURE: f32 = 0.7;
pub(super) const DEFAULT_TIMEOUT_SECONDS: u64 = 120;
