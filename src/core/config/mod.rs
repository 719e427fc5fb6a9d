//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies environment overrides (`CODEBUDDY_WORK_DIR`, `PORT`,
//! `DATABASE_URL`, OAuth settings) and secrets (`LLM_API_KEY`, `JWT_SECRET`).
//!
//! # Module layout
//!
//! - **types** — Public configuration structs consumed by subsystems.
//! - **raw** — Raw TOML deserialization types. These mirror the file shape
//!   and use serde defaults; kept private.
//! - **load** — Loading logic: `merge_toml`, `load_raw_merged`, `load`,
//!   `load_from`, `expand_home`.

mod load;
mod raw;
mod types;

pub use load::{Overrides, expand_home, load, load_from};
pub use types::*;

impl Config {
    /// Safe `Config` for tests — dummy LLM, no API keys, no external calls.
    pub fn test_default(work_dir: &std::path::Path) -> Self {
        Self {
            name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            log_file: None,
            http: HttpConfig {
                bind: raw::default_http_bind(),
                body_limit_bytes: 1024 * 1024,
                static_dir: None,
            },
            database: DatabaseConfig { path: "test.db".into() },
            llm: LlmConfig {
                provider: "dummy".into(),
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
                groq: OpenAiConfig {
                    api_base_url: "http://localhost:0/openai/v1/chat/completions".into(),
                    model: "test-model".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            auth: AuthConfig {
                cookie_name: raw::default_cookie_name(),
                session_ttl_days: raw::default_session_ttl_days(),
                oauth_portal_url: "http://localhost:0/portal".into(),
                oauth_server_url: "http://localhost:0/oauth".into(),
                app_id: "test-app".into(),
                owner_open_id: Some("owner-open-id".into()),
            },
            llm_api_key: None,
            jwt_secret: Some("test-secret".into()),
        }
    }
}
