//! Configuration loading with env-var overrides.
//!
//! Reads TOML files, supports `[meta] base = "..."` inheritance chains,
//! and applies the overrides collected in [`Overrides`].

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;

use super::raw::{self, RawConfig, RawEndpoint};
use super::types::*;

/// Values that take precedence over the TOML file.
///
/// Production code fills this from the environment with [`Overrides::from_env`];
/// tests construct it directly instead of mutating process env vars.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    /// Replaces the port of `http.bind`.
    pub port: Option<String>,
    pub database_url: Option<String>,
    pub oauth_server_url: Option<String>,
    pub oauth_portal_url: Option<String>,
    pub app_id: Option<String>,
    pub owner_open_id: Option<String>,
    pub llm_api_key: Option<String>,
    pub jwt_secret: Option<String>,
}

impl Overrides {
    pub fn from_env() -> Self {
        let var = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            work_dir: var("CODEBUDDY_WORK_DIR"),
            log_level: var("CODEBUDDY_LOG_LEVEL"),
            port: var("PORT"),
            database_url: var("DATABASE_URL"),
            oauth_server_url: var("OAUTH_SERVER_URL"),
            oauth_portal_url: var("OAUTH_PORTAL_URL"),
            app_id: var("APP_ID"),
            owner_open_id: var("OWNER_OPEN_ID"),
            llm_api_key: var("LLM_API_KEY").or_else(|| var("GROQ_API_KEY")),
            jwt_secret: var("JWT_SECRET"),
        }
    }
}

/// Deep-merge two TOML values.
/// Tables are merged recursively — the overlay only needs to specify keys that
/// differ from the base. For every other type (string, integer, array, …)
/// the overlay value replaces the base value wholesale.
fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_tbl), toml::Value::Table(overlay_tbl)) => {
            for (key, ov_val) in overlay_tbl {
                let merged = match base_tbl.remove(&key) {
                    Some(base_val) => merge_toml(base_val, ov_val),
                    None => ov_val,
                };
                base_tbl.insert(key, merged);
            }
            toml::Value::Table(base_tbl)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file, follow any `[meta] base = "..."` chain, and return the
/// fully merged `toml::Value`. `visited` carries canonicalized paths already
/// seen in this chain so circular references are caught early.
fn load_raw_merged(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<toml::Value, AppError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !visited.insert(canonical) {
        return Err(AppError::Config(format!(
            "circular base reference detected at: {}",
            path.display()
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let overlay_val: toml::Value = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    if let Some(base_str) = overlay_val
        .get("meta")
        .and_then(|m| m.get("base"))
        .and_then(|b| b.as_str())
    {
        let base_path = if Path::new(base_str).is_absolute() {
            PathBuf::from(base_str)
        } else {
            path.parent().unwrap_or(Path::new(".")).join(base_str)
        };
        let base_val = load_raw_merged(&base_path, visited)?;
        Ok(merge_toml(base_val, overlay_val))
    } else {
        Ok(overlay_val)
    }
}

/// Load config from the given path, or `config/default.toml`, then apply env-var overrides.
/// If no path is given and `config/default.toml` does not exist, built-in defaults are used.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let overrides = Overrides::from_env();

    if let Some(path) = config_path {
        return load_from(Path::new(path), &overrides);
    }

    let default_path = Path::new("config/default.toml");
    if default_path.exists() {
        load_from(default_path, &overrides)
    } else {
        resolve(RawConfig::default(), &overrides)
    }
}

/// Internal loader — accepts an explicit path and overrides.
/// Follows `[meta] base = "..."` inheritance chains before resolving.
pub fn load_from(path: &Path, overrides: &Overrides) -> Result<Config, AppError> {
    let merged_val = load_raw_merged(path, &mut HashSet::new())?;

    let parsed: RawConfig = Deserialize::deserialize(merged_val).map_err(|e: toml::de::Error| {
        AppError::Config(format!("config error in {}: {e}", path.display()))
    })?;

    resolve(parsed, overrides)
}

fn resolve(parsed: RawConfig, o: &Overrides) -> Result<Config, AppError> {
    let s = parsed.server;

    let work_dir = expand_home(o.work_dir.as_deref().unwrap_or(&s.work_dir));
    let log_level = o.log_level.clone().unwrap_or(s.log_level);
    // Plain level names are checked here; full filter directives are left to the logger.
    if !log_level.contains(['=', ',']) {
        crate::logger::parse_level(&log_level).map_err(|e| AppError::Config(e.to_string()))?;
    }
    let log_file = s.log_file.map(|f| expand_home(&f));

    let bind = match &o.port {
        Some(port) => replace_port(&parsed.http.bind, port)?,
        None => parsed.http.bind,
    };

    let database_path = match &o.database_url {
        Some(url) => PathBuf::from(strip_sqlite_scheme(url)),
        None => expand_home(&parsed.database.path),
    };

    let provider = parsed.llm.provider;
    if !matches!(provider.as_str(), "dummy" | "openai" | "openai-compatible" | "groq") {
        return Err(AppError::Config(format!("unknown llm provider: {provider}")));
    }

    let a = parsed.auth;

    Ok(Config {
        name: s.name,
        work_dir,
        log_level,
        log_file,
        http: HttpConfig {
            bind,
            body_limit_bytes: parsed.http.body_limit_bytes.max(1024),
            static_dir: parsed.http.static_dir.map(|d| expand_home(&d)),
        },
        database: DatabaseConfig { path: database_path },
        llm: LlmConfig {
            provider,
            openai: endpoint(parsed.llm.openai, raw::OPENAI_API_BASE_URL, raw::OPENAI_MODEL),
            groq: endpoint(parsed.llm.groq, raw::GROQ_API_BASE_URL, raw::GROQ_MODEL),
        },
        auth: AuthConfig {
            cookie_name: a.cookie_name,
            session_ttl_days: a.session_ttl_days.max(1),
            oauth_portal_url: o.oauth_portal_url.clone().unwrap_or(a.oauth_portal_url),
            oauth_server_url: o.oauth_server_url.clone().unwrap_or(a.oauth_server_url),
            app_id: o.app_id.clone().unwrap_or(a.app_id),
            owner_open_id: o.owner_open_id.clone().or(a.owner_open_id),
        },
        llm_api_key: o.llm_api_key.clone(),
        jwt_secret: o.jwt_secret.clone(),
    })
}

fn endpoint(raw: RawEndpoint, base_url: &str, model: &str) -> OpenAiConfig {
    OpenAiConfig {
        api_base_url: raw.api_base_url.unwrap_or_else(|| base_url.to_string()),
        model: raw.model.unwrap_or_else(|| model.to_string()),
        temperature: raw.temperature.unwrap_or(raw::DEFAULT_TEMPERATURE),
        timeout_seconds: raw.timeout_seconds.unwrap_or(raw::DEFAULT_TIMEOUT_SECONDS),
    }
}

/// Swap the port of a `host:port` bind address.
fn replace_port(bind: &str, port: &str) -> Result<String, AppError> {
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| AppError::Config(format!("invalid PORT value: '{port}'")))?;
    let host = bind.rsplit_once(':').map(|(h, _)| h).unwrap_or(bind);
    Ok(format!("{host}:{port}"))
}

/// `DATABASE_URL` may carry a `sqlite:` / `sqlite://` scheme.
fn strip_sqlite_scheme(url: &str) -> &str {
    url.strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url)
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
