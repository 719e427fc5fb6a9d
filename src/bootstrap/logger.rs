//! Logging initialisation via tracing-subscriber.
//!
//! Call [`init`] once at startup, after the config is resolved. The
//! filter comes from the CLI, `RUST_LOG` or `server.log_level`; HTTP, TLS
//! and SQLite internals are held at `warn` unless a directive names them.
//! Request spans (`rpc`) log their duration when they close.

use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Dependency targets that are chatty at `debug` and below.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "h2", "reqwest", "rustls", "rusqlite", "tower"];

/// Where the effective filter came from, for the startup log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterSource {
    Level,
    Env,
}

/// Initialise the global tracing subscriber.
///
/// `level` is a level name (`"error"` … `"trace"`) or an `EnvFilter`
/// directive list such as `"codebuddy=debug,info"`.
///
/// With `prefer_level`, `level` wins and `RUST_LOG` is only a fallback for
/// an invalid `level`; otherwise `RUST_LOG` wins when set and valid.
/// Output goes to stderr, or appends to `log_file` without ANSI colours.
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok().filter(|v| !v.trim().is_empty());
    let (filter, source) = resolve_filter(level, env.as_deref(), prefer_level)?;

    let writer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    AppError::Logger(format!("failed to open log file '{}': {e}", path.display()))
                })?;
            BoxMakeWriter::new(file)
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_span_events(FmtSpan::CLOSE)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))?;

    tracing::debug!(source = ?source, "logger initialised");
    Ok(())
}

fn resolve_filter(
    level: &str,
    env: Option<&str>,
    prefer_level: bool,
) -> Result<(EnvFilter, FilterSource), AppError> {
    let from_level = EnvFilter::try_new(with_quiet_targets(level));
    let from_env = env.map(|e| EnvFilter::try_new(with_quiet_targets(e)));

    match (prefer_level, from_level, from_env) {
        (true, Ok(f), _) => Ok((f, FilterSource::Level)),
        (true, Err(level_err), Some(Ok(f))) => {
            eprintln!("warning: invalid log level '{level}' ({level_err}); using RUST_LOG");
            Ok((f, FilterSource::Env))
        }
        (false, _, Some(Ok(f))) => Ok((f, FilterSource::Env)),
        (false, Ok(f), _) => Ok((f, FilterSource::Level)),
        (_, Err(e), _) => Err(AppError::Logger(format!("invalid log level '{level}': {e}"))),
    }
}

/// Append `<target>=warn` for every quiet target the directives leave unnamed.
fn with_quiet_targets(directives: &str) -> String {
    let named: Vec<&str> = directives
        .split(',')
        .filter_map(|d| d.split_once('=').map(|(target, _)| target.trim()))
        .collect();

    let mut out = directives.trim().to_string();
    for target in QUIET_TARGETS {
        if !named.iter().any(|n| n == target || n.starts_with(&format!("{target}::"))) {
            out.push_str(&format!(",{target}=warn"));
        }
    }
    out
}

/// Parse a plain level name into a [`LevelFilter`]. Config resolution uses
/// this to reject typos before the logger starts.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}
