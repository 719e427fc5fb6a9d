//! CodeBuddy — AI coding workspace server entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Open the store
//!   6. Build the LLM provider
//!   7. Spawn Ctrl-C → shutdown signal watcher
//!   8. Serve HTTP until shutdown
//!
//! With `-i` the binary skips steps 5 and 8 and runs the console chat instead.

use std::sync::Arc;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;

use codebuddy::config::{self, Config};
use codebuddy::error::AppError;
use codebuddy::llm::providers;
use codebuddy::logger;
use codebuddy::subsystems::assistant::Assistant;
use codebuddy::subsystems::comms::{self, CommsState};
use codebuddy::subsystems::store::Store;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let config = config::load(args.config_path.as_deref())?;

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    let force_cli_level = args.log_level.is_some();

    logger::init(effective_log_level, force_cli_level, config.log_file.as_deref())?;

    info!(
        name = %config.name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let llm = providers::build(&config.llm, config.llm_api_key.clone())
        .map_err(|e| AppError::Llm(e.to_string()))?;
    info!(provider = %config.llm.provider, model = %config.llm.active_model(), "llm provider ready");

    // Shared shutdown token — Ctrl-C cancels it, the server or console watches it.
    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received — initiating shutdown");
            ctrlc_token.cancel();
        }
    });

    if args.interactive {
        let stdin = BufReader::new(tokio::io::stdin());
        return comms::pty::run_pty(&llm, stdin, tokio::io::stdout(), shutdown).await;
    }

    std::fs::create_dir_all(&config.work_dir)?;

    let db_path = config.database_path();
    let store = Store::open(&db_path, config.auth.owner_open_id.clone())?;
    info!(path = %db_path.display(), "store ready");

    let state = Arc::new(CommsState::new(&config, Assistant::new(llm, store))?);

    print_startup_summary(&config);

    comms::start(&config, state, shutdown).await?;

    println!("\nBye :) ...");
    Ok(())
}

fn print_startup_summary(config: &Config) {
    let fit = |s: String| format!("{:<59}", s);

    let static_line = match &config.http.static_dir {
        Some(dir) => format!("📦 bundle: {}", dir.display()),
        None => "📦 bundle: none (status page at /)".to_string(),
    };

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ 🤖 CodeBuddy                                                 ║");
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║   {}║", fit(format!("🧾 name: {}", config.name)));
    println!("║   {}║", fit(format!("🧠 pid: {}", std::process::id())));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║   {}║", fit(format!("🌐 http: {}", config.http.bind)));
    println!("║   {}║", fit(static_line));
    println!("║   {}║", fit(format!("🗄️  db: {}", config.database_path().display())));
    println!(
        "║   {}║",
        fit(format!("🧠 llm: {} ({})", config.llm.provider, config.llm.active_model()))
    );
    println!("╚══════════════════════════════════════════════════════════════╝");
}

struct CliArgs {
    log_level: Option<&'static str>,
    config_path: Option<String>,
    interactive: bool,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut config_path = None;
    let mut interactive = false;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: codebuddy [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -f, --config <PATH>        Path to configuration file (default: config/default.toml)");
                println!("  -i, --interactive          Chat with the assistant in this terminal instead of serving HTTP");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: -f/--config requires a path argument");
                    std::process::exit(1);
                }
            }
            "-i" | "--interactive" => interactive = true,
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    // Each -v raises verbosity one tier from the config default:
    //   -v      → warn
    //   -vv     → info
    //   -vvv    → debug  (request routing, store calls)
    //   -vvvv+  → trace  (full LLM payload dumps)
    let log_level = match verbosity {
        0 => None,
        1 => Some("warn"),
        2 => Some("info"),
        3 => Some("debug"),
        _ => Some("trace"),
    };

    CliArgs { log_level, config_path, interactive }
}
