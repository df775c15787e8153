//! freshmarket - command-line client for the produce marketplace.
//!
//! Signs in against the marketplace REST API, keeps the token pair in the
//! configured token store, and exposes listings, farmer product management,
//! order tracking and a local cart as subcommands.

mod commands;
mod output;

use std::io;

use anyhow::Result;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use freshmarket_core::{Config, SessionManager};

/// Log file prefix inside the configured log directory
const LOG_FILE_PREFIX: &str = "freshmarket.log";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, or to a daily rolling file when `log_dir` is set.
/// The returned guard must be held until exit so buffered lines are flushed.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match config.log_dir {
        Some(ref dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config ({}), using defaults", e);
            Config::default()
        }
    };

    let _log_guard = init_tracing(&config);
    for ignored in config.apply_env_overrides() {
        warn!(key = ignored.key, value = %ignored.value, "Ignoring unrecognized override");
    }
    info!(api = %config.api_base_url, "freshmarket starting");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        commands::print_usage();
        return Ok(());
    };
    if matches!(command.as_str(), "help" | "--help" | "-h") {
        commands::print_usage();
        return Ok(());
    }

    let mut session = SessionManager::from_config(&config)?;
    let mut events = session.subscribe();
    session.initialize().await;

    let mut app = commands::App::new(config, session);
    let result = app.run(command, rest).await;

    commands::report_session_events(&mut events);
    if let Err(ref e) = result {
        warn!(error = %e, command = %command, "Command failed");
    }
    result
}
