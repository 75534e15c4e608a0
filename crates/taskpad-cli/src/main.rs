//! taskpad - a command-line client for a personal task API.
//!
//! Run a single command (`taskpad list`, `taskpad add ...`) or start the
//! interactive shell by running `taskpad` without arguments. The shell keeps
//! the session under watch and warns before the login expires.

mod app;
mod cli;
mod commands;
mod shell;

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use taskpad_core::Config;

use app::App;
use cli::{Cli, Command};

/// Directory for daily log files; logging goes to stderr only when unset
const ENV_LOG_DIR: &str = "TASKPAD_LOG_DIR";

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "taskpad.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();
    info!("taskpad starting");

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let mut app = App::new(config)?;

    let result = match cli.command {
        None | Some(Command::Shell) => shell::run(&mut app).await,
        Some(command) => commands::execute(&mut app, command).await,
    };

    for notice in app.drain_notices() {
        eprintln!("{}", notice);
    }
    result
}
