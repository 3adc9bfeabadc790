//! Circulation command line tool

mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use circulation::{
    config::{AppConfig, LoggingConfig},
    error::{AppError, ErrorCode},
    Library,
};

fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = cli::Cli::parse();

    match run(args) {
        Ok(()) => ExitCode::from(ErrorCode::Success as u8),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e
                .downcast_ref::<AppError>()
                .map(AppError::code)
                .unwrap_or(ErrorCode::Failure);
            ExitCode::from(code as u8)
        }
    }
}

fn run(args: cli::Cli) -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    let _guard = init_tracing(&config.logging);

    tracing::debug!("Starting circulation v{}", env!("CARGO_PKG_VERSION"));

    let library = Library::open(config)?;

    match library.services.backup.auto_backup() {
        Ok(Some(path)) => tracing::info!("Daily backup written to {}", path.display()),
        Ok(None) => {}
        Err(e) => tracing::warn!("Daily backup failed: {}", e),
    }

    args.run(&library)
}

/// Install the global subscriber. The returned guard flushes the log file on drop.
fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("circulation={}", config.level).into());

    let console = match config.format.as_str() {
        "json" => fmt::layer().json().with_writer(std::io::stderr).boxed(),
        _ => fmt::layer().with_writer(std::io::stderr).boxed(),
    };

    let (file, guard) = match &config.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "circulation.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    guard
}
