//! blocksmith - IP reputation feed aggregator and nftables blocklist compiler

use clap::Parser;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::FmtSubscriber;

use blocksmith::cli::{Cli, Commands};
use blocksmith::config::Config;
use blocksmith::error::{exit_code, exit_code_for};

fn log_level(cli: &Cli) -> Level {
    if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    }
}

fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = log_level(&cli);

    if let Commands::Version = cli.command {
        println!("blocksmith {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    // The log file location comes from the config, so loading it logs to
    // stdout only.
    let stdout_only = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_ansi(false)
        .finish();
    let config = tracing::subscriber::with_default(stdout_only, || {
        Config::load_or_default(&cli.config)
    });
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(exit_code_for(&e));
        }
    };

    // `-q` and `-v` only change what reaches the terminal; the run log
    // always keeps per-feed warnings and the summary line.
    let file_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let (file_layer, log_file_error) = match open_log_file(&config.log_file) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Arc::new(file))
                    .with_filter(LevelFilter::from_level(file_level)),
            ),
            None,
        ),
        Err(e) => (None, Some(e)),
    };
    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stdout)
        .with_filter(LevelFilter::from_level(level));
    let subscriber = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: failed to initialise logging: {}", e);
        return ExitCode::from(exit_code::ENVIRONMENT);
    }
    if let Some(e) = log_file_error {
        warn!("Cannot append to log file {:?}: {}", config.log_file, e);
    }

    let result = match cli.command {
        Commands::Update { dry_run } => blocksmith::commands::update::run(&config, dry_run).await,
        Commands::Version => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(exit_code_for(&e))
        }
    }
}
