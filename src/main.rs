use clap::Parser;
use flexi_logger::{Age, Cleanup, Criterion, FileSpec, LogSpecBuilder, Logger, Naming};
use log::LevelFilter;
use std::{path::PathBuf, process::ExitCode, str::FromStr};

mod app;
mod bar;
mod config;
mod hooks;
mod markup;
mod outputs;
mod panel;
mod process;
mod screen;
mod stop;
mod widgets;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path of the configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the log level of the configuration file.
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = config::config_path(args.config.as_deref());
    let config = config::read_config(&config_path);

    let level = args
        .log_level
        .as_deref()
        .or(config.as_ref().ok().map(|config| config.log_level.as_str()))
        .and_then(|level| LevelFilter::from_str(level).ok())
        .unwrap_or(LevelFilter::Warn);

    let logger = Logger::with(
        LogSpecBuilder::new()
            .module(
                "barkeep",
                if cfg!(debug_assertions) {
                    LevelFilter::Debug.max(level)
                } else {
                    level
                },
            )
            .build(),
    )
    .log_to_file(FileSpec::default().directory("/tmp/barkeep"))
    .duplicate_to_stderr(flexi_logger::Duplicate::All)
    .rotate(
        Criterion::Age(Age::Day),
        Naming::Timestamps,
        Cleanup::KeepLogFiles(7),
    )
    .start();
    let _logger = match logger {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to start the logger: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("{:#}", anyhow::Error::from(e));
            return ExitCode::FAILURE;
        }
    };

    let panel = match app::build_panel(&config) {
        Ok(panel) => panel,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!("Starting barkeep with {} screens", panel.screens().len());
    match panel.start().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
