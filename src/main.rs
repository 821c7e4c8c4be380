use anyhow::{Context, Result};
use clap::Parser;
use deflake::cli::{Cli, DEFAULT_CONFIG_PATH};
use deflake::config::{AppConfig, LoggingConfig, OutputFormat};
use deflake::detector::FlakinessDetector;
use deflake::ingest;
use deflake::report::{write_reports, ConsoleReport};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing subscriber
///
/// `--log-level` wins, then `RUST_LOG`, then `[logging] level`. Lines always
/// go to stderr, and to `[logging] file` as well when one is set.
fn init_tracing(logging: &LoggingConfig, level_from_cli: bool) -> Result<()> {
    let filter = if !level_from_cli && std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        let directive = logging.filter_directive()?;
        EnvFilter::try_new(&directive)
            .with_context(|| format!("Invalid log level '{}'", logging.level))?
    };

    let file_layer = match &logging.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

/// Load the config file, then apply command-line overrides
///
/// A missing default `deflake.toml` means built-in defaults; a missing file
/// named with `--config` is an error.
fn load_config(args: &Cli) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            AppConfig::from_file(DEFAULT_CONFIG_PATH)?
        }
        None => AppConfig::default(),
    };

    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn run(config: &AppConfig) -> Result<()> {
    let detector = FlakinessDetector::new(config.detection.clone())?;

    tracing::info!("Loading data from {}", config.data.input_path.display());
    let ingested = ingest::load_records(&config.data.input_path, config.data.format)?;
    if ingested.skipped > 0 {
        tracing::warn!("Skipped {} invalid records", ingested.skipped);
    }

    tracing::info!("Analyzing test data for flakiness patterns");
    let report = detector.analyze(&ingested.records);

    if config.reporting.wants(OutputFormat::Console) {
        print!(
            "{}",
            ConsoleReport::new(&report, config.reporting.top_n_tests).to_report_string()
        );
    }

    write_reports(&report, &config.reporting)?;
    tracing::info!("Flaky test detection complete");
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let config = load_config(&args)?;

    init_tracing(&config.logging, args.log_level.is_some())?;

    run(&config)
}
