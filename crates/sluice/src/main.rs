//! Sluice CLI: check a list of websites through a fanned-out pipeline.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use sluice::{
    Checker, CliArgs, Config, LoggingSink, exit_status, init_metrics, init_tracing,
    shutdown_signal,
};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let paths = args.config_paths();
    if paths.is_empty() {
        eprintln!("Error: no config files or directories specified");
        return ExitCode::FAILURE;
    }

    info!("Loading config from {} source(s)", paths.len());

    let mut config = match Config::from_paths(&paths) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };
    args.apply_overrides(&mut config);

    if let Some(address) = &config.metrics.address
        && let Err(e) = init_metrics(address)
    {
        eprintln!("Failed to start metrics server: {e}");
        return ExitCode::FAILURE;
    }

    info!(
        "Starting sluice with {} url(s) and {} stage(s)",
        config.url_count(),
        config.stages.len()
    );

    let pipeline = match Checker::new(config).build(LoggingSink) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Invalid pipeline: {e}");
            return ExitCode::FAILURE;
        }
    };

    let handle = pipeline.cancel_handle();
    let signals = tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(_) => {
                handle.cancel();
            }
            Err(e) => error!(error = %e, "Failed to install signal handlers"),
        }
    });

    let outcome = pipeline.execute().await;
    signals.abort();

    match &outcome {
        Ok(summary) => info!(
            results = summary.results,
            errors = summary.errors,
            elapsed_ms = summary.elapsed.as_millis(),
            "All urls checked"
        ),
        Err(e) => eprintln!("Pipeline stopped: {e}"),
    }

    ExitCode::from(exit_status(&outcome))
}
