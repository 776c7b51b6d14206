use std::path::PathBuf;
use std::process::ExitCode;

use hpge_fit::config::BatchConfig;
use hpge_fit::dispatcher::ErrorDispatcher;

#[cfg(feature = "lmfit")]
fn run(config: &BatchConfig, dispatcher: &ErrorDispatcher) -> ExitCode {
    use hpge_fit::batch::{run_batch, write_batch_report};
    use hpge_fit::fitter::lmfit::LmfitEngine;

    if !LmfitEngine::is_available() {
        log::error!("Python `lmfit` and `numpy` must be importable to run a batch");
        return ExitCode::FAILURE;
    }

    let mut engine = LmfitEngine::new();
    let results = run_batch(config, &mut engine, dispatcher);
    match write_batch_report(&results, &config.output_dir) {
        Ok(Some(summary)) => {
            log::info!("Summary written to {}", summary.display());
            ExitCode::SUCCESS
        }
        Ok(None) => {
            log::warn!("No histograms listed, nothing written");
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("Failed to write the batch report: {}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(feature = "lmfit"))]
fn run(_config: &BatchConfig, _dispatcher: &ErrorDispatcher) -> ExitCode {
    log::error!("hpge-batch was built without a fit engine; rebuild with `--features lmfit`");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    let Some(config_path) = std::env::args().nth(1).map(PathBuf::from) else {
        log::error!("Usage: hpge-batch <batch.yaml>");
        return ExitCode::FAILURE;
    };

    let config = match BatchConfig::load_yaml(&config_path) {
        Ok(config) => config,
        Err(err) => {
            log::error!("Could not read {}: {}", config_path.display(), err);
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = ErrorDispatcher::new();
    run(&config, &dispatcher)
}
