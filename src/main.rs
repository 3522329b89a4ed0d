//! Slowverb CLI - slowed + reverb audio processor
//!
//! Command-line interface for the slowverb processing pipeline.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use slowverb::cli::{commands, Cli, Commands};
use slowverb::config::AppConfig;
use slowverb::engine::OutputDevice;
use slowverb::logging::init_logging;
use slowverb::SlowverbError;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Slowverb v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        if let Some(err) = e.downcast_ref::<SlowverbError>() {
            for suggestion in err.recovery_suggestions() {
                eprintln!("  - {}", suggestion);
            }
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Process {
            input,
            output,
            params,
        }) => commands::process(&config, &input, &output, &params),
        Some(Commands::Preview { input, params }) => {
            commands::preview(&config, output_device()?, &input, &params)
        }
        Some(Commands::Info { input }) => commands::info(&config, &input),
        Some(Commands::InitConfig { path }) => commands::init_config(&path),
        None => {
            println!("Slowverb v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

#[cfg(feature = "device")]
fn output_device() -> Result<Arc<dyn OutputDevice>> {
    let device = slowverb::engine::CpalDevice::default_output()?;
    Ok(Arc::new(device))
}

#[cfg(not(feature = "device"))]
fn output_device() -> Result<Arc<dyn OutputDevice>> {
    tracing::warn!("built without the `device` feature, preview plays into a silent sink");
    Ok(Arc::new(slowverb::engine::CaptureDevice::realtime()))
}
