//! PerShot per-shot encoder
//!
//! Splits a source video at shot boundaries, encodes every shot with a CRF
//! derived from its length and visual complexity, reassembles the shots into
//! one seamless file and reports PSNR/SSIM against the source.
//!
//! # Usage
//!
//! ```bash
//! pershot encode input.mp4 output.mp4 --workers 4 --report run.json
//! pershot plan input.mp4 --json
//! pershot evaluate input.mp4 output.mp4
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use pershot::cli::{commands, Cli, Commands};
use pershot::engine::CancellationToken;
use pershot::utils::logging::{LogFormat, LogLevel, LoggingConfig, LoggingSystem};

/// Main entry point for the PerShot CLI application
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = LoggingSystem::new(LoggingConfig {
        level: LogLevel::parse(&cli.log_level)?,
        format: LogFormat::parse(&cli.log_format)?,
        ..LoggingConfig::default()
    });
    logging.initialize()?;
    logging.log_system_info();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Encode(args) => {
            info!("Executing encode command");
            commands::encode(args, config_path, &cancel).await?;
        }
        Commands::Plan(args) => {
            info!("Executing plan command");
            commands::plan(args, config_path, &cancel).await?;
        }
        Commands::Evaluate(args) => {
            info!("Executing evaluate command");
            commands::evaluate(args, config_path, &cancel).await?;
        }
    }

    info!("PerShot completed successfully");
    Ok(())
}
