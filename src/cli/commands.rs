//! Command implementations

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::app::{AppContainer, DefaultAppContainer, EncodeMode, EncodeRequest};
use crate::cli::args::{EncodeArgs, EvaluateArgs, PlanArgs};
use crate::config::AppConfig;
use crate::engine::CancellationToken;
use crate::error::{PerShotError, PerShotResult};
use crate::output::{render_plan, render_quality, render_run, write_json};

/// Container extensions accepted as input
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Reject inputs whose extension is not a supported container
pub fn check_input_extension(path: &Path) -> PerShotResult<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(PerShotError::Config {
            message: format!(
                "unsupported input '{}', expected one of: {}",
                path.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            ),
        }),
    }
}

/// File, then environment, then command-line overrides, then validation
pub fn load_config(
    config_path: Option<&Path>,
    overrides: impl FnOnce(&mut AppConfig),
) -> Result<AppConfig> {
    let mut config = AppConfig::load(config_path).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid PERSHOT_* environment override")?;
    overrides(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Execute the encode command
pub async fn encode(
    args: EncodeArgs,
    config_path: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    check_input_extension(&args.input)?;
    let config = load_config(config_path, |config| args.apply(config))?;

    let mode = if args.single_pass {
        EncodeMode::SinglePass {
            resolution: args.resolution,
        }
    } else {
        EncodeMode::PerShot
    };
    info!(
        "Encoding {} -> {} ({:?}, {} worker(s))",
        args.input.display(),
        args.output.display(),
        mode,
        config.pool.workers
    );

    let container = DefaultAppContainer::new(config);
    let request = EncodeRequest {
        input: args.input.clone(),
        output: args.output.clone(),
        mode,
    };
    let report = container
        .encode_interactor()
        .execute(&request, cancel)
        .await
        .with_context(|| format!("Encoding {} failed", args.input.display()))?;

    print!("{}", render_run(&report));
    if let Some(path) = &args.report {
        write_json(&report, path).context("Failed to write run report")?;
    }
    Ok(())
}

/// Execute the plan command
pub async fn plan(
    args: PlanArgs,
    config_path: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    check_input_extension(&args.input)?;
    let config = load_config(config_path, |config| args.detection.apply(config))?;

    let container = DefaultAppContainer::new(config);
    let plan = container
        .encode_interactor()
        .plan(&args.input, cancel)
        .await
        .with_context(|| format!("Planning {} failed", args.input.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?;
        println!("{}", json);
    } else {
        print!("{}", render_plan(&plan));
    }
    Ok(())
}

/// Execute the evaluate command
pub async fn evaluate(
    args: EvaluateArgs,
    config_path: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let config = load_config(config_path, |_| {})?;

    let container = DefaultAppContainer::new(config);
    let quality = container
        .evaluate_interactor()
        .execute(&args.reference, &args.distorted, cancel)
        .await
        .context("Quality evaluation failed")?;

    if args.json {
        let json =
            serde_json::to_string_pretty(&quality).context("Failed to serialize quality report")?;
        println!("{}", json);
    } else {
        print!("{}", render_quality(&quality));
    }
    Ok(())
}
