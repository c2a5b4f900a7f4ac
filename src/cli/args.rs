//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;
use clap_num::number_range;

use crate::config::AppConfig;
use crate::domain::model::Preset;

fn parse_crf(s: &str) -> Result<u8, String> {
    number_range(s, 0, 63)
}

fn parse_workers(s: &str) -> Result<usize, String> {
    number_range(s, 1, 256)
}

fn parse_tolerance(s: &str) -> Result<usize, String> {
    number_range(s, 0, 10_000)
}

fn parse_preset(s: &str) -> Result<Preset, String> {
    Preset::parse(s).map_err(|e| e.to_string())
}

fn parse_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if value > 0.0 && value < 1.0 {
        Ok(value)
    } else {
        Err(format!("scene threshold must be in (0, 1), got {}", value))
    }
}

fn parse_seconds(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(format!("length must be a non-negative number of seconds, got {}", s))
    }
}

/// Parse `WIDTHxHEIGHT`
pub fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let (width, height) = s
        .split_once(|c: char| c == 'x' || c == 'X')
        .ok_or_else(|| format!("resolution must look like 1280x720, got '{}'", s))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{}'", s))?;
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(format!(
            "resolution must be positive and even in both dimensions, got {}x{}",
            width, height
        ));
    }
    Ok((width, height))
}

/// Detection overrides shared by `encode` and `plan`
#[derive(Args, Debug, Clone, Default)]
pub struct DetectionArgs {
    /// Scene change score that starts a new shot (0-1)
    #[arg(long, value_parser = parse_threshold)]
    pub scene_threshold: Option<f64>,

    /// Minimum shot length in seconds
    #[arg(long, value_parser = parse_seconds)]
    pub min_shot_length: Option<f64>,
}

impl DetectionArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(threshold) = self.scene_threshold {
            config.detection.threshold = threshold;
        }
        if let Some(length) = self.min_shot_length {
            config.detection.plan.min_shot_length = length;
        }
    }
}

/// Arguments for the encode command
#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Source video (mp4, avi, mov, mkv)
    pub input: PathBuf,

    /// Encoded output file
    pub output: PathBuf,

    /// CRF for a shot of average length and complexity
    #[arg(long, value_parser = parse_crf)]
    pub base_crf: Option<u8>,

    /// Lowest CRF any shot may receive
    #[arg(long, value_parser = parse_crf)]
    pub min_crf: Option<u8>,

    /// Highest CRF any shot may receive
    #[arg(long, value_parser = parse_crf)]
    pub max_crf: Option<u8>,

    /// Encoder preset
    #[arg(long, value_parser = parse_preset)]
    pub preset: Option<Preset>,

    /// Concurrent shot workers
    #[arg(long, value_parser = parse_workers)]
    pub workers: Option<usize>,

    /// Shots allowed to fail (and be recovered) before the run fails
    #[arg(long, value_parser = parse_tolerance)]
    pub max_failed_shots: Option<usize>,

    #[command(flatten)]
    pub detection: DetectionArgs,

    /// Write the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Encode the whole file once at the base CRF instead of per shot
    #[arg(long)]
    pub single_pass: bool,

    /// Output resolution for single-pass mode, e.g. 1280x720
    #[arg(long, value_parser = parse_resolution, requires = "single_pass")]
    pub resolution: Option<(u32, u32)>,
}

impl EncodeArgs {
    /// Overlay command-line flags on the loaded configuration
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(crf) = self.base_crf {
            config.heuristic.base_crf = f64::from(crf);
        }
        if let Some(crf) = self.min_crf {
            config.heuristic.min_crf = f64::from(crf);
        }
        if let Some(crf) = self.max_crf {
            config.heuristic.max_crf = f64::from(crf);
        }
        if let Some(preset) = self.preset {
            config.heuristic.preset = preset;
        }
        if let Some(workers) = self.workers {
            config.pool.workers = workers;
        }
        if let Some(tolerance) = self.max_failed_shots {
            config.pool.max_failed_shots = tolerance;
        }
        self.detection.apply(config);
    }
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Source video (mp4, avi, mov, mkv)
    pub input: PathBuf,

    #[command(flatten)]
    pub detection: DetectionArgs,

    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the evaluate command
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Reference video
    pub reference: PathBuf,

    /// Video to score against the reference
    pub distorted: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
