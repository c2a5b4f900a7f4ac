//! Configuration hierarchy: defaults < TOML file < PERSHOT_* environment < CLI flags

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::model::{Preset, SeekStrategy};
use crate::error::{PerShotError, PerShotResult};
use crate::planner::{HeuristicConfig, SeekConfig, ShotPlanConfig};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "pershot.toml";

/// Upper bound for the default worker count
pub const MAX_DEFAULT_WORKERS: usize = 8;

/// Scene detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Scene score above which a frame starts a new shot (0..1)
    pub threshold: f64,
    /// Frames are downscaled to this width before scoring
    pub analysis_width: u32,
    #[serde(flatten)]
    pub plan: ShotPlanConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            analysis_width: 320,
            plan: ShotPlanConfig::default(),
        }
    }
}

/// External encoder binary settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    /// Shared by every sub-clip so concatenation never rescales timestamps
    pub video_track_timescale: u32,
    /// Per external invocation
    pub timeout_secs: u64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            audio_sample_rate: 48_000,
            video_track_timescale: 90_000,
            timeout_secs: 3600,
        }
    }
}

/// Worker pool sizing and failure tolerance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    /// Shots allowed to fail (and be recovered) before the run fails
    pub max_failed_shots: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_failed_shots: 0,
        }
    }
}

/// `num_cpus` capped at [`MAX_DEFAULT_WORKERS`]
pub fn default_workers() -> usize {
    num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS)
}

/// Quality evaluation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub alignment_tolerance_frames: u64,
    /// Identical frames report infinite PSNR; they are reported as this value
    pub psnr_cap: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            alignment_tolerance_frames: 1,
            psnr_cap: 100.0,
        }
    }
}

/// Scratch space for per-shot intermediates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent of the run's temporary directory; system temp dir when unset
    pub root: Option<PathBuf>,
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub heuristic: HeuristicConfig,
    pub detection: DetectionConfig,
    pub seek: SeekConfig,
    pub encoder: EncoderConfig,
    pub pool: PoolConfig,
    pub evaluation: EvaluationConfig,
    pub workspace: WorkspaceConfig,
}

impl AppConfig {
    /// Defaults, overlaid with the explicit file or `./pershot.toml` when present
    pub fn load(explicit: Option<&Path>) -> PerShotResult<Self> {
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(PerShotError::Config {
                        message: format!("config file does not exist: {}", path.display()),
                    });
                }
                Self::from_file(path)
            }
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> PerShotResult<Self> {
        info!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> PerShotResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `PERSHOT_*` overrides from the process environment
    pub fn apply_env(&mut self) -> PerShotResult<usize> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `PERSHOT_*` overrides from an arbitrary lookup
    pub fn apply_env_with<F>(&mut self, lookup: F) -> PerShotResult<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;
        for &key in ENV_KEYS {
            if let Some(value) = lookup(key) {
                info!("Found environment override: {} = {}", key, value);
                self.set_env(key, value.trim())?;
                applied += 1;
            }
        }
        if applied > 0 {
            info!("Applied {} environment variable overrides", applied);
        }
        Ok(applied)
    }

    fn set_env(&mut self, key: &str, value: &str) -> PerShotResult<()> {
        match key {
            "PERSHOT_BASE_CRF" => self.heuristic.base_crf = parse_env(key, value)?,
            "PERSHOT_MIN_CRF" => self.heuristic.min_crf = parse_env(key, value)?,
            "PERSHOT_MAX_CRF" => self.heuristic.max_crf = parse_env(key, value)?,
            "PERSHOT_PRESET" => self.heuristic.preset = Preset::parse(value)?,
            "PERSHOT_SCENE_THRESHOLD" => self.detection.threshold = parse_env(key, value)?,
            "PERSHOT_MIN_SHOT_LENGTH" => {
                self.detection.plan.min_shot_length = parse_env(key, value)?
            }
            "PERSHOT_SEEK_STRATEGIES" => {
                self.seek.strategies = value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(SeekStrategy::parse)
                    .collect::<PerShotResult<Vec<_>>>()?
            }
            "PERSHOT_WORKERS" => self.pool.workers = parse_env(key, value)?,
            "PERSHOT_MAX_FAILED_SHOTS" => self.pool.max_failed_shots = parse_env(key, value)?,
            "PERSHOT_FFMPEG" => self.encoder.ffmpeg_path = PathBuf::from(value),
            "PERSHOT_FFPROBE" => self.encoder.ffprobe_path = PathBuf::from(value),
            "PERSHOT_VIDEO_CODEC" => self.encoder.video_codec = value.to_string(),
            "PERSHOT_TIMEOUT_SECS" => self.encoder.timeout_secs = parse_env(key, value)?,
            "PERSHOT_WORKSPACE" => self.workspace.root = Some(PathBuf::from(value)),
            _ => {}
        }
        Ok(())
    }

    /// Reject settings no run could succeed with
    pub fn validate(&self) -> PerShotResult<()> {
        self.heuristic.validate(&self.encoder.video_codec)?;
        self.seek.validate()?;

        let invalid = |message: String| Err(PerShotError::Config { message });
        let detection = &self.detection;
        if !(detection.threshold > 0.0 && detection.threshold < 1.0) {
            return invalid(format!(
                "detection.threshold must be in (0, 1), got {}",
                detection.threshold
            ));
        }
        if detection.analysis_width == 0 {
            return invalid("detection.analysis_width must be positive".to_string());
        }
        if !detection.plan.min_shot_length.is_finite() || detection.plan.min_shot_length < 0.0 {
            return invalid(format!(
                "detection.min_shot_length must be >= 0, got {}",
                detection.plan.min_shot_length
            ));
        }
        if !(detection.plan.activity_ceiling > 0.0 && detection.plan.fallback_reference_secs > 0.0)
        {
            return invalid(
                "detection.activity_ceiling and fallback_reference_secs must be positive"
                    .to_string(),
            );
        }
        if self.pool.workers == 0 {
            return invalid("pool.workers must be at least 1".to_string());
        }
        if self.encoder.timeout_secs == 0 {
            return invalid("encoder.timeout_secs must be at least 1".to_string());
        }
        if self.encoder.video_track_timescale == 0 || self.encoder.audio_sample_rate == 0 {
            return invalid("encoder timescale and sample rate must be positive".to_string());
        }
        if !(self.evaluation.psnr_cap > 0.0) {
            return invalid(format!(
                "evaluation.psnr_cap must be positive, got {}",
                self.evaluation.psnr_cap
            ));
        }
        Ok(())
    }
}

const ENV_KEYS: &[&str] = &[
    "PERSHOT_BASE_CRF",
    "PERSHOT_MIN_CRF",
    "PERSHOT_MAX_CRF",
    "PERSHOT_PRESET",
    "PERSHOT_SCENE_THRESHOLD",
    "PERSHOT_MIN_SHOT_LENGTH",
    "PERSHOT_SEEK_STRATEGIES",
    "PERSHOT_WORKERS",
    "PERSHOT_MAX_FAILED_SHOTS",
    "PERSHOT_FFMPEG",
    "PERSHOT_FFPROBE",
    "PERSHOT_VIDEO_CODEC",
    "PERSHOT_TIMEOUT_SECS",
    "PERSHOT_WORKSPACE",
];

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> PerShotResult<T>
where
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| PerShotError::Config {
        message: format!("{} = '{}': {}", key, value, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heuristic.base_crf, 23.0);
        assert_eq!(config.pool.max_failed_shots, 0);
        assert!(config.pool.workers >= 1 && config.pool.workers <= MAX_DEFAULT_WORKERS);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [heuristic]
            min_crf = 20
            preset = "slow"

            [heuristic.extra_flags]
            tune = "film"

            [detection]
            threshold = 0.4
            min_shot_length = 1.0

            [seek]
            strategies = ["accurate_only"]

            [seek.by_container]
            avi = ["accurate_only"]
            "#,
        )
        .unwrap();

        assert_eq!(config.heuristic.min_crf, 20.0);
        assert_eq!(config.heuristic.max_crf, 35.0);
        assert_eq!(config.heuristic.preset, Preset::Slow);
        assert_eq!(config.heuristic.extra_flags.get("tune").map(String::as_str), Some("film"));
        assert_eq!(config.detection.threshold, 0.4);
        assert_eq!(config.detection.plan.min_shot_length, 1.0);
        assert_eq!(config.detection.plan.activity_ceiling, 0.15);
        assert_eq!(config.seek.strategies, vec![SeekStrategy::AccurateOnly]);
        assert!(config.seek.by_container.contains_key("avi"));
        assert_eq!(config.encoder.video_codec, "libx264");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_toml_is_an_error() {
        assert!(matches!(
            AppConfig::from_toml("[heuristic]\nmin_crf = \"low\""),
            Err(PerShotError::TomlError(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("PERSHOT_MAX_CRF", "30"),
            ("PERSHOT_WORKERS", "3"),
            ("PERSHOT_PRESET", "fast"),
            ("PERSHOT_SEEK_STRATEGIES", "accurate-only, dual_stage"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        let applied = config
            .apply_env_with(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(applied, 4);
        assert_eq!(config.heuristic.max_crf, 30.0);
        assert_eq!(config.pool.workers, 3);
        assert_eq!(config.heuristic.preset, Preset::Fast);
        assert_eq!(
            config.seek.strategies,
            vec![SeekStrategy::AccurateOnly, SeekStrategy::DualStage]
        );
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_with(|key| {
            (key == "PERSHOT_WORKERS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(PerShotError::Config { .. })));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.pool.workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.detection.threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.heuristic.min_crf = 40.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(PerShotError::Config { .. })
        ));

        let present = dir.path().join("pershot.toml");
        std::fs::write(&present, "[pool]\nmax_failed_shots = 2\n").unwrap();
        let config = AppConfig::load(Some(&present)).unwrap();
        assert_eq!(config.pool.max_failed_shots, 2);
    }
}
