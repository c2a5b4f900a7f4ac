//! Per-shot quality heuristic
//!
//! Short, busy shots get a lower CRF (viewers fixate on action); long, calm
//! shots tolerate a higher one. The result is always inside the configured
//! bounds and depends only on `(duration, complexity, config)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::model::{EncodeParameters, Preset, ShotDescriptor};
use crate::error::{PerShotError, PerShotResult};

/// Tuning knobs for the heuristic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicConfig {
    /// CRF before duration/complexity adjustments
    pub base_crf: f64,
    pub min_crf: f64,
    pub max_crf: f64,
    /// Shots longer than this get `medium_offset`
    pub medium_shot_secs: f64,
    /// Shots longer than this get `long_offset`
    pub long_shot_secs: f64,
    pub short_offset: f64,
    pub medium_offset: f64,
    pub long_offset: f64,
    /// CRF points between complexity 0 and complexity 1
    pub complexity_weight: f64,
    pub preset: Preset,
    /// Passed to the encoder as `-key value`
    pub extra_flags: BTreeMap<String, String>,
}

impl Default for HeuristicConfig {
    fn default() -> Self {
        Self {
            base_crf: 23.0,
            min_crf: 18.0,
            max_crf: 35.0,
            medium_shot_secs: 5.0,
            long_shot_secs: 10.0,
            short_offset: -2.0,
            medium_offset: 2.0,
            long_offset: 4.0,
            complexity_weight: 6.0,
            preset: Preset::Medium,
            extra_flags: BTreeMap::new(),
        }
    }
}

impl HeuristicConfig {
    /// Check bounds and tiers against the codec's valid CRF range
    pub fn validate(&self, codec: &str) -> PerShotResult<()> {
        let (lo, hi) = codec_crf_range(codec);
        let invalid = |message: String| Err(PerShotError::Config { message });

        for (name, value) in [
            ("base_crf", self.base_crf),
            ("min_crf", self.min_crf),
            ("max_crf", self.max_crf),
        ] {
            if !value.is_finite() || value < lo || value > hi {
                return invalid(format!(
                    "{} = {} is outside the {} range [{}, {}]",
                    name, value, codec, lo, hi
                ));
            }
        }
        if self.min_crf > self.max_crf {
            return invalid(format!(
                "min_crf ({}) must not exceed max_crf ({})",
                self.min_crf, self.max_crf
            ));
        }
        if !(self.medium_shot_secs > 0.0 && self.long_shot_secs > self.medium_shot_secs) {
            return invalid(format!(
                "shot tiers must satisfy 0 < medium_shot_secs ({}) < long_shot_secs ({})",
                self.medium_shot_secs, self.long_shot_secs
            ));
        }
        if !(self.short_offset <= self.medium_offset && self.medium_offset <= self.long_offset) {
            return invalid("duration offsets must be non-decreasing (short <= medium <= long)".to_string());
        }
        if !self.complexity_weight.is_finite() || self.complexity_weight < 0.0 {
            return invalid(format!(
                "complexity_weight must be a non-negative number, got {}",
                self.complexity_weight
            ));
        }
        Ok(())
    }
}

/// Valid CRF range for a codec name
pub fn codec_crf_range(codec: &str) -> (f64, f64) {
    match codec {
        "libaom-av1" | "libsvtav1" | "libvpx-vp9" => (0.0, 63.0),
        _ => (0.0, 51.0),
    }
}

/// Maps shot descriptors to encode parameters
#[derive(Debug, Clone)]
pub struct CrfHeuristic {
    config: HeuristicConfig,
}

impl CrfHeuristic {
    pub fn new(config: HeuristicConfig) -> Self {
        Self { config }
    }

    /// Parameters for a planned shot
    pub fn params_for(&self, shot: &ShotDescriptor) -> EncodeParameters {
        let params = compute_params(shot.duration, shot.complexity, &self.config);
        debug!(
            "Shot {} ({:.2}s, complexity {:.3}) -> CRF {} preset {}",
            shot.index, shot.duration, shot.complexity, params.quality_param, params.preset
        );
        params
    }

    /// Parameters for a whole-file encode: base CRF, no adjustments
    pub fn base_params(&self) -> EncodeParameters {
        EncodeParameters {
            quality_param: clamp_crf(self.config.base_crf, &self.config),
            preset: self.config.preset,
            extra_flags: self.config.extra_flags.clone(),
        }
    }
}

/// Pure heuristic: `f(duration, complexity) -> EncodeParameters`
pub fn compute_params(duration: f64, complexity: f64, config: &HeuristicConfig) -> EncodeParameters {
    let raw = config.base_crf + duration_offset(duration, config) + complexity_offset(complexity, config);
    EncodeParameters {
        quality_param: clamp_crf(raw, config),
        preset: config.preset,
        extra_flags: config.extra_flags.clone(),
    }
}

fn duration_offset(duration: f64, config: &HeuristicConfig) -> f64 {
    if duration.is_nan() {
        return config.short_offset;
    }
    if duration > config.long_shot_secs {
        config.long_offset
    } else if duration > config.medium_shot_secs {
        config.medium_offset
    } else {
        config.short_offset
    }
}

fn complexity_offset(complexity: f64, config: &HeuristicConfig) -> f64 {
    let c = if complexity.is_finite() {
        complexity.clamp(0.0, 1.0)
    } else {
        0.5
    };
    config.complexity_weight * (0.5 - c)
}

// Rounding before clamping keeps the output on a 0.1 grid and inside the bounds.
fn clamp_crf(raw: f64, config: &HeuristicConfig) -> f64 {
    let rounded = (raw * 10.0).round() / 10.0;
    rounded.max(config.min_crf).min(config.max_crf)
}
