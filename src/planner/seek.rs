//! Seek strategy table for sub-clip extraction

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::model::{SeekStrategy, ShotDescriptor};
use crate::error::{PerShotError, PerShotResult};

/// Seek/extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekConfig {
    /// Strategies tried in order for every container without an override
    pub strategies: Vec<SeekStrategy>,
    /// Per-container overrides, keyed by the probed container tag
    pub by_container: BTreeMap<String, Vec<SeekStrategy>>,
    /// How far before the shot start the coarse keyframe seek aims
    pub preroll_secs: f64,
    /// Allowed duration error of an extracted clip, in frames
    pub duration_tolerance_frames: f64,
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            strategies: vec![SeekStrategy::DualStage, SeekStrategy::AccurateOnly],
            by_container: BTreeMap::new(),
            preroll_secs: 5.0,
            duration_tolerance_frames: 2.0,
        }
    }
}

impl SeekConfig {
    pub fn validate(&self) -> PerShotResult<()> {
        if self.strategies.is_empty() {
            return Err(PerShotError::Config {
                message: "seek.strategies must list at least one strategy".to_string(),
            });
        }
        if let Some((container, _)) = self.by_container.iter().find(|(_, list)| list.is_empty()) {
            return Err(PerShotError::Config {
                message: format!("seek.by_container.{} must not be empty", container),
            });
        }
        if !self.preroll_secs.is_finite() || self.preroll_secs < 0.0 {
            return Err(PerShotError::Config {
                message: format!("seek.preroll_secs must be >= 0, got {}", self.preroll_secs),
            });
        }
        if !self.duration_tolerance_frames.is_finite() || self.duration_tolerance_frames < 0.0 {
            return Err(PerShotError::Config {
                message: "seek.duration_tolerance_frames must be >= 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Resolves which strategies run, and in what order, for a source
pub struct SeekPlanner {
    config: SeekConfig,
}

impl SeekPlanner {
    pub fn new(config: SeekConfig) -> Self {
        Self { config }
    }

    /// Ordered strategy list for a container tag
    pub fn strategies_for(&self, container: &str) -> Vec<SeekStrategy> {
        let key = container.trim().to_lowercase();
        let mut list = match self.config.by_container.get(&key) {
            Some(list) => {
                debug!("Using container override for '{}': {:?}", key, list);
                list.clone()
            }
            None => self.config.strategies.clone(),
        };
        // Same strategy twice adds nothing but time
        let mut seen = Vec::with_capacity(list.len());
        list.retain(|s| {
            if seen.contains(s) {
                false
            } else {
                seen.push(*s);
                true
            }
        });
        list
    }

    /// Where the keyframe-aligned coarse seek aims for a shot
    pub fn coarse_start(&self, shot: &ShotDescriptor) -> f64 {
        (shot.start - self.config.preroll_secs).max(0.0)
    }

    /// Length of the stage-one chunk: preroll plus the shot itself
    pub fn coarse_span(&self, shot: &ShotDescriptor) -> f64 {
        shot.end - self.coarse_start(shot)
    }

    /// Allowed duration error in seconds for a given frame rate
    pub fn duration_tolerance(&self, frame_rate: f64) -> f64 {
        if frame_rate > 0.0 {
            self.config.duration_tolerance_frames / frame_rate
        } else {
            self.config.duration_tolerance_frames * 0.05
        }
    }
}
