//! Shot descriptor construction from detector cut points

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::model::{ActivitySample, ComplexitySource, CutPoint, ShotDescriptor};
use crate::error::{PerShotError, PerShotResult};

/// Cut points closer than this are the same boundary
const BOUNDARY_EPSILON: f64 = 1e-6;

/// Shot planning parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShotPlanConfig {
    /// Minimum allowed shot length in seconds
    pub min_shot_length: f64,
    /// Mean activity score that maps to complexity 1.0
    pub activity_ceiling: f64,
    /// Reference duration for the duration-only complexity fallback
    pub fallback_reference_secs: f64,
}

impl Default for ShotPlanConfig {
    fn default() -> Self {
        Self {
            min_shot_length: 0.5,
            activity_ceiling: 0.15,
            fallback_reference_secs: 5.0,
        }
    }
}

/// Builds the contiguous shot plan
pub struct ShotPlanner {
    config: ShotPlanConfig,
}

impl ShotPlanner {
    pub fn new(config: ShotPlanConfig) -> Self {
        Self { config }
    }

    /// Turn cut points into shots covering `[0, duration)` exactly
    pub fn build(
        &self,
        cuts: &[CutPoint],
        activity: &[ActivitySample],
        duration: f64,
    ) -> PerShotResult<Vec<ShotDescriptor>> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(PerShotError::InvalidPlan {
                message: format!("source duration must be positive, got {}", duration),
            });
        }

        let boundaries = self.boundaries(cuts, duration)?;
        let mut shots = Vec::with_capacity(boundaries.len() - 1);

        for (index, window) in boundaries.windows(2).enumerate() {
            let (start, end) = (window[0], window[1]);
            if end - start < self.config.min_shot_length {
                return Err(PerShotError::InvalidBoundary {
                    index,
                    start,
                    end,
                    min_shot_length: self.config.min_shot_length,
                });
            }

            let (complexity, complexity_source) = self.complexity(activity, start, end);
            shots.push(ShotDescriptor {
                index,
                start,
                end,
                duration: end - start,
                complexity,
                complexity_source,
            });
        }

        info!(
            "Planned {} shot(s) over {:.3}s from {} cut point(s)",
            shots.len(),
            duration,
            cuts.len()
        );
        Ok(shots)
    }

    /// Sorted, deduplicated boundary list including 0 and `duration`
    fn boundaries(&self, cuts: &[CutPoint], duration: f64) -> PerShotResult<Vec<f64>> {
        if let Some(bad) = cuts.iter().find(|c| !c.time.is_finite()) {
            return Err(PerShotError::InvalidPlan {
                message: format!("non-finite cut point {:?}", bad.time),
            });
        }

        let mut interior: Vec<f64> = cuts
            .iter()
            .map(|c| c.time)
            .filter(|t| *t > BOUNDARY_EPSILON && *t < duration - BOUNDARY_EPSILON)
            .collect();
        let dropped = cuts.len() - interior.len();
        if dropped > 0 {
            debug!("Dropped {} cut point(s) on or outside the implicit edges", dropped);
        }

        interior.sort_by(f64::total_cmp);
        interior.dedup_by(|a, b| (*a - *b).abs() <= BOUNDARY_EPSILON);

        let mut boundaries = Vec::with_capacity(interior.len() + 2);
        boundaries.push(0.0);
        boundaries.extend(interior);
        boundaries.push(duration);
        Ok(boundaries)
    }

    fn complexity(&self, activity: &[ActivitySample], start: f64, end: f64) -> (f64, ComplexitySource) {
        // The sample at the cut frame measures the cut itself, not the shot.
        let inside: Vec<f64> = activity
            .iter()
            .filter(|s| s.time > start + BOUNDARY_EPSILON && s.time < end)
            .map(|s| s.score)
            .filter(|s| s.is_finite())
            .collect();

        if inside.is_empty() {
            if !activity.is_empty() {
                warn!(
                    "No activity samples inside [{:.3}s, {:.3}s), using duration fallback",
                    start, end
                );
            }
            return (self.duration_fallback(end - start), ComplexitySource::DurationFallback);
        }

        let mean = inside.iter().sum::<f64>() / inside.len() as f64;
        let ceiling = self.config.activity_ceiling.max(f64::EPSILON);
        ((mean / ceiling).clamp(0.0, 1.0), ComplexitySource::Activity)
    }

    fn duration_fallback(&self, duration: f64) -> f64 {
        let reference = self.config.fallback_reference_secs.max(f64::EPSILON);
        (reference / (reference + duration.max(0.0))).clamp(0.0, 1.0)
    }
}
