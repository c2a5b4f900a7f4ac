//! Frame-accurate sub-clip extraction with ordered seek strategy fallback
//!
//! `DualStage` stream-copies a keyframe-aligned chunk that starts up to
//! `preroll` seconds before the shot, probes where the chunk really starts,
//! then decodes forward to the exact first frame. `AccurateOnly` decodes
//! straight from the source. Every artifact is validated before it is
//! accepted; a failed validation moves on to the next strategy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::domain::model::*;
use crate::engine::cancel::CancellationToken;
use crate::error::{PerShotError, PerShotResult};
use crate::planner::SeekPlanner;
use crate::ports::{MediaProbe, TransformFailure, TransformRequest, Transcoder};

/// Extra stream-copy length past the shot end, so the chunk never ends short
const CHUNK_SLACK_SECS: f64 = 1.0;

/// A validated lossless sub-clip
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedClip {
    pub path: PathBuf,
    pub strategy: SeekStrategy,
    pub duration: f64,
    pub attempts: Vec<StrategyAttempt>,
}

/// Why a single strategy did not produce a usable clip
enum StrategyError {
    Cancelled,
    Failed(String),
}

impl From<PerShotError> for StrategyError {
    fn from(error: PerShotError) -> Self {
        match error {
            PerShotError::Cancelled => StrategyError::Cancelled,
            other => StrategyError::Failed(other.to_string()),
        }
    }
}

fn transform_error(kind: &str, failure: TransformFailure) -> StrategyError {
    match failure {
        TransformFailure::Cancelled => StrategyError::Cancelled,
        other => StrategyError::Failed(format!("{} {}", kind, other)),
    }
}

/// Dual-stage seek extractor
pub struct SeekExtractor {
    transcoder: Arc<dyn Transcoder>,
    probe: Arc<dyn MediaProbe>,
    planner: SeekPlanner,
    source_start: OnceCell<f64>,
}

impl SeekExtractor {
    pub fn new(
        transcoder: Arc<dyn Transcoder>,
        probe: Arc<dyn MediaProbe>,
        planner: SeekPlanner,
    ) -> Self {
        Self {
            transcoder,
            probe,
            planner,
            source_start: OnceCell::new(),
        }
    }

    /// Extract `shot` into `work_dir`, trying each configured strategy in order
    pub async fn extract(
        &self,
        source: &SourceVideo,
        shot: &ShotDescriptor,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<ExtractedClip> {
        let strategies = self.planner.strategies_for(&source.container);
        let mut attempts = Vec::with_capacity(strategies.len());

        for strategy in strategies {
            if cancel.is_cancelled() {
                return Err(PerShotError::Cancelled);
            }
            debug!("Shot {}: trying {}", shot.index, strategy);

            let result = match strategy {
                SeekStrategy::DualStage => self.dual_stage(source, shot, work_dir, cancel).await,
                SeekStrategy::AccurateOnly => {
                    self.accurate_only(source, shot, work_dir, cancel).await
                }
            };
            let outcome = match result {
                Ok(path) => match self.validate(source, shot, &path).await {
                    Ok(duration) => Ok((path, duration)),
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };

            match outcome {
                Ok((path, duration)) => {
                    attempts.push(StrategyAttempt {
                        strategy,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    info!(
                        "Shot {}: extracted {:.3}s with {}",
                        shot.index, duration, strategy
                    );
                    return Ok(ExtractedClip {
                        path,
                        strategy,
                        duration,
                        attempts,
                    });
                }
                Err(StrategyError::Cancelled) => return Err(PerShotError::Cancelled),
                Err(StrategyError::Failed(reason)) => {
                    warn!("Shot {}: {} failed: {}", shot.index, strategy, reason);
                    attempts.push(StrategyAttempt {
                        strategy,
                        outcome: AttemptOutcome::Failed(reason),
                    });
                }
            }
        }

        Err(PerShotError::Extraction {
            shot_index: shot.index,
            attempts,
        })
    }

    async fn dual_stage(
        &self,
        source: &SourceVideo,
        shot: &ShotDescriptor,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StrategyError> {
        let chunk = work_dir.join("chunk.mkv");
        let coarse_start = self.planner.coarse_start(shot);
        let copy = TransformRequest::CopyChunk {
            input: source.path.clone(),
            start: coarse_start,
            duration: self.planner.coarse_span(shot) + CHUNK_SLACK_SECS,
            output: chunk.clone(),
        };
        self.transcoder
            .run(&copy, cancel)
            .await
            .map_err(|f| transform_error(copy.kind(), f))?;

        // The chunk keeps source timestamps; its first frame is the keyframe the seek landed on.
        let source_start = *self
            .source_start
            .get_or_try_init(|| self.probe.start_time(&source.path))
            .await?;
        let chunk_start = self.probe.start_time(&chunk).await? - source_start;
        if chunk_start > shot.start + self.planner.duration_tolerance(source.frame_rate) {
            return Err(StrategyError::Failed(format!(
                "keyframe seek landed at {:.3}s, after the shot start {:.3}s",
                chunk_start, shot.start
            )));
        }
        let offset = (shot.start - chunk_start).max(0.0);
        debug!(
            "Shot {}: chunk starts at {:.3}s (asked {:.3}s), trimming {:.3}s",
            shot.index, chunk_start, coarse_start, offset
        );

        let output = work_dir.join("clip_dual_stage.mkv");
        let trim = TransformRequest::Trim {
            input: chunk,
            offset,
            duration: shot.duration,
            has_audio: source.has_audio,
            output: output.clone(),
        };
        self.transcoder
            .run(&trim, cancel)
            .await
            .map_err(|f| transform_error(trim.kind(), f))?;
        Ok(output)
    }

    async fn accurate_only(
        &self,
        source: &SourceVideo,
        shot: &ShotDescriptor,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StrategyError> {
        let output = work_dir.join("clip_accurate_only.mkv");
        let trim = TransformRequest::Trim {
            input: source.path.clone(),
            offset: shot.start,
            duration: shot.duration,
            has_audio: source.has_audio,
            output: output.clone(),
        };
        self.transcoder
            .run(&trim, cancel)
            .await
            .map_err(|f| transform_error(trim.kind(), f))?;
        Ok(output)
    }

    /// Exists, non-empty, probe-able, and the right length
    async fn validate(
        &self,
        source: &SourceVideo,
        shot: &ShotDescriptor,
        path: &Path,
    ) -> Result<f64, StrategyError> {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size == 0 {
            return Err(StrategyError::Failed(format!(
                "artifact {} is missing or empty",
                path.display()
            )));
        }
        let clip = self.probe.probe(path).await?;
        let tolerance = self.planner.duration_tolerance(source.frame_rate);
        if (clip.duration - shot.duration).abs() > tolerance {
            return Err(StrategyError::Failed(format!(
                "duration {:.3}s differs from shot duration {:.3}s by more than {:.3}s",
                clip.duration, shot.duration, tolerance
            )));
        }
        Ok(clip.duration)
    }
}
