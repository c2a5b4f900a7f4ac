//! Objective quality evaluation of the reconstructed stream

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::config::EvaluationConfig;
use crate::domain::model::*;
use crate::engine::cancel::CancellationToken;
use crate::error::{PerShotError, PerShotResult};
use crate::ports::{FrameMetrics, MediaProbe, QualityMeter};

/// Keeps frame n on the right side of a boundary at exactly n / fps
const BUCKET_EPSILON: f64 = 1e-9;

/// Split per-frame metrics into per-shot means and a duration-weighted aggregate
pub fn score_shots(
    metrics: &FrameMetrics,
    shots: &[ShotDescriptor],
    frame_rate: f64,
) -> PerShotResult<QualityReport> {
    if shots.is_empty() || frame_rate <= 0.0 {
        return Err(PerShotError::Alignment {
            message: "cannot bucket metrics without shots and a frame rate".to_string(),
        });
    }

    let mut sums = vec![(0.0f64, 0.0f64, 0usize); shots.len()];
    for n in 0..metrics.frames() {
        let time = n as f64 / frame_rate + BUCKET_EPSILON;
        let bucket = shots
            .partition_point(|s| s.end <= time)
            .min(shots.len() - 1);
        let entry = &mut sums[bucket];
        entry.0 += metrics.psnr[n];
        entry.1 += metrics.ssim[n];
        entry.2 += 1;
    }

    let mut per_shot = Vec::with_capacity(shots.len());
    for (shot, (psnr, ssim, frames)) in shots.iter().zip(sums) {
        if frames == 0 {
            return Err(PerShotError::Alignment {
                message: format!(
                    "shot {} [{:.3}s, {:.3}s) has no frames in the metric series",
                    shot.index, shot.start, shot.end
                ),
            });
        }
        per_shot.push(ShotScore {
            shot_index: shot.index,
            psnr: psnr / frames as f64,
            ssim: ssim / frames as f64,
            frames,
        });
    }

    let total: f64 = shots.iter().map(|s| s.duration).sum();
    let weighted = |value: fn(&ShotScore) -> f64| -> f64 {
        per_shot
            .iter()
            .zip(shots)
            .map(|(score, shot)| value(score) * shot.duration)
            .sum::<f64>()
            / total
    };
    let aggregate = AggregateScore {
        psnr: weighted(|s| s.psnr),
        ssim: weighted(|s| s.ssim),
    };

    Ok(QualityReport {
        per_shot,
        aggregate,
    })
}

/// Quality evaluator
pub struct QualityEvaluator {
    meter: Arc<dyn QualityMeter>,
    probe: Arc<dyn MediaProbe>,
    config: EvaluationConfig,
}

impl QualityEvaluator {
    pub fn new(
        meter: Arc<dyn QualityMeter>,
        probe: Arc<dyn MediaProbe>,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            meter,
            probe,
            config,
        }
    }

    /// Compare the assembled output with the source, shot by shot
    pub async fn evaluate(
        &self,
        source: &SourceVideo,
        output: &AssembledOutput,
        shots: &[ShotDescriptor],
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<QualityReport> {
        let source_frames = self.probe.count_frames(&source.path).await?;
        self.check_alignment(source_frames, output.frame_count)?;

        let metrics = self
            .meter
            .measure(&source.path, &output.path, work_dir, cancel)
            .await?;
        self.check_series(&metrics, source_frames)?;

        let report = score_shots(&metrics, shots, source.frame_rate)?;
        info!(
            "Aggregate quality: PSNR {:.2} dB, SSIM {:.4} over {} shot(s)",
            report.aggregate.psnr,
            report.aggregate.ssim,
            report.per_shot.len()
        );
        Ok(report)
    }

    /// Whole-file comparison of two arbitrary files
    pub async fn compare(
        &self,
        reference: &Path,
        distorted: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<QualityReport> {
        let source = self.probe.probe(reference).await?;
        let reference_frames = self.probe.count_frames(reference).await?;
        let distorted_frames = self.probe.count_frames(distorted).await?;
        self.check_alignment(reference_frames, distorted_frames)?;

        let whole = ShotDescriptor {
            index: 0,
            start: 0.0,
            end: source.duration,
            duration: source.duration,
            complexity: 0.5,
            complexity_source: ComplexitySource::DurationFallback,
        };
        let metrics = self.meter.measure(reference, distorted, work_dir, cancel).await?;
        self.check_series(&metrics, reference_frames)?;
        score_shots(&metrics, &[whole], source.frame_rate)
    }

    fn check_alignment(&self, source_frames: u64, output_frames: u64) -> PerShotResult<()> {
        let drift = source_frames.abs_diff(output_frames);
        if drift > self.config.alignment_tolerance_frames {
            return Err(PerShotError::Alignment {
                message: format!(
                    "source has {} frames, output has {} ({} apart, tolerance {})",
                    source_frames, output_frames, drift, self.config.alignment_tolerance_frames
                ),
            });
        }
        Ok(())
    }

    /// The meter must have scored every source frame
    fn check_series(&self, metrics: &FrameMetrics, source_frames: u64) -> PerShotResult<()> {
        let measured = metrics.frames() as u64;
        let drift = measured.abs_diff(source_frames);
        if drift > self.config.alignment_tolerance_frames {
            return Err(PerShotError::Alignment {
                message: format!(
                    "metric series has {} frames, source has {} ({} apart, tolerance {})",
                    measured, source_frames, drift, self.config.alignment_tolerance_frames
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(index: usize, start: f64, end: f64) -> ShotDescriptor {
        ShotDescriptor {
            index,
            start,
            end,
            duration: end - start,
            complexity: 0.5,
            complexity_source: ComplexitySource::Activity,
        }
    }

    #[test]
    fn test_frames_are_bucketed_by_shot() {
        // 10 fps, shots [0,1) [1,3) [3,4)
        let shots = vec![shot(0, 0.0, 1.0), shot(1, 1.0, 3.0), shot(2, 3.0, 4.0)];
        let psnr: Vec<f64> = (0..40)
            .map(|n| if n < 10 { 30.0 } else if n < 30 { 40.0 } else { 50.0 })
            .collect();
        let ssim = vec![0.9; 40];
        let report = score_shots(&FrameMetrics { psnr, ssim }, &shots, 10.0).unwrap();

        let frames: Vec<usize> = report.per_shot.iter().map(|s| s.frames).collect();
        assert_eq!(frames, vec![10, 20, 10]);
        assert_eq!(report.per_shot[0].psnr, 30.0);
        assert_eq!(report.per_shot[1].psnr, 40.0);
        assert_eq!(report.per_shot[2].psnr, 50.0);
        // (30*1 + 40*2 + 50*1) / 4
        assert!((report.aggregate.psnr - 40.0).abs() < 1e-9);
        assert!((report.aggregate.ssim - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_is_duration_weighted() {
        let shots = vec![shot(0, 0.0, 1.0), shot(1, 1.0, 4.0)];
        let psnr: Vec<f64> = (0..4).map(|n| if n < 1 { 20.0 } else { 40.0 }).collect();
        let report = score_shots(
            &FrameMetrics {
                psnr,
                ssim: vec![1.0; 4],
            },
            &shots,
            1.0,
        )
        .unwrap();
        // (20*1 + 40*3) / 4, not the plain mean of 30
        assert!((report.aggregate.psnr - 35.0).abs() < 1e-9);
    }

    #[test]
    fn test_trailing_frames_go_to_last_shot() {
        let shots = vec![shot(0, 0.0, 1.0)];
        let report = score_shots(
            &FrameMetrics {
                psnr: vec![40.0; 11],
                ssim: vec![0.95; 11],
            },
            &shots,
            10.0,
        )
        .unwrap();
        assert_eq!(report.per_shot[0].frames, 11);
    }

    #[test]
    fn test_shot_without_frames_is_alignment_error() {
        let shots = vec![shot(0, 0.0, 1.0), shot(1, 1.0, 2.0)];
        let result = score_shots(
            &FrameMetrics {
                psnr: vec![40.0; 5],
                ssim: vec![0.95; 5],
            },
            &shots,
            10.0,
        );
        assert!(matches!(result, Err(PerShotError::Alignment { .. })));
    }
}
