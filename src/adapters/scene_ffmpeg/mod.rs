//! Scene boundary detection over ffmpeg's scene-change score

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::process::{run_captured, ProcessSpec};
use crate::domain::model::{ActivitySample, CutPoint, DetectionResult, SourceVideo};
use crate::engine::cancel::CancellationToken;
use crate::error::{PerShotError, PerShotResult};
use crate::ports::{SceneDetector, TransformFailure};

/// Detector tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SceneDetectorSettings {
    pub ffmpeg_path: PathBuf,
    /// Score above which a frame opens a new shot
    pub threshold: f64,
    pub analysis_width: u32,
    /// Cuts closer than this to the previous cut (or an edge) are ignored
    pub min_gap_secs: f64,
    pub timeout: Duration,
}

/// Scores every frame with `select=gte(scene,0)` and reads them back from `metadata=print`
pub struct FfmpegSceneDetector {
    settings: SceneDetectorSettings,
}

impl FfmpegSceneDetector {
    pub fn new(settings: SceneDetectorSettings) -> Self {
        Self { settings }
    }

    fn filter_graph(&self) -> String {
        format!(
            "scale={}:-2,select='gte(scene,0)',metadata=print:file=-",
            self.settings.analysis_width
        )
    }
}

/// Parse `metadata=print` output into per-frame activity samples.
///
/// The filter prints one header per frame followed by its keys:
/// ```text
/// frame:41   pts:42042   pts_time:1.4014
/// lavfi.scene_score=0.012345
/// ```
pub fn parse_scene_scores(text: &str) -> Vec<ActivitySample> {
    let mut samples = Vec::new();
    let mut current_pts: Option<f64> = None;

    for line in text.lines() {
        if let Some((_, rest)) = line.split_once("pts_time:") {
            current_pts = rest
                .split_whitespace()
                .next()
                .and_then(|t| t.parse::<f64>().ok());
        } else if let Some((_, value)) = line.split_once("lavfi.scene_score=") {
            if let (Some(time), Ok(score)) = (current_pts.take(), value.trim().parse::<f64>()) {
                if time.is_finite() && score.is_finite() {
                    samples.push(ActivitySample { time, score });
                }
            }
        }
    }
    samples
}

/// Pick cuts from scored frames, suppressing cuts that would create micro-shots
pub fn select_cuts(
    activity: &[ActivitySample],
    threshold: f64,
    min_gap_secs: f64,
    duration: f64,
    frame_rate: f64,
) -> Vec<CutPoint> {
    let mut cuts: Vec<CutPoint> = Vec::new();
    let mut last_edge = 0.0;

    for sample in activity.iter().filter(|s| s.score > threshold) {
        if sample.time - last_edge < min_gap_secs || duration - sample.time < min_gap_secs {
            debug!(
                "Ignoring cut at {:.3}s (score {:.3}) within {:.3}s of a boundary",
                sample.time, sample.score, min_gap_secs
            );
            continue;
        }
        cuts.push(CutPoint {
            time: sample.time,
            frame: (frame_rate > 0.0).then(|| (sample.time * frame_rate).round() as u64),
            score: Some(sample.score),
        });
        last_edge = sample.time;
    }
    cuts
}

#[async_trait]
impl SceneDetector for FfmpegSceneDetector {
    async fn detect(
        &self,
        source: &SourceVideo,
        cancel: &CancellationToken,
    ) -> PerShotResult<DetectionResult> {
        info!(
            "Detecting scenes in {} (threshold {:.2})",
            source.path.display(),
            self.settings.threshold
        );
        let args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            source.path.to_string_lossy().into_owned(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-vf".to_string(),
            self.filter_graph(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        let (output, elapsed) = run_captured(
            ProcessSpec {
                program: &self.settings.ffmpeg_path,
                args: &args,
                timeout: self.settings.timeout,
                current_dir: None,
            },
            Some(cancel),
        )
        .await
        .map_err(|failure| match failure {
            TransformFailure::Cancelled => PerShotError::Cancelled,
            other => PerShotError::Detection {
                message: other.to_string(),
            },
        })?;

        let activity = parse_scene_scores(&String::from_utf8_lossy(&output.stdout));
        let cuts = select_cuts(
            &activity,
            self.settings.threshold,
            self.settings.min_gap_secs,
            source.duration,
            source.frame_rate,
        );
        info!(
            "Scored {} frames, found {} cut(s) in {:.1}s",
            activity.len(),
            cuts.len(),
            elapsed.as_secs_f64()
        );
        Ok(DetectionResult { cuts, activity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata_print() {
        let text = "\
frame:0    pts:1001   pts_time:0.0417083
lavfi.scene_score=0.001200
frame:1    pts:2002   pts_time:0.0834167
lavfi.scene_score=0.520000
frame:2    pts:3003   pts_time:0.125125
lavfi.scene_score=nan
garbage line
";
        let samples = parse_scene_scores(text);
        assert_eq!(samples.len(), 2);
        assert!((samples[0].time - 0.0417083).abs() < 1e-9);
        assert_eq!(samples[1].score, 0.52);
    }

    #[test]
    fn test_select_cuts_respects_threshold_and_gap() {
        let activity = vec![
            ActivitySample { time: 0.2, score: 0.9 },
            ActivitySample { time: 2.0, score: 0.8 },
            ActivitySample { time: 2.2, score: 0.7 },
            ActivitySample { time: 4.0, score: 0.1 },
            ActivitySample { time: 7.0, score: 0.4 },
            ActivitySample { time: 9.8, score: 0.9 },
        ];
        let cuts = select_cuts(&activity, 0.3, 0.5, 10.0, 25.0);
        let times: Vec<f64> = cuts.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![2.0, 7.0]);
        assert_eq!(cuts[0].frame, Some(50));
        assert_eq!(cuts[1].score, Some(0.4));
    }
}
