//! Per-shot encode with output verification

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::model::*;
use crate::engine::cancel::CancellationToken;
use crate::error::{PerShotError, PerShotResult};
use crate::ports::{EncodeTarget, MediaProbe, TransformFailure, TransformRequest, Transcoder};

/// Frame rates closer than this are the same rate
const FPS_TOLERANCE: f64 = 0.01;

/// Retries granted to launch failures; content errors are never retried
const TRANSIENT_RETRIES: u32 = 1;

/// A verified encoded clip
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedClip {
    pub path: PathBuf,
    pub frame_count: u64,
    pub size_bytes: u64,
}

/// Encodes shots with their computed parameters
pub struct ShotEncoder {
    transcoder: Arc<dyn Transcoder>,
    probe: Arc<dyn MediaProbe>,
}

impl ShotEncoder {
    pub fn new(transcoder: Arc<dyn Transcoder>, probe: Arc<dyn MediaProbe>) -> Self {
        Self { transcoder, probe }
    }

    /// Encode an extracted sub-clip into the shot's private directory
    pub async fn encode(
        &self,
        source: &SourceVideo,
        shot: &ShotDescriptor,
        params: &EncodeParameters,
        clip: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<EncodedClip> {
        let request = TransformRequest::Encode {
            input: clip.to_path_buf(),
            range: None,
            params: params.clone(),
            target: EncodeTarget::from_source(source),
            output: work_dir.join("encoded.mp4"),
        };
        self.run_verified(source, shot.index, &request, cancel).await
    }

    /// Encode the shot straight from the source in one accurate pass.
    /// Used only to fill a shot whose regular pipeline failed.
    pub async fn recover(
        &self,
        source: &SourceVideo,
        shot: &ShotDescriptor,
        params: &EncodeParameters,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<EncodedClip> {
        info!(
            "Shot {}: recovery encode of [{:.3}s, {:.3}s) from source",
            shot.index, shot.start, shot.end
        );
        let request = TransformRequest::Encode {
            input: source.path.clone(),
            range: Some((shot.start, shot.duration)),
            params: params.clone(),
            target: EncodeTarget::from_source(source),
            output: work_dir.join("recovered.mp4"),
        };
        self.run_verified(source, shot.index, &request, cancel).await
    }

    /// Whole-file encode, optionally rescaled
    pub async fn encode_full(
        &self,
        source: &SourceVideo,
        params: &EncodeParameters,
        scale: Option<(u32, u32)>,
        output: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<EncodedClip> {
        let mut target = EncodeTarget::from_source(source);
        target.scale = scale;
        let request = TransformRequest::Encode {
            input: source.path.clone(),
            range: None,
            params: params.clone(),
            target,
            output: output.to_path_buf(),
        };
        self.run_verified(source, 0, &request, cancel).await
    }

    async fn run_verified(
        &self,
        source: &SourceVideo,
        shot_index: usize,
        request: &TransformRequest,
        cancel: &CancellationToken,
    ) -> PerShotResult<EncodedClip> {
        let mut attempt = 0;
        loop {
            match self.transcoder.run(request, cancel).await {
                Ok(done) => {
                    debug!(
                        "Shot {}: encode finished in {:.1}s",
                        shot_index,
                        done.elapsed.as_secs_f64()
                    );
                    break;
                }
                Err(TransformFailure::Cancelled) => return Err(PerShotError::Cancelled),
                Err(failure) if failure.is_transient() && attempt < TRANSIENT_RETRIES => {
                    attempt += 1;
                    warn!(
                        "Shot {}: transient encode failure, retrying ({}): {}",
                        shot_index, attempt, failure
                    );
                }
                Err(failure) => {
                    return Err(PerShotError::Encode {
                        shot_index,
                        transient: failure.is_transient(),
                        cause: failure.to_string(),
                    })
                }
            }
        }

        let expected = match request {
            TransformRequest::Encode { target, .. } => target.scale,
            _ => None,
        };
        self.verify(source, shot_index, request.output(), expected).await
    }

    /// Output exists, is non-empty and keeps the source geometry, cadence and pixel format
    async fn verify(
        &self,
        source: &SourceVideo,
        shot_index: usize,
        path: &Path,
        scale: Option<(u32, u32)>,
    ) -> PerShotResult<EncodedClip> {
        let content_error = |cause: String| PerShotError::Encode {
            shot_index,
            transient: false,
            cause,
        };

        let size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        if size_bytes == 0 {
            return Err(content_error(format!(
                "output {} is missing or empty",
                path.display()
            )));
        }

        let encoded = self
            .probe
            .probe(path)
            .await
            .map_err(|e| content_error(format!("output is not readable: {}", e)))?;
        let (width, height) = scale.unwrap_or((source.width, source.height));
        if (encoded.width, encoded.height) != (width, height) {
            return Err(content_error(format!(
                "resolution {}x{} does not match expected {}x{}",
                encoded.width, encoded.height, width, height
            )));
        }
        if (encoded.frame_rate - source.frame_rate).abs() > FPS_TOLERANCE {
            return Err(content_error(format!(
                "frame rate {:.3} does not match source {:.3}",
                encoded.frame_rate, source.frame_rate
            )));
        }
        if let (Some(expected), Some(actual)) = (&source.pixel_format, &encoded.pixel_format) {
            if expected != actual {
                return Err(content_error(format!(
                    "pixel format {} does not match source {}",
                    actual, expected
                )));
            }
        }

        let frame_count = self
            .probe
            .count_frames(path)
            .await
            .map_err(|e| content_error(format!("cannot count frames: {}", e)))?;

        Ok(EncodedClip {
            path: path.to_path_buf(),
            frame_count,
            size_bytes,
        })
    }
}
