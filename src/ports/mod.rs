// Ports - Interface definitions for the external collaborators

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::model::*;
use crate::engine::cancel::CancellationToken;
use crate::error::PerShotResult;

/// Port for media file probing
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Probe a media file and describe its primary video stream
    async fn probe(&self, path: &Path) -> PerShotResult<SourceVideo>;

    /// Count decoded video frames exactly
    async fn count_frames(&self, path: &Path) -> PerShotResult<u64>;

    /// Presentation time of the first video frame, in seconds
    async fn start_time(&self, path: &Path) -> PerShotResult<f64>;
}

/// Port for the scene boundary provider
#[async_trait]
pub trait SceneDetector: Send + Sync {
    /// Ordered cut points plus the per-frame activity signal, if any
    async fn detect(
        &self,
        source: &SourceVideo,
        cancel: &CancellationToken,
    ) -> PerShotResult<DetectionResult>;
}

/// Port for the external encode/extract/concat transform
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Run one transform to completion, timeout or cancellation
    async fn run(
        &self,
        request: &TransformRequest,
        cancel: &CancellationToken,
    ) -> Result<TransformOutput, TransformFailure>;
}

/// Port for objective fidelity metrics
#[async_trait]
pub trait QualityMeter: Send + Sync {
    /// Per-frame PSNR and SSIM of `distorted` against `reference`
    async fn measure(
        &self,
        reference: &Path,
        distorted: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<FrameMetrics>;
}

/// Per-frame metric series, index = frame number
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMetrics {
    pub psnr: Vec<f64>,
    pub ssim: Vec<f64>,
}

impl FrameMetrics {
    pub fn frames(&self) -> usize {
        self.psnr.len().min(self.ssim.len())
    }
}

/// Stream properties an encoded clip must keep
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeTarget {
    pub frame_rate: f64,
    pub pixel_format: Option<String>,
    pub has_audio: bool,
    /// Only set by single-pass mode
    pub scale: Option<(u32, u32)>,
}

impl EncodeTarget {
    pub fn from_source(source: &SourceVideo) -> Self {
        Self {
            frame_rate: source.frame_rate,
            pixel_format: source.pixel_format.clone(),
            has_audio: source.has_audio,
            scale: None,
        }
    }
}

/// One external transform invocation
#[derive(Debug, Clone, PartialEq)]
pub enum TransformRequest {
    /// Keyframe-aligned stream copy of `[start, start + duration)`; keeps source timestamps
    CopyChunk {
        input: PathBuf,
        start: f64,
        duration: f64,
        output: PathBuf,
    },
    /// Decode-forward trim to a lossless intermediate
    Trim {
        input: PathBuf,
        offset: f64,
        duration: f64,
        has_audio: bool,
        output: PathBuf,
    },
    /// Encode with the given parameters, optionally over a range of the input
    Encode {
        input: PathBuf,
        range: Option<(f64, f64)>,
        params: EncodeParameters,
        target: EncodeTarget,
        output: PathBuf,
    },
    /// Stream-copy concatenation of an ffconcat list
    Concat { list: PathBuf, output: PathBuf },
}

impl TransformRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            TransformRequest::CopyChunk { .. } => "copy_chunk",
            TransformRequest::Trim { .. } => "trim",
            TransformRequest::Encode { .. } => "encode",
            TransformRequest::Concat { .. } => "concat",
        }
    }

    pub fn output(&self) -> &Path {
        match self {
            TransformRequest::CopyChunk { output, .. }
            | TransformRequest::Trim { output, .. }
            | TransformRequest::Encode { output, .. }
            | TransformRequest::Concat { output, .. } => output,
        }
    }
}

/// Successful transform result
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub output: PathBuf,
    pub elapsed: Duration,
}

/// Typed transform failure. Callers must match on it.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformFailure {
    /// The process could not be started
    Launch(String),
    TimedOut(Duration),
    /// Non-zero exit with the tail of its diagnostics
    Exited { code: Option<i32>, stderr: String },
    Cancelled,
}

impl TransformFailure {
    /// Launch/resource problems only; content errors are never transient
    pub fn is_transient(&self) -> bool {
        matches!(self, TransformFailure::Launch(_))
    }
}

impl fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformFailure::Launch(msg) => write!(f, "failed to launch: {}", msg),
            TransformFailure::TimedOut(after) => write!(f, "timed out after {}s", after.as_secs()),
            TransformFailure::Exited { code, stderr } => match code {
                Some(code) => write!(f, "exited with code {}: {}", code, stderr.trim()),
                None => write!(f, "terminated by signal: {}", stderr.trim()),
            },
            TransformFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}
