// Domain models - Core types and data structures

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PerShotError, PerShotResult};

/// Time specification with precision - represents time in seconds with fractional precision
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeSpec {
    pub seconds: f64,
}

impl TimeSpec {
    /// Create a new TimeSpec from seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self { seconds }
    }

    /// Format as H:MM:SS.mmm or M:SS.mmm
    pub fn format_hms(&self) -> String {
        let total_ms = (self.seconds.max(0.0) * 1000.0).round() as u64;
        let hours = total_ms / 3_600_000;
        let minutes = (total_ms % 3_600_000) / 60_000;
        let seconds = (total_ms % 60_000) / 1000;
        let millis = total_ms % 1000;

        if hours > 0 {
            format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
        } else {
            format!("{}:{:02}.{:03}", minutes, seconds, millis)
        }
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_hms())
    }
}

/// Probed source video. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVideo {
    pub path: PathBuf,
    /// Duration in seconds
    pub duration: f64,
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
    /// First entry of the container's format name list (e.g. "mov", "matroska")
    pub container: String,
    pub pixel_format: Option<String>,
    pub frame_count: Option<u64>,
    pub has_audio: bool,
    pub size_bytes: u64,
}

impl SourceVideo {
    /// Frame count, estimated from duration when the probe did not report one
    pub fn expected_frames(&self) -> u64 {
        self.frame_count
            .unwrap_or_else(|| (self.duration * self.frame_rate).round() as u64)
    }
}

/// Shot boundary reported by the scene detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutPoint {
    /// Seconds from the start of the source
    pub time: f64,
    pub frame: Option<u64>,
    /// Detector confidence for the cut, if any
    pub score: Option<f64>,
}

impl CutPoint {
    pub fn at(time: f64) -> Self {
        Self {
            time,
            frame: None,
            score: None,
        }
    }
}

/// Per-frame change score emitted by the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivitySample {
    pub time: f64,
    pub score: f64,
}

/// Everything the scene boundary provider returns for one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub cuts: Vec<CutPoint>,
    pub activity: Vec<ActivitySample>,
}

/// Where a shot's complexity score came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexitySource {
    Activity,
    DurationFallback,
}

/// One shot of the plan: a half-open interval `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotDescriptor {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub duration: f64,
    /// Normalised to [0, 1]
    pub complexity: f64,
    pub complexity_source: ComplexitySource,
}

/// Encoder speed/efficiency preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl Preset {
    /// Parse preset from string
    pub fn parse(preset_str: &str) -> PerShotResult<Self> {
        match preset_str.trim().to_lowercase().as_str() {
            "ultrafast" => Ok(Preset::Ultrafast),
            "superfast" => Ok(Preset::Superfast),
            "veryfast" => Ok(Preset::Veryfast),
            "faster" => Ok(Preset::Faster),
            "fast" => Ok(Preset::Fast),
            "medium" => Ok(Preset::Medium),
            "slow" => Ok(Preset::Slow),
            "slower" => Ok(Preset::Slower),
            "veryslow" => Ok(Preset::Veryslow),
            other => Err(PerShotError::Config {
                message: format!("unknown preset '{}'", other),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::Ultrafast => "ultrafast",
            Preset::Superfast => "superfast",
            Preset::Veryfast => "veryfast",
            Preset::Faster => "faster",
            Preset::Fast => "fast",
            Preset::Medium => "medium",
            Preset::Slow => "slow",
            Preset::Slower => "slower",
            Preset::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode parameters for one shot. Computed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeParameters {
    pub quality_param: f64,
    pub preset: Preset,
    pub extra_flags: BTreeMap<String, String>,
}

/// Named seek strategy for sub-clip extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekStrategy {
    /// Keyframe-aligned stream copy, then accurate decode-forward trim
    DualStage,
    /// Single accurate decode pass over the requested range
    AccurateOnly,
}

impl SeekStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            SeekStrategy::DualStage => "dual_stage",
            SeekStrategy::AccurateOnly => "accurate_only",
        }
    }

    pub fn parse(name: &str) -> PerShotResult<Self> {
        match name.trim().to_lowercase().replace('-', "_").as_str() {
            "dual_stage" => Ok(SeekStrategy::DualStage),
            "accurate_only" => Ok(SeekStrategy::AccurateOnly),
            other => Err(PerShotError::Config {
                message: format!("unknown seek strategy '{}'", other),
            }),
        }
    }
}

impl fmt::Display for SeekStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Recorded outcome of one seek strategy attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub strategy: SeekStrategy,
    pub outcome: AttemptOutcome,
}

impl fmt::Display for StrategyAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Succeeded => write!(f, "{}: ok", self.strategy),
            AttemptOutcome::Failed(reason) => write!(f, "{}: {}", self.strategy, reason),
        }
    }
}

/// Per-shot job lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Extracting,
    Extracted,
    Encoding,
    Encoded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Encoded | JobStatus::Failed)
    }

    /// Allowed forward transitions. A failed shot may be re-queued once for its retry.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Extracting)
                | (Pending, Encoding)
                | (Extracting, Extracted)
                | (Extracted, Encoding)
                | (Encoding, Encoded)
                | (Failed, Pending)
                | (Pending | Extracting | Extracted | Encoding, Failed)
        )
    }
}

/// Work item for one shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotJob {
    pub descriptor: ShotDescriptor,
    pub params: EncodeParameters,
    pub extraction_strategy_used: Option<SeekStrategy>,
    pub attempts: Vec<StrategyAttempt>,
    pub status: JobStatus,
    pub output_artifact: Option<PathBuf>,
    pub frame_count: Option<u64>,
    pub failure: Option<String>,
    /// Filled by the recovery encode after a tolerated failure
    pub recovered: bool,
    pub tries: u32,
}

impl ShotJob {
    pub fn new(descriptor: ShotDescriptor, params: EncodeParameters) -> Self {
        Self {
            descriptor,
            params,
            extraction_strategy_used: None,
            attempts: Vec::new(),
            status: JobStatus::Pending,
            output_artifact: None,
            frame_count: None,
            failure: None,
            recovered: false,
            tries: 0,
        }
    }

    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow
    pub fn transition(&mut self, next: JobStatus) -> PerShotResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(PerShotError::InvalidPlan {
                message: format!(
                    "shot {} cannot move from {:?} to {:?}",
                    self.index(),
                    self.status,
                    next
                ),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// The concatenated result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledOutput {
    pub path: PathBuf,
    pub frame_count: u64,
    pub duration: f64,
    pub size_bytes: u64,
}

/// Fidelity of one shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotScore {
    pub shot_index: usize,
    pub psnr: f64,
    pub ssim: f64,
    pub frames: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateScore {
    pub psnr: f64,
    pub ssim: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub per_shot: Vec<ShotScore>,
    /// Duration-weighted mean of the per-shot scores
    pub aggregate: AggregateScore,
}

/// Overall run lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Detecting,
    Planning,
    Processing,
    Assembling,
    Evaluating,
    Done,
    Failed,
}

/// Per-shot line of the run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotSummary {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub complexity: f64,
    pub quality_param: f64,
    pub preset: Preset,
    pub strategy: Option<SeekStrategy>,
    /// Every extraction strategy tried, in order
    pub attempts: Vec<StrategyAttempt>,
    pub status: JobStatus,
    pub failure: Option<String>,
    pub recovered: bool,
}

impl From<&ShotJob> for ShotSummary {
    fn from(job: &ShotJob) -> Self {
        Self {
            index: job.descriptor.index,
            start: job.descriptor.start,
            end: job.descriptor.end,
            complexity: job.descriptor.complexity,
            quality_param: job.params.quality_param,
            preset: job.params.preset,
            strategy: job.extraction_strategy_used,
            attempts: job.attempts.clone(),
            status: job.status,
            failure: job.failure.clone(),
            recovered: job.recovered,
        }
    }
}

/// Input/output size comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeReport {
    pub original_size: u64,
    pub output_size: u64,
    pub savings_percent: f64,
}

impl SizeReport {
    pub fn new(original_size: u64, output_size: u64) -> Self {
        let savings_percent = if original_size > 0 {
            (1.0 - output_size as f64 / original_size as f64) * 100.0
        } else {
            0.0
        };
        Self {
            original_size,
            output_size,
            savings_percent,
        }
    }
}

/// Full outcome of a successful run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub elapsed_secs: f64,
    pub states: Vec<RunState>,
    pub shots: Vec<ShotSummary>,
    pub output_info: AssembledOutput,
    /// Absent when evaluation was skipped (rescaled single-pass output)
    pub quality: Option<QualityReport>,
    pub sizes: SizeReport,
}

impl RunReport {
    /// Shots that failed at least once, including recovered ones
    pub fn shot_failures(&self) -> Vec<&ShotSummary> {
        self.shots.iter().filter(|s| s.failure.is_some()).collect()
    }
}
