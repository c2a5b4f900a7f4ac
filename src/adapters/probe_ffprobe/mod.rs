//! FFprobe adapter for media file probing

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::adapters::process::{run_captured, ProcessSpec};
use crate::domain::model::SourceVideo;
use crate::error::{PerShotError, PerShotResult};
use crate::ports::MediaProbe;

/// Probing a header never needs the full encode timeout
const PROBE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    size: Option<String>,
    #[serde(default)]
    format_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    pix_fmt: Option<String>,
    #[serde(default)]
    nb_frames: Option<String>,
    #[serde(default)]
    nb_read_frames: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    streams: Option<Vec<FfprobeStream>>,
}

impl FfprobeOutput {
    fn video_stream(&self) -> Option<&FfprobeStream> {
        self.streams
            .as_ref()
            .and_then(|streams| streams.iter().find(|s| s.codec_type.as_deref() == Some("video")))
    }
}

/// Parse "30000/1001" style rates; "0/0" is None
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split('/').collect();
    let rate = match parts.as_slice() {
        [num, den] => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        [value] => value.trim().parse().ok()?,
        _ => return None,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn parse_number<T: std::str::FromStr>(value: Option<&String>) -> Option<T> {
    value.and_then(|s| s.trim().parse::<T>().ok())
}

/// Parse `-show_format -show_streams` JSON into a [`SourceVideo`]
pub fn parse_source_video(path: &Path, json: &str) -> PerShotResult<SourceVideo> {
    let probe_error = |message: String| PerShotError::Probe {
        path: path.display().to_string(),
        message,
    };
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| probe_error(format!("failed to parse ffprobe JSON: {}", e)))?;

    let video = output
        .video_stream()
        .ok_or_else(|| probe_error("no video stream".to_string()))?;
    let has_audio = output
        .streams
        .as_ref()
        .map_or(false, |s| s.iter().any(|s| s.codec_type.as_deref() == Some("audio")));

    let format = output.format.as_ref();
    let duration = parse_number::<f64>(format.and_then(|f| f.duration.as_ref()))
        .or_else(|| parse_number::<f64>(video.duration.as_ref()))
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| probe_error("unknown or zero duration".to_string()))?;

    // avg_frame_rate reflects the real cadence; r_frame_rate can be a timebase guess
    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .ok_or_else(|| probe_error("unknown frame rate".to_string()))?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(probe_error("unknown resolution".to_string())),
    };

    let container = format
        .and_then(|f| f.format_name.as_deref())
        .and_then(|name| name.split(',').next())
        .unwrap_or("unknown")
        .to_string();
    let size_bytes = parse_number::<u64>(format.and_then(|f| f.size.as_ref()))
        .or_else(|| std::fs::metadata(path).ok().map(|m| m.len()))
        .unwrap_or(0);

    Ok(SourceVideo {
        path: path.to_path_buf(),
        duration,
        frame_rate,
        width,
        height,
        container,
        pixel_format: video.pix_fmt.clone(),
        frame_count: parse_number::<u64>(video.nb_frames.as_ref()).filter(|n| *n > 0),
        has_audio,
        size_bytes,
    })
}

/// Parse `-count_frames` output
pub fn parse_frame_count(path: &Path, json: &str) -> PerShotResult<u64> {
    let output: FfprobeOutput = serde_json::from_str(json)?;
    output
        .video_stream()
        .and_then(|s| parse_number::<u64>(s.nb_read_frames.as_ref()))
        .ok_or_else(|| PerShotError::Probe {
            path: path.display().to_string(),
            message: "frame count unavailable".to_string(),
        })
}

/// First video frame time, falling back to the container start, then 0
pub fn parse_start_time(json: &str) -> PerShotResult<f64> {
    let output: FfprobeOutput = serde_json::from_str(json)?;
    let stream_start = output
        .video_stream()
        .and_then(|s| parse_number::<f64>(s.start_time.as_ref()));
    let format_start = output
        .format
        .as_ref()
        .and_then(|f| parse_number::<f64>(f.start_time.as_ref()));
    Ok(stream_start
        .or(format_start)
        .filter(|t| t.is_finite())
        .unwrap_or(0.0))
}

/// FFprobe-based probe adapter
pub struct FfprobeProbe {
    ffprobe_path: PathBuf,
    count_timeout: Duration,
}

impl FfprobeProbe {
    /// `count_timeout` bounds the full-decode frame count
    pub fn new(ffprobe_path: PathBuf, count_timeout: Duration) -> Self {
        Self {
            ffprobe_path,
            count_timeout,
        }
    }

    async fn run_json(&self, path: &Path, args: &[&str], timeout: Duration) -> PerShotResult<String> {
        if !path.exists() {
            return Err(PerShotError::InputFileNotFound {
                path: path.display().to_string(),
            });
        }
        let mut full: Vec<String> = ["-v", "error", "-print_format", "json"]
            .iter()
            .chain(args.iter())
            .map(|s| s.to_string())
            .collect();
        full.push(path.to_string_lossy().into_owned());

        let (output, _) = run_captured(
            ProcessSpec {
                program: &self.ffprobe_path,
                args: &full,
                timeout,
                current_dir: None,
            },
            None,
        )
        .await
        .map_err(|failure| PerShotError::Probe {
            path: path.display().to_string(),
            message: format!("ffprobe {}", failure),
        })?;

        String::from_utf8(output.stdout).map_err(|_| PerShotError::Probe {
            path: path.display().to_string(),
            message: "ffprobe output was not valid UTF-8".to_string(),
        })
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> PerShotResult<SourceVideo> {
        debug!("Probing {}", path.display());
        let json = self
            .run_json(path, &["-show_format", "-show_streams"], PROBE_TIMEOUT)
            .await?;
        parse_source_video(path, &json)
    }

    async fn count_frames(&self, path: &Path) -> PerShotResult<u64> {
        let json = self
            .run_json(
                path,
                &[
                    "-count_frames",
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=codec_type,nb_read_frames",
                ],
                self.count_timeout,
            )
            .await?;
        let frames = parse_frame_count(path, &json)?;
        debug!("{} has {} frames", path.display(), frames);
        Ok(frames)
    }

    async fn start_time(&self, path: &Path) -> PerShotResult<f64> {
        let json = self
            .run_json(
                path,
                &[
                    "-select_streams",
                    "v:0",
                    "-show_entries",
                    "stream=codec_type,start_time:format=start_time",
                ],
                PROBE_TIMEOUT,
            )
            .await?;
        parse_start_time(&json)
    }
}
