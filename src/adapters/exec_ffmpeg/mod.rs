//! FFmpeg execution adapter
//!
//! Turns [`TransformRequest`]s into ffmpeg command lines and runs them as
//! child processes with the configured timeout.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::adapters::process::{run_captured, ProcessSpec};
use crate::config::EncoderConfig;
use crate::engine::cancel::CancellationToken;
use crate::ports::*;

/// Seconds with microsecond precision, the way ffmpeg parses them
fn secs(value: f64) -> String {
    format!("{:.6}", value.max(0.0))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// FFmpeg-based transform adapter
pub struct FfmpegTranscoder {
    config: EncoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    /// Full argument list for a request, without the program name
    pub fn build_args(&self, request: &TransformRequest) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut push = |items: &[&str]| args.extend(items.iter().map(|s| s.to_string()));

        match request {
            TransformRequest::CopyChunk {
                input,
                start,
                duration,
                output,
            } => {
                // Input-side seek lands on the keyframe at or before `start`;
                // source timestamps are kept so the real chunk start can be probed.
                push(&["-ss", &secs(*start), "-t", &secs(*duration), "-copyts"]);
                push(&["-i", &path_arg(input)]);
                push(&["-map", "0:v:0", "-map", "0:a?", "-c", "copy"]);
                push(&["-avoid_negative_ts", "disabled", &path_arg(output)]);
            }
            TransformRequest::Trim {
                input,
                offset,
                duration,
                has_audio,
                output,
            } => {
                // Output-side seek decodes forward to the exact frame.
                push(&["-i", &path_arg(input)]);
                push(&["-ss", &secs(*offset), "-t", &secs(*duration)]);
                push(&["-map", "0:v:0", "-c:v", "ffv1", "-level", "3"]);
                if *has_audio {
                    push(&["-map", "0:a:0?", "-c:a", "pcm_s16le"]);
                } else {
                    push(&["-an"]);
                }
                push(&["-sn", "-dn", "-f", "matroska", &path_arg(output)]);
            }
            TransformRequest::Encode {
                input,
                range,
                params,
                target,
                output,
            } => {
                push(&["-i", &path_arg(input)]);
                if let Some((start, duration)) = range {
                    push(&["-ss", &secs(*start), "-t", &secs(*duration)]);
                }
                push(&["-map", "0:v:0"]);
                push(&["-c:v", &self.config.video_codec]);
                push(&["-crf", &format!("{:.1}", params.quality_param)]);
                push(&["-preset", params.preset.as_str()]);
                for (key, value) in &params.extra_flags {
                    let flag = format!("-{}", key.trim_start_matches('-'));
                    push(&[&flag, value]);
                }
                if let Some(pix_fmt) = &target.pixel_format {
                    push(&["-pix_fmt", pix_fmt]);
                }
                if let Some((width, height)) = target.scale {
                    push(&["-vf", &format!("scale={}:{}", width, height)]);
                }
                if target.frame_rate > 0.0 {
                    push(&["-r", &format!("{}", target.frame_rate), "-fps_mode", "cfr"]);
                }
                if target.has_audio {
                    push(&["-map", "0:a:0?", "-c:a", &self.config.audio_codec]);
                    push(&["-b:a", &self.config.audio_bitrate]);
                    push(&["-ar", &self.config.audio_sample_rate.to_string()]);
                } else {
                    push(&["-an"]);
                }
                push(&[
                    "-sn",
                    "-dn",
                    "-video_track_timescale",
                    &self.config.video_track_timescale.to_string(),
                    &path_arg(output),
                ]);
            }
            TransformRequest::Concat { list, output } => {
                push(&["-fflags", "+genpts", "-f", "concat", "-safe", "0"]);
                push(&["-i", &path_arg(list)]);
                push(&["-map", "0", "-c", "copy"]);
                push(&["-avoid_negative_ts", "make_zero", &path_arg(output)]);
            }
        }
        args
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn run(
        &self,
        request: &TransformRequest,
        cancel: &CancellationToken,
    ) -> Result<TransformOutput, TransformFailure> {
        let args = self.build_args(request);
        debug!("ffmpeg {} -> {}", request.kind(), request.output().display());

        let (_, elapsed) = run_captured(
            ProcessSpec {
                program: &self.config.ffmpeg_path,
                args: &args,
                timeout: self.timeout(),
                current_dir: None,
            },
            Some(cancel),
        )
        .await?;

        Ok(TransformOutput {
            output: request.output().to_path_buf(),
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{EncodeParameters, Preset};
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn position(args: &[String], flag: &str) -> usize {
        args.iter()
            .position(|a| a == flag)
            .unwrap_or_else(|| panic!("missing {flag} in {args:?}"))
    }

    fn value_of<'a>(args: &'a [String], flag: &str) -> &'a str {
        &args[position(args, flag) + 1]
    }

    #[test]
    fn test_copy_chunk_seeks_on_input() {
        let transcoder = FfmpegTranscoder::new(EncoderConfig::default());
        let args = transcoder.build_args(&TransformRequest::CopyChunk {
            input: PathBuf::from("in.mov"),
            start: 2.0,
            duration: 9.5,
            output: PathBuf::from("chunk.mkv"),
        });
        assert!(position(&args, "-ss") < position(&args, "-i"));
        assert!(args.contains(&"-copyts".to_string()));
        assert_eq!(value_of(&args, "-ss"), "2.000000");
        assert_eq!(value_of(&args, "-c"), "copy");
        assert_eq!(args.last().map(String::as_str), Some("chunk.mkv"));
    }

    #[test]
    fn test_trim_seeks_on_output_losslessly() {
        let transcoder = FfmpegTranscoder::new(EncoderConfig::default());
        let args = transcoder.build_args(&TransformRequest::Trim {
            input: PathBuf::from("chunk.mkv"),
            offset: 5.04,
            duration: 3.0,
            has_audio: false,
            output: PathBuf::from("clip.mkv"),
        });
        assert!(position(&args, "-ss") > position(&args, "-i"));
        assert_eq!(value_of(&args, "-c:v"), "ffv1");
        assert!(args.contains(&"-an".to_string()));
    }

    #[test]
    fn test_encode_carries_parameters() {
        let transcoder = FfmpegTranscoder::new(EncoderConfig::default());
        let mut extra_flags = BTreeMap::new();
        extra_flags.insert("tune".to_string(), "film".to_string());
        let args = transcoder.build_args(&TransformRequest::Encode {
            input: PathBuf::from("clip.mkv"),
            range: None,
            params: EncodeParameters {
                quality_param: 21.5,
                preset: Preset::Slow,
                extra_flags,
            },
            target: EncodeTarget {
                frame_rate: 25.0,
                pixel_format: Some("yuv420p".to_string()),
                has_audio: true,
                scale: None,
            },
            output: PathBuf::from("encoded.mp4"),
        });
        assert_eq!(value_of(&args, "-c:v"), "libx264");
        assert_eq!(value_of(&args, "-crf"), "21.5");
        assert_eq!(value_of(&args, "-preset"), "slow");
        assert_eq!(value_of(&args, "-tune"), "film");
        assert_eq!(value_of(&args, "-pix_fmt"), "yuv420p");
        assert_eq!(value_of(&args, "-r"), "25");
        assert_eq!(value_of(&args, "-c:a"), "aac");
        assert_eq!(value_of(&args, "-ar"), "48000");
        assert_eq!(value_of(&args, "-video_track_timescale"), "90000");
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"-ss".to_string()));
    }

    #[test]
    fn test_concat_is_stream_copy() {
        let transcoder = FfmpegTranscoder::new(EncoderConfig::default());
        let args = transcoder.build_args(&TransformRequest::Concat {
            list: PathBuf::from("list.ffconcat"),
            output: PathBuf::from("out.mp4"),
        });
        assert_eq!(value_of(&args, "-f"), "concat");
        assert_eq!(value_of(&args, "-c"), "copy");
        assert_eq!(value_of(&args, "-fflags"), "+genpts");
        assert_eq!(value_of(&args, "-avoid_negative_ts"), "make_zero");
        assert!(position(&args, "-fflags") < position(&args, "-i"));
    }
}
