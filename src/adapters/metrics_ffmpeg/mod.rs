//! PSNR/SSIM measurement with ffmpeg's `psnr` and `ssim` filters

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::adapters::process::{run_captured, ProcessSpec};
use crate::engine::cancel::CancellationToken;
use crate::error::{PerShotError, PerShotResult};
use crate::ports::{FrameMetrics, QualityMeter, TransformFailure};

const PSNR_STATS: &str = "psnr_stats.log";
const SSIM_STATS: &str = "ssim_stats.log";

/// Both inputs are rebased to zero so frame n of one meets frame n of the other
fn filter_graph() -> String {
    format!(
        "[0:v]settb=AVTB,setpts=PTS-STARTPTS,split=2[d0][d1];\
         [1:v]settb=AVTB,setpts=PTS-STARTPTS,split=2[r0][r1];\
         [d0][r0]psnr=stats_file={}[p];\
         [d1][r1]ssim=stats_file={}[s]",
        PSNR_STATS, SSIM_STATS
    )
}

/// Value of `key:` in a stats line
fn field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.split_whitespace()
        .find_map(|token| token.strip_prefix(key)?.strip_prefix(':'))
}

/// Per-frame `psnr_avg`, with infinite values capped
pub fn parse_psnr_stats(text: &str, cap: f64) -> Vec<f64> {
    text.lines()
        .filter_map(|line| field(line, "psnr_avg"))
        .filter_map(|value| value.parse::<f64>().ok())
        .map(|psnr| if psnr.is_nan() { cap } else { psnr.min(cap) })
        .collect()
}

/// Per-frame combined SSIM (`All:`)
pub fn parse_ssim_stats(text: &str) -> Vec<f64> {
    text.lines()
        .filter_map(|line| field(line, "All"))
        .filter_map(|value| value.parse::<f64>().ok())
        .collect()
}

/// FFmpeg-based quality meter
pub struct FfmpegQualityMeter {
    ffmpeg_path: PathBuf,
    psnr_cap: f64,
    timeout: Duration,
}

impl FfmpegQualityMeter {
    pub fn new(ffmpeg_path: PathBuf, psnr_cap: f64, timeout: Duration) -> Self {
        Self {
            ffmpeg_path,
            psnr_cap,
            timeout,
        }
    }
}

#[async_trait]
impl QualityMeter for FfmpegQualityMeter {
    async fn measure(
        &self,
        reference: &Path,
        distorted: &Path,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> PerShotResult<FrameMetrics> {
        info!(
            "Measuring PSNR/SSIM of {} against {}",
            distorted.display(),
            reference.display()
        );
        std::fs::create_dir_all(work_dir)?;
        let absolute = |p: &Path| -> PerShotResult<String> {
            Ok(std::fs::canonicalize(p)?.to_string_lossy().into_owned())
        };
        // Stats file names are relative to work_dir; filter option escaping stays trivial.
        let args = vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            absolute(distorted)?,
            "-i".to_string(),
            absolute(reference)?,
            "-filter_complex".to_string(),
            filter_graph(),
            "-map".to_string(),
            "[p]".to_string(),
            "-map".to_string(),
            "[s]".to_string(),
            "-f".to_string(),
            "null".to_string(),
            "-".to_string(),
        ];

        run_captured(
            ProcessSpec {
                program: &self.ffmpeg_path,
                args: &args,
                timeout: self.timeout,
                current_dir: Some(work_dir),
            },
            Some(cancel),
        )
        .await
        .map_err(|failure| match failure {
            TransformFailure::Cancelled => PerShotError::Cancelled,
            other => PerShotError::Metrics {
                message: other.to_string(),
            },
        })?;

        let psnr = parse_psnr_stats(
            &std::fs::read_to_string(work_dir.join(PSNR_STATS))?,
            self.psnr_cap,
        );
        let ssim = parse_ssim_stats(&std::fs::read_to_string(work_dir.join(SSIM_STATS))?);
        if psnr.len() != ssim.len() {
            return Err(PerShotError::Metrics {
                message: format!(
                    "metric series differ in length: {} PSNR vs {} SSIM frames",
                    psnr.len(),
                    ssim.len()
                ),
            });
        }
        debug!("Measured {} frames", psnr.len());
        Ok(FrameMetrics { psnr, ssim })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_psnr_caps_infinity() {
        let text = "\
n:1 mse_avg:0.00 mse_y:0.00 mse_u:0.00 mse_v:0.00 psnr_avg:inf psnr_y:inf psnr_u:inf psnr_v:inf
n:2 mse_avg:1.52 mse_y:1.90 mse_u:0.70 mse_v:0.81 psnr_avg:46.31 psnr_y:45.34 psnr_u:49.68 psnr_v:49.05
";
        assert_eq!(parse_psnr_stats(text, 100.0), vec![100.0, 46.31]);
    }

    #[test]
    fn test_parse_ssim_all_column() {
        let text = "\
n:1 Y:0.991234 U:0.995000 V:0.996000 All:0.992876 (21.473)
n:2 Y:1.000000 U:1.000000 V:1.000000 All:1.000000 (inf)
";
        assert_eq!(parse_ssim_stats(text), vec![0.992876, 1.0]);
    }

    #[test]
    fn test_field_lookup_is_exact() {
        let line = "n:3 mse_avg:2.0 psnr_avg:40.0";
        assert_eq!(field(line, "psnr_avg"), Some("40.0"));
        assert_eq!(field(line, "avg"), None);
        assert_eq!(field(line, "n"), Some("3"));
    }
}
