//! Human-readable summaries and JSON report files

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::model::*;
use crate::error::PerShotResult;
use crate::utils::Utils;

/// Shot plan without encoding, as printed by `pershot plan`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub source: SourceVideo,
    pub shots: Vec<PlannedShot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedShot {
    pub descriptor: ShotDescriptor,
    pub params: EncodeParameters,
    pub strategies: Vec<SeekStrategy>,
}

pub fn render_plan(plan: &PlanReport) -> String {
    let source = &plan.source;
    let mut out = String::new();
    let _ = writeln!(out, "Shot Plan");
    let _ = writeln!(out, "=========");
    let _ = writeln!(out, "File: {}", source.path.display());
    let _ = writeln!(
        out,
        "Source: {}x{} @ {:.3} fps, {} ({})",
        source.width,
        source.height,
        source.frame_rate,
        TimeSpec::from_seconds(source.duration),
        source.container
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>5}  {:>10}  {:>10}  {:>8}  {:>10}  {:>5}  {}",
        "shot", "start", "end", "length", "complexity", "crf", "seek"
    );
    for shot in &plan.shots {
        let d = &shot.descriptor;
        let strategies: Vec<&str> = shot.strategies.iter().map(|s| s.name()).collect();
        let _ = writeln!(
            out,
            "{:>5}  {:>10}  {:>10}  {:>7.3}s  {:>10.3}  {:>5.1}  {}",
            d.index,
            TimeSpec::from_seconds(d.start).to_string(),
            TimeSpec::from_seconds(d.end).to_string(),
            d.duration,
            d.complexity,
            shot.params.quality_param,
            strategies.join(" > ")
        );
    }
    out
}

pub fn render_quality(quality: &QualityReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Quality");
    let _ = writeln!(out, "=======");
    for score in &quality.per_shot {
        let _ = writeln!(
            out,
            "  Shot {:>3}: PSNR {:>6.2} dB  SSIM {:.4}  ({} frames)",
            score.shot_index, score.psnr, score.ssim, score.frames
        );
    }
    let _ = writeln!(
        out,
        "  Aggregate: PSNR {:>6.2} dB  SSIM {:.4}",
        quality.aggregate.psnr, quality.aggregate.ssim
    );
    out
}

pub fn render_run(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Encode Summary");
    let _ = writeln!(out, "==============");
    let _ = writeln!(out, "Input:  {}", report.input.display());
    let _ = writeln!(out, "Output: {}", report.output.display());
    let _ = writeln!(
        out,
        "Shots:  {} ({} frames, {})",
        report.shots.len(),
        report.output_info.frame_count,
        TimeSpec::from_seconds(report.output_info.duration)
    );
    let _ = writeln!(
        out,
        "Size:   {} -> {} ({:.1}% saved)",
        Utils::format_file_size(report.sizes.original_size),
        Utils::format_file_size(report.sizes.output_size),
        report.sizes.savings_percent
    );
    let _ = writeln!(out, "Time:   {:.1}s", report.elapsed_secs);

    let failures = report.shot_failures();
    if !failures.is_empty() {
        let _ = writeln!(out, "Recovered shot failures:");
        for shot in failures {
            let _ = writeln!(
                out,
                "  Shot {}: {}",
                shot.index,
                shot.failure.as_deref().unwrap_or("unknown cause")
            );
        }
    }

    match &report.quality {
        Some(quality) => {
            let _ = writeln!(out);
            out.push_str(&render_quality(quality));
        }
        None => {
            let _ = writeln!(out, "Quality: not evaluated (output was rescaled)");
        }
    }
    out
}

/// Write pretty JSON via a temporary file and rename
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> PerShotResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut temp = PathBuf::from(path);
    temp.set_extension("json.tmp");

    std::fs::write(&temp, serde_json::to_string_pretty(value)?)?;
    std::fs::rename(&temp, path)?;
    info!("Report written to {}", path.display());
    Ok(())
}
