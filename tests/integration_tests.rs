use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Test utilities for video processing
mod test_utils {
    use super::*;

    /// Create a test video with hard cuts at 2 s and 7 s using FFmpeg
    pub fn create_cut_video(output_path: &Path) -> bool {
        let filter = "color=c=red:s=320x240:r=25:d=2[a];\
                      testsrc=s=320x240:r=25:d=5[b];\
                      color=c=blue:s=320x240:r=25:d=3[c];\
                      [a][b][c]concat=n=3:v=1:a=0[v]";
        let status = std::process::Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-filter_complex", filter, "-map", "[v]"])
            .args(["-c:v", "libx264", "-g", "50", "-pix_fmt", "yuv420p"])
            .arg(output_path)
            .status();
        matches!(status, Ok(s) if s.success())
    }

    pub fn pershot(dir: &TempDir) -> Command {
        let mut cmd = Command::cargo_bin("pershot").unwrap();
        cmd.current_dir(dir.path()).env_remove("RUST_LOG");
        cmd
    }
}

use test_utils::*;

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    pershot(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("encode"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("evaluate"));
}

#[test]
fn test_unsupported_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("clip.webm");
    std::fs::write(&input, b"not a video").unwrap();

    pershot(&dir)
        .args(["encode"])
        .arg(&input)
        .arg(dir.path().join("out.mp4"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported input"));
}

#[test]
fn test_missing_input_fails_with_cause() {
    let dir = TempDir::new().unwrap();

    pershot(&dir)
        .args(["encode", "missing.mp4", "out.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_out_of_range_crf_is_rejected() {
    let dir = TempDir::new().unwrap();

    pershot(&dir)
        .args(["encode", "in.mp4", "out.mp4", "--base-crf", "80"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--base-crf"));
}

#[test]
fn test_resolution_requires_single_pass() {
    let dir = TempDir::new().unwrap();

    pershot(&dir)
        .args(["encode", "in.mp4", "out.mp4", "--resolution", "640x360"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.mp4");
    std::fs::write(&input, b"placeholder").unwrap();
    let config = dir.path().join("broken.toml");
    std::fs::write(&config, "[pool]\nworkers = 0\n").unwrap();

    pershot(&dir)
        .arg("--config")
        .arg(&config)
        .arg("encode")
        .arg(&input)
        .arg(dir.path().join("out.mp4"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("pool.workers"));
}

#[test]
fn test_environment_override_is_validated() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("in.mp4");
    std::fs::write(&input, b"placeholder").unwrap();

    pershot(&dir)
        .env("PERSHOT_WORKERS", "many")
        .arg("plan")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("PERSHOT_WORKERS"));
}

#[test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
fn test_encode_three_shot_video() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cuts.mp4");
    assert!(create_cut_video(&input), "ffmpeg could not create the test video");
    let output = dir.path().join("encoded.mp4");
    let report = dir.path().join("run.json");

    pershot(&dir)
        .arg("encode")
        .arg(&input)
        .arg(&output)
        .arg("--report")
        .arg(&report)
        .assert()
        .success()
        .stdout(predicate::str::contains("Aggregate: PSNR"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["shots"].as_array().unwrap().len(), 3);
    assert_eq!(json["quality"]["per_shot"].as_array().unwrap().len(), 3);
    assert_eq!(json["output_info"]["frame_count"], 250);
}
