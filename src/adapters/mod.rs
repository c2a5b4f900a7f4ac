// Adapters - External system implementations

pub mod exec_ffmpeg;
pub mod metrics_ffmpeg;
pub mod probe_ffprobe;
pub mod process;
pub mod scene_ffmpeg;

// Re-export adapters
pub use exec_ffmpeg::FfmpegTranscoder;
pub use metrics_ffmpeg::FfmpegQualityMeter;
pub use probe_ffprobe::FfprobeProbe;
pub use scene_ffmpeg::{FfmpegSceneDetector, SceneDetectorSettings};
