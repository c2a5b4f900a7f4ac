//! PerShot Library
//!
//! Content-adaptive per-shot video encoding: scene detection, per-shot CRF
//! selection, frame-accurate extraction, seamless reassembly and objective
//! quality reporting, driven through external ffmpeg/ffprobe processes.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod planner;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use app::{EncodeInteractor, EncodeMode, EncodeRequest};
pub use config::AppConfig;
pub use domain::model::{QualityReport, RunReport, ShotDescriptor, SourceVideo};
pub use error::{PerShotError, PerShotResult};
