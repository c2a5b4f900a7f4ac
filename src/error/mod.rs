//! Error handling module for PerShot

use thiserror::Error;

use crate::domain::model::StrategyAttempt;

/// Main error type for PerShot operations
#[derive(Error, Debug)]
pub enum PerShotError {
    /// Shot plan is malformed (fatal to the run)
    #[error("Invalid shot boundary at shot {index}: [{start:.3}s, {end:.3}s) is shorter than the {min_shot_length:.3}s minimum")]
    InvalidBoundary {
        index: usize,
        start: f64,
        end: f64,
        min_shot_length: f64,
    },

    /// Boundary input that cannot be turned into a plan at all
    #[error("Invalid shot plan: {message}")]
    InvalidPlan { message: String },

    /// Every seek strategy failed for a shot
    #[error("Extraction failed for shot {shot_index}: {}", format_attempts(.attempts))]
    Extraction {
        shot_index: usize,
        attempts: Vec<StrategyAttempt>,
    },

    /// External encode failed for a shot
    #[error("Encode failed for shot {shot_index}{}: {cause}", transient_tag(.transient))]
    Encode {
        shot_index: usize,
        transient: bool,
        cause: String,
    },

    /// Assembly attempted without every shot encoded
    #[error("Cannot assemble output, shots missing: {missing:?}")]
    IncompleteSequence { missing: Vec<usize> },

    /// Concatenation failed or produced a seam defect
    #[error("Assembly failed: {message}")]
    Assembly { message: String },

    /// Source and output diverge beyond tolerance
    #[error("Alignment error: {message}")]
    Alignment { message: String },

    /// Scene boundary provider failed
    #[error("Scene detection failed: {message}")]
    Detection { message: String },

    /// Media probe error
    #[error("Failed to probe media file {path}: {message}")]
    Probe { path: String, message: String },

    /// Quality metric computation error
    #[error("Quality measurement failed: {message}")]
    Metrics { message: String },

    /// Configuration error
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    /// Input file not found or inaccessible
    #[error("Input file not found: {path}")]
    InputFileNotFound { path: String },

    /// More shots failed than the configured tolerance allows
    #[error("{failed} shot(s) failed, tolerance is {tolerance}: {causes}")]
    ToleranceExceeded {
        failed: usize,
        tolerance: usize,
        causes: String,
    },

    /// Run was cancelled
    #[error("Run cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML parse error
    #[error("Config parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

fn transient_tag(transient: &bool) -> &'static str {
    if *transient {
        " (transient)"
    } else {
        ""
    }
}

fn format_attempts(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "no strategy attempted".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for PerShot operations
pub type PerShotResult<T> = std::result::Result<T, PerShotError>;
