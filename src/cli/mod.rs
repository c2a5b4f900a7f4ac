//! CLI module for PerShot
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

pub use args::{EncodeArgs, EvaluateArgs, PlanArgs};

/// PerShot per-shot encoder
///
/// Splits a video into shots, encodes each with its own CRF and reassembles
/// them into one seamless file, then reports PSNR/SSIM against the source.
#[derive(Parser, Debug)]
#[command(name = "pershot")]
#[command(about = "PerShot - Content-adaptive per-shot video encoding")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log format: pretty, compact or json
    #[arg(long, default_value = "compact", global = true)]
    pub log_format: String,

    /// Configuration file (defaults to ./pershot.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encode a video shot by shot
    Encode(args::EncodeArgs),
    /// Detect shots and print the encode plan without encoding
    Plan(args::PlanArgs),
    /// Compare two videos with PSNR and SSIM
    Evaluate(args::EvaluateArgs),
}
