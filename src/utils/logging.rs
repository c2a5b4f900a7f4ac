//! Logging configuration and subscriber setup

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::{PerShotError, PerShotResult};

/// Logging configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level used when RUST_LOG is not set
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include target module information
    pub target: bool,
    /// Include thread information
    pub thread: bool,
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(level: &str) -> PerShotResult<Self> {
        match level.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(PerShotError::Config {
                message: format!("unknown log level '{}'", other),
            }),
        }
    }

    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_filter())
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line format
    Pretty,
    Compact,
    /// One JSON object per event, for log shippers
    Json,
}

impl LogFormat {
    pub fn parse(format: &str) -> PerShotResult<Self> {
        match format.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(PerShotError::Config {
                message: format!("unknown log format '{}'", other),
            }),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            target: false,
            thread: false,
        }
    }
}

/// Logging system manager
pub struct LoggingSystem {
    config: LoggingConfig,
}

impl LoggingSystem {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Filter from RUST_LOG when set, otherwise the configured level
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_filter()))
    }

    /// Install the global subscriber. Logs go to stderr so stdout stays machine-readable.
    pub fn initialize(&self) -> PerShotResult<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr)
            .with_target(self.config.target)
            .with_thread_ids(self.config.thread);

        let result = match self.config.format {
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        result.map_err(|e| PerShotError::Config {
            message: format!("failed to initialize logging: {}", e),
        })?;

        tracing::debug!(
            "Logging initialized with level {} and format {:?}",
            self.config.level,
            self.config.format
        );
        Ok(())
    }

    /// Log version and platform at startup
    pub fn log_system_info(&self) {
        tracing::info!("=== PerShot per-shot encoder ===");
        tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

        #[cfg(target_os = "macos")]
        tracing::info!("Platform: macOS");
        #[cfg(target_os = "linux")]
        tracing::info!("Platform: Linux");
        #[cfg(target_os = "windows")]
        tracing::info!("Platform: Windows");

        tracing::debug!("CPU cores: {}", num_cpus::get());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_and_format_parsing() {
        assert_eq!(LogLevel::parse("WARNING").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::parse("debug").unwrap().as_filter(), "debug");
        assert!(LogLevel::parse("loud").is_err());

        assert_eq!(LogFormat::parse("json").unwrap(), LogFormat::Json);
        assert!(LogFormat::parse("xml").is_err());
    }
}
