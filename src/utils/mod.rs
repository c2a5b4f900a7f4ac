//! Common utilities and helpers

use std::time::Duration;

pub mod logging;
pub mod workspace;

/// Formatting helpers for console output
pub struct Utils;

impl Utils {
    /// Format duration for display
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        let milliseconds = duration.subsec_millis();

        if hours > 0 {
            format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, milliseconds)
        } else {
            format!("{:02}:{:02}.{:03}", minutes, seconds, milliseconds)
        }
    }

    /// Format file size for display
    pub fn format_file_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Shots done out of total, as a percentage
    pub fn calculate_progress(done: usize, total: usize) -> f32 {
        if total == 0 {
            0.0
        } else {
            (done as f32 / total as f32) * 100.0
        }
    }

    /// Last `max_lines` non-empty lines of process diagnostics
    pub fn tail_lines(text: &str, max_lines: usize) -> String {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = lines.len().saturating_sub(max_lines);
        lines[skip..].join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_helpers() {
        assert_eq!(Utils::format_duration(Duration::from_millis(61_250)), "01:01.250");
        assert_eq!(Utils::format_duration(Duration::from_secs(3723)), "01:02:03.000");
        assert_eq!(Utils::format_file_size(512), "512 B");
        assert_eq!(Utils::format_file_size(1536), "1.50 KB");
        assert_eq!(Utils::calculate_progress(1, 4), 25.0);
        assert_eq!(Utils::calculate_progress(0, 0), 0.0);
    }

    #[test]
    fn test_tail_lines() {
        let text = "a\n\nb\nc\n  \nd\n";
        assert_eq!(Utils::tail_lines(text, 2), "c\nd");
        assert_eq!(Utils::tail_lines(text, 10), "a\nb\nc\nd");
    }
}
