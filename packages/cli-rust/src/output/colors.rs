//! Color utilities for CLI output
//!
//! Provides consistent color styling for container states and log levels.

use console::{Style, StyledObject};

/// Style a container state string with appropriate colors
///
/// - "running" -> green bold
/// - "stopped", "exited", "error" -> red
/// - "starting", "restarting", "paused" -> yellow
/// - other -> dim
pub fn state_style(state: &str) -> StyledObject<String> {
    let lowercase = state.to_lowercase();
    let style = match lowercase.as_str() {
        "running" => Style::new().green().bold(),
        "stopped" | "exited" | "error" => Style::new().red(),
        "starting" | "restarting" | "paused" => Style::new().yellow(),
        _ => Style::new().dim(),
    };
    style.apply_to(state.to_string())
}

/// Style a log line based on detected log level
///
/// - Contains "ERROR" or "error" -> red
/// - Contains "WARN" or "warn" -> yellow
/// - Contains "INFO" or "info" -> cyan
/// - Contains "DEBUG" or "debug" -> dim
/// - else -> unstyled
pub fn log_level_style(line: &str) -> StyledObject<&str> {
    let style = if line.contains("ERROR") || line.contains("error") {
        Style::new().red()
    } else if line.contains("WARN") || line.contains("warn") {
        Style::new().yellow()
    } else if line.contains("INFO") || line.contains("info") {
        Style::new().cyan()
    } else if line.contains("DEBUG") || line.contains("debug") {
        Style::new().dim()
    } else {
        Style::new()
    };
    style.apply_to(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    // StyledObject::to_string() includes ANSI escape codes when colors are
    // enabled, so tests only check the text content.

    #[test]
    fn state_style_keeps_text() {
        for state in ["Running", "Stopped", "Paused", "Starting", "Error", "unknown"] {
            assert!(state_style(state).to_string().contains(state));
        }
    }

    #[test]
    fn log_level_style_keeps_text() {
        for line in [
            "2024-01-01 ERROR: something failed",
            "2024-01-01 WARN: something concerning",
            "I0101 kubelet info: started",
            "plain log line",
        ] {
            assert!(log_level_style(line).to_string().contains(line));
        }
    }
}
