//! Output utilities for CLI commands
//!
//! Spinners with elapsed time for long-running operations, consistent
//! colors for container states and log levels, and error formatting
//! with cause-specific tips.

pub mod colors;
pub mod errors;
pub mod spinner;

pub use colors::{log_level_style, state_style};
pub use errors::format_error;
pub use spinner::CommandSpinner;
