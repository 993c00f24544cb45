//! Command spinner with elapsed time display
//!
//! Provides visual feedback during long-running CLI operations with
//! animated spinner and elapsed time indicator.

use std::fmt::Display;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TEMPLATE: &str = "{spinner:.green} {msg} ({elapsed_precise:.dim})";
const TICK_CHARS: &str =
    "\u{28CB}\u{2819}\u{2839}\u{2838}\u{283C}\u{2834}\u{2826}\u{2827}\u{2807}\u{280F}";

/// A spinner for command operations with elapsed time display
///
/// The spinner shows an animated indicator with a message and elapsed time.
/// It respects quiet mode by becoming a no-op when quiet is enabled.
///
/// # Example
///
/// ```ignore
/// let spinner = CommandSpinner::new("Creating network...");
/// // ... do work ...
/// spinner.success("Network created");
/// ```
pub struct CommandSpinner {
    bar: Option<ProgressBar>,
}

impl CommandSpinner {
    /// Create a new spinner with the given message
    ///
    /// The spinner starts ticking immediately at 100ms intervals.
    /// Shows: `spinner message (HH:MM:SS)`
    pub fn new(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        match ProgressStyle::with_template(TEMPLATE) {
            Ok(style) => bar.set_style(style.tick_chars(TICK_CHARS)),
            Err(e) => tracing::debug!("Falling back to the default spinner style: {}", e),
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }

    /// Create a spinner that respects quiet mode
    ///
    /// If `quiet` is true, returns a no-op spinner that doesn't output anything.
    pub fn new_maybe(message: &str, quiet: bool) -> Self {
        if quiet {
            Self { bar: None }
        } else {
            Self::new(message)
        }
    }

    /// Update the spinner message
    pub fn update(&self, message: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Finish the spinner with a success message (green checkmark)
    pub fn success(self, message: &str) {
        if let Some(bar) = self.bar {
            bar.finish_with_message(format!(
                "{} {}",
                console::style("\u{2713}").green(),
                message
            ));
        }
    }

    /// Finish the spinner with a failure message (red X)
    pub fn fail(self, message: &str) {
        if let Some(bar) = self.bar {
            bar.finish_with_message(format!("{} {}", console::style("\u{2717}").red(), message));
        }
    }

    /// Await `operation`, finishing the spinner on either outcome
    ///
    /// On success the spinner shows `done(&value)`; on failure it shows the
    /// first line of the error, which the caller still receives in full.
    pub async fn wrap<T, E, F>(self, operation: F, done: impl FnOnce(&T) -> String) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        match operation.await {
            Ok(value) => {
                self.success(&done(&value));
                Ok(value)
            }
            Err(e) => {
                self.fail(&first_line(&e.to_string()));
                Err(e)
            }
        }
    }
}

fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().to_string()
}
