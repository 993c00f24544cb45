//! User-visible notices from the runner
//!
//! Slow-command warnings are meant for the person at the terminal, not the
//! log, so they go through a small trait that frontends can replace.

use console::style;

/// Receives user-facing warnings and tips
pub trait Notifier: Send + Sync {
    fn warning(&self, message: &str);
    fn tip(&self, message: &str);
}

/// Prints styled notices to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn warning(&self, message: &str) {
        eprintln!("{} {}", style("!").yellow().bold(), message);
    }

    fn tip(&self, message: &str) {
        eprintln!("  {} {}", style("Tip:").cyan(), message);
    }
}
