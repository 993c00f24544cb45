//! Captured output of an engine CLI invocation

use std::borrow::Cow;
use std::time::Duration;

use thiserror::Error;

/// Exit code recorded when the process was killed at its deadline
pub const DEADLINE_EXIT_CODE: i32 = -1;

/// The outcome of one external command
///
/// Immutable once the command has returned. `exit_code` is always set,
/// including on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Full argv, program first
    pub args: Vec<String>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl RunResult {
    /// Render the argv as a shell-like string, quoting arguments with spaces
    pub fn command(&self) -> String {
        self.args
            .iter()
            .map(|a| {
                if a.contains(' ') {
                    format!("\"{a}\"")
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn stdout_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    /// Both streams rendered for a user-facing report
    ///
    /// Empty streams are omitted.
    pub fn output(&self) -> String {
        let mut out = String::new();
        if !self.stdout.is_empty() {
            out.push_str(&format!("-- stdout --\n{}\n", self.stdout_str()));
        }
        if !self.stderr.is_empty() {
            out.push_str(&format!("** stderr ** \n{}\n", self.stderr_str()));
        }
        out
    }

    /// Whether either stream contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.stdout_str().contains(needle) || self.stderr_str().contains(needle)
    }
}

/// Errors from running an external command
#[derive(Error, Debug)]
pub enum RunError {
    /// The program could not be started at all
    #[error("{command}: failed to start: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the process failed
    #[error("{command}: failed waiting for process: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process outlived its deadline and was killed
    #[error("{}: deadline exceeded after {deadline:?}", .result.command())]
    DeadlineExceeded {
        deadline: Duration,
        result: Box<RunResult>,
    },

    /// The process exited nonzero
    #[error(
        "{}: {status}\nstdout:\n{}\nstderr:\n{}",
        .result.command(),
        .result.stdout_str(),
        .result.stderr_str()
    )]
    Failed {
        status: String,
        result: Box<RunResult>,
    },
}

impl RunError {
    /// The captured result, when the process ran far enough to produce one
    pub fn result(&self) -> Option<&RunResult> {
        match self {
            RunError::DeadlineExceeded { result, .. } | RunError::Failed { result, .. } => {
                Some(result)
            }
            RunError::Spawn { .. } | RunError::Wait { .. } => None,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, RunError::DeadlineExceeded { .. })
    }

    /// Whether the captured output mentions `needle`
    pub fn output_contains(&self, needle: &str) -> bool {
        self.result().is_some_and(|r| r.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(args: &[&str], stdout: &str, stderr: &str, code: i32) -> RunResult {
        RunResult {
            args: args.iter().map(|s| s.to_string()).collect(),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            exit_code: code,
        }
    }

    #[test]
    fn command_quotes_arguments_with_spaces() {
        let rr = result(&["docker", "inspect", "--format", "{{.State.Status}} x"], "", "", 0);
        assert_eq!(rr.command(), "docker inspect --format \"{{.State.Status}} x\"");
    }

    #[test]
    fn output_omits_empty_streams() {
        let rr = result(&["true"], "", "", 0);
        assert_eq!(rr.output(), "");

        let rr = result(&["x"], "hello", "", 0);
        assert!(rr.output().contains("-- stdout --"));
        assert!(!rr.output().contains("** stderr **"));
    }

    #[test]
    fn failed_error_includes_command_and_streams() {
        let err = RunError::Failed {
            status: "exit status: 1".to_string(),
            result: Box::new(result(&["docker", "network", "rm", "x"], "", "No such network: x", 1)),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("docker network rm x: exit status: 1"));
        assert!(msg.contains("stderr:\nNo such network: x"));
        assert!(err.output_contains("No such network"));
        assert_eq!(err.result().map(|r| r.exit_code), Some(1));
    }
}
