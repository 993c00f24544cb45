//! Engine facade error taxonomy
//!
//! Callers branch on cause with `err.kind() == Some(ErrorKind::X)`, which
//! looks through action labels and the [`EngineError::FailFast`] wrapper.

use thiserror::Error;

use crate::context::ContextError;
use crate::runner::{RunError, RunResult};

/// Identity-comparable causes reported by the engine facade
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    #[error("docker container type is windows")]
    WindowsContainers,

    /// Reserved for callers that gate on the engine version; nothing in
    /// this crate produces it, but a retry loop must still stop on it.
    #[error("docker version is less than the minimum required")]
    MinDockerVersion,

    #[error("minimum cpu count limit")]
    CpuCountLimit,

    #[error("can't create with that IP, address already in use")]
    IpInUse,

    #[error("insufficient storage available to the engine")]
    InsufficientStorage,

    #[error("container exited unexpectedly")]
    ExitedUnexpectedly,

    #[error("failed to get docker info")]
    DaemonInfo,

    #[error("unable to get ssh port, container is not running")]
    GetSshPortContainerNotRunning,

    #[error("unable to get port, container is not running")]
    GetPortContainerNotRunning,

    #[error("network subnet is taken")]
    NetworkSubnetTaken,

    #[error("network gateway is taken")]
    NetworkGatewayTaken,

    #[error("kic network not found")]
    NetworkNotFound,

    #[error("network still in use")]
    NetworkInUse,

    #[error("kic volume not found")]
    VolumeNotFound,
}

impl ErrorKind {
    /// Whether an outer retry loop must stop on this cause
    pub fn is_fail_fast(self) -> bool {
        matches!(
            self,
            ErrorKind::WindowsContainers
                | ErrorKind::MinDockerVersion
                | ErrorKind::CpuCountLimit
                | ErrorKind::IpInUse
                | ErrorKind::InsufficientStorage
        )
    }
}

/// Errors from engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// A sentinel cause, optionally with detail such as a log excerpt
    #[error("{}", sentinel_message(.kind, .detail.as_deref()))]
    Sentinel {
        kind: ErrorKind,
        detail: Option<String>,
    },

    #[error("{action}: {source}")]
    Command {
        action: String,
        #[source]
        source: RunError,
    },

    #[error("{action}: {source}")]
    Context {
        action: String,
        #[source]
        source: ContextError,
    },

    #[error("parsing {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error("{0}")]
    Unsupported(String),

    #[error("container {name} status is {state} but expected it to be exited")]
    NotStopped { name: String, state: String },

    /// Tells retry loops to stop immediately
    #[error("{0}")]
    FailFast(Box<EngineError>),

    #[error("{action}: {source}")]
    Wrapped {
        action: String,
        #[source]
        source: Box<EngineError>,
    },
}

fn sentinel_message(kind: &ErrorKind, detail: Option<&str>) -> String {
    match detail {
        Some(detail) if !detail.is_empty() => format!("{kind}: {detail}"),
        _ => kind.to_string(),
    }
}

impl From<ErrorKind> for EngineError {
    fn from(kind: ErrorKind) -> Self {
        EngineError::Sentinel { kind, detail: None }
    }
}

impl EngineError {
    pub fn sentinel(kind: ErrorKind, detail: impl Into<String>) -> Self {
        EngineError::Sentinel {
            kind,
            detail: Some(detail.into()),
        }
    }

    pub fn command(action: impl Into<String>, source: RunError) -> Self {
        EngineError::Command {
            action: action.into(),
            source,
        }
    }

    pub fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Parse {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Mark this error as non-retryable
    pub fn fail_fast(self) -> Self {
        match self {
            already @ EngineError::FailFast(_) => already,
            other => EngineError::FailFast(Box::new(other)),
        }
    }

    /// Prefix this error with an action label
    pub fn wrap(self, action: impl Into<String>) -> Self {
        EngineError::Wrapped {
            action: action.into(),
            source: Box::new(self),
        }
    }

    /// The sentinel cause, looking through wrappers
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineError::Sentinel { kind, .. } => Some(*kind),
            EngineError::FailFast(inner) => inner.kind(),
            EngineError::Wrapped { source, .. } => source.kind(),
            _ => None,
        }
    }

    /// Explicitly wrapped in `FailFast` or carrying a fail-fast sentinel
    pub fn is_fail_fast(&self) -> bool {
        match self {
            EngineError::FailFast(_) => true,
            EngineError::Wrapped { source, .. } => source.is_fail_fast(),
            other => other.kind().is_some_and(ErrorKind::is_fail_fast),
        }
    }

    /// Captured command output, when the failure came from the runner
    pub fn run_result(&self) -> Option<&RunResult> {
        match self {
            EngineError::Command { source, .. } => source.result(),
            EngineError::FailFast(inner) => inner.run_result(),
            EngineError::Wrapped { source, .. } => source.run_result(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_sees_through_wrappers() {
        let err = EngineError::from(ErrorKind::NetworkNotFound)
            .wrap("network inspect")
            .fail_fast();
        assert_eq!(err.kind(), Some(ErrorKind::NetworkNotFound));
        assert!(err.is_fail_fast());
        assert!(err.to_string().starts_with("network inspect: "));
    }

    #[test]
    fn fail_fast_sentinels() {
        assert!(EngineError::from(ErrorKind::MinDockerVersion).is_fail_fast());
        assert!(EngineError::from(ErrorKind::CpuCountLimit).is_fail_fast());
        assert!(EngineError::from(ErrorKind::IpInUse).is_fail_fast());
        assert!(!EngineError::from(ErrorKind::ExitedUnexpectedly).is_fail_fast());
        assert!(!EngineError::from(ErrorKind::NetworkSubnetTaken).is_fail_fast());
    }

    #[test]
    fn fail_fast_is_not_nested() {
        let err = EngineError::Unsupported("x".into()).fail_fast().fail_fast();
        match err {
            EngineError::FailFast(inner) => {
                assert!(matches!(*inner, EngineError::Unsupported(_)))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sentinel_detail_is_displayed() {
        let err = EngineError::sentinel(ErrorKind::ExitedUnexpectedly, "last log line");
        assert_eq!(
            err.to_string(),
            "container exited unexpectedly: last log line"
        );
    }
}
