//! Tunnel errors

use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use crate::context::ContextError;
use crate::runner::RunError;

/// Errors from creating, checking or stopping SSH tunnels
#[derive(Error, Debug)]
pub enum TunnelError {
    /// The context is unusable for tunnelling (not SSH, missing user, ...)
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A remote context that is not reached over SSH
    #[error("automatic tunneling only supported for SSH contexts")]
    UnsupportedContext,

    /// No local port could be allocated
    #[error("Failed to find an available local port: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// The ssh program could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Polling the ssh process failed
    #[error("Failed to poll SSH process: {0}")]
    Wait(#[source] std::io::Error),

    /// ssh exited with an error before the port was forwarded
    #[error("SSH process exited before the tunnel was ready: {0}")]
    ProcessExited(ExitStatus),

    /// The forwarded port never accepted a connection
    #[error("Tunnel on local port {port} not ready after {timeout:?}")]
    NotReady { port: u16, timeout: Duration },

    /// Neither address family accepts connections on the forwarded port
    #[error("local tunnel port not responsive (IPv4: {ipv4}, IPv6: {ipv6})")]
    PortUnresponsive { ipv4: String, ipv6: String },

    /// The `echo` round trip over SSH failed
    #[error("SSH connectivity check failed: {0}")]
    SshCheck(#[source] RunError),

    /// The `echo` round trip returned something unexpected
    #[error("SSH connectivity check failed: unexpected SSH response: {0}")]
    UnexpectedResponse(String),

    /// The service behind the tunnel did not answer
    #[error("remote service check failed: {0}")]
    RemoteService(String),

    /// Every start attempt failed
    #[error("failed to start SSH tunnel after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<TunnelError>,
    },

    #[error("SSH connectivity pre-check failed for {key}: {source}")]
    PreCheck {
        key: String,
        #[source]
        source: Box<TunnelError>,
    },

    #[error("starting SSH tunnel {key}: {source}")]
    Start {
        key: String,
        #[source]
        source: Box<TunnelError>,
    },

    /// No tunnel is registered under the key
    #[error("tunnel {0} not found")]
    NotFound(String),
}

impl TunnelError {
    /// The innermost error, looking through attempt and key labels
    pub fn root(&self) -> &TunnelError {
        match self {
            TunnelError::Exhausted { source, .. }
            | TunnelError::PreCheck { source, .. }
            | TunnelError::Start { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_looks_through_labels() {
        let err = TunnelError::Start {
            key: "k".to_string(),
            source: Box::new(TunnelError::Exhausted {
                attempts: 3,
                source: Box::new(TunnelError::NotReady {
                    port: 4000,
                    timeout: Duration::from_secs(10),
                }),
            }),
        };
        assert!(matches!(err.root(), TunnelError::NotReady { port: 4000, .. }));
        assert_eq!(
            err.to_string(),
            "starting SSH tunnel k: failed to start SSH tunnel after 3 attempts: \
             Tunnel on local port 4000 not ready after 10s"
        );
    }

    #[test]
    fn unsupported_context_message() {
        assert_eq!(
            TunnelError::UnsupportedContext.to_string(),
            "automatic tunneling only supported for SSH contexts"
        );
    }
}
