//! Context resolution errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors from resolving or validating a daemon context
#[derive(Error, Debug)]
pub enum ContextError {
    /// The daemon host URL does not parse
    #[error("Invalid daemon host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    /// A remote context has an empty host
    #[error("{kind} daemon context {name:?} has no host specified")]
    MissingHost { kind: &'static str, name: String },

    /// SSH context without `user@`
    #[error("SSH daemon context must specify a username (host: {0})")]
    SshMissingUser(String),

    /// SSH context without a hostname
    #[error("SSH daemon context must specify a hostname (host: {0})")]
    SshMissingHostname(String),

    /// TCP/TLS context without a hostname
    #[error("TCP daemon context must specify a hostname (host: {0})")]
    TcpMissingHostname(String),

    /// An SSH-only operation was requested for another kind of context
    #[error("Daemon context {0:?} is not SSH-based")]
    NotSsh(String),

    /// Home directory could not be determined
    #[error("Could not determine the docker config directory")]
    NoConfigDir,

    /// Reading the engine config or context store failed
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The engine config or context metadata is not valid JSON
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The named context has no metadata in the store
    #[error("Daemon context {0:?} not found in the context store")]
    NotFound(String),

    /// The named context has no docker endpoint entry
    #[error("Daemon context {0:?} has no docker endpoint")]
    MissingDockerEndpoint(String),

    /// Materializing TLS files failed
    #[error(transparent)]
    Tls(#[from] super::tls::TlsError),
}
