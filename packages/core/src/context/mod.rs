//! Daemon context resolution
//!
//! Decides where the container daemon lives (local socket, TCP/TLS, or
//! SSH) from environment variables and the Docker CLI's context store,
//! and materializes TLS material for remote TCP contexts.

mod error;
pub mod host;
mod resolver;
pub mod store;
pub mod tls;

use std::collections::BTreeMap;

use serde::Serialize;

pub use error::ContextError;
pub use host::{
    SshEndpoint, parse_host_info, ssh_endpoint, validate_remote_context, validate_ssh_context,
    validate_tcp_context,
};
pub use resolver::{ContextResolver, DEFAULT_CACHE_TTL};
pub use tls::{TlsError, TlsManager};

/// Name of the local default context
pub const DEFAULT_CONTEXT: &str = "default";

/// Name of the context synthesized from `DOCKER_HOST`
pub const ENV_HOST_CONTEXT: &str = "environment-host";

/// TLS files by name (`ca.pem`, `cert.pem`, `key.pem`)
pub type TlsBundle = BTreeMap<String, Vec<u8>>;

/// Where the daemon lives and how to authenticate to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextInfo {
    pub name: String,
    pub host: String,
    pub is_remote: bool,
    pub is_ssh: bool,
    #[serde(skip)]
    pub tls: Option<TlsBundle>,
}

impl ContextInfo {
    /// The local default context (`host=""`)
    pub fn local_default() -> Self {
        Self {
            name: DEFAULT_CONTEXT.to_string(),
            host: String::new(),
            is_remote: false,
            is_ssh: false,
            tls: None,
        }
    }

    pub fn has_tls(&self) -> bool {
        self.tls.as_ref().is_some_and(|b| !b.is_empty())
    }
}
