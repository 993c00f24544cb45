//! kicup-core - Core library for kicup
//!
//! The remote-daemon access layer of a local Kubernetes bootstrapper:
//! works out where the docker/podman daemon lives, materializes TLS
//! material for TCP contexts, keeps supervised SSH tunnels to remote
//! daemons, and wraps the engine CLIs in typed operations.

pub mod config;
pub mod context;
pub mod engine;
pub mod env;
pub mod hostnet;
pub mod runner;
pub mod services;
pub mod tunnel;
pub mod version;

// Re-export the main entry points for consumers
pub use config::{Config, load_config};
pub use context::{ContextError, ContextInfo, ContextResolver, TlsManager};
pub use engine::{Engine, EngineClient, EngineError, ErrorKind};
pub use env::HostEnv;
pub use runner::{Cmd, CommandRunner, RunError, RunResult};
pub use services::Services;
pub use tunnel::{SshTunnel, TunnelError, TunnelManager, TunnelStatus};
pub use version::{get_version, get_version_long};
