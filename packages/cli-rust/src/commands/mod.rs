//! CLI command implementations
//!
//! Each command is a clap `Args` struct plus a `cmd_*` handler that runs it
//! against the process-wide [`kicup_core::Services`].

mod config;
mod container;
mod context;
mod info;
mod mount;
mod network;
mod tunnel;

pub use config::{ConfigArgs, cmd_config};
pub use container::{ContainerArgs, cmd_container};
pub use context::{ContextArgs, cmd_context};
pub use info::{InfoArgs, cmd_info};
pub use mount::{MountArgs, cmd_mount};
pub use network::{NetworkArgs, cmd_network};
pub use tunnel::{TunnelArgs, cmd_tunnel};
