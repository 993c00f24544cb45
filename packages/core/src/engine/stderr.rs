//! Engine CLI output markers
//!
//! The engine CLIs report conflicts only as text. Every substring the
//! facade matches on lives here so upstream wording changes stay local.

use crate::runner::RunError;

pub const POOL_OVERLAPS: &str = "Pool overlaps";
pub const GATEWAY_ALLOCATION_FAILED: &str = "failed to allocate gateway";
pub const ADDRESS_IN_USE: &str = "Address already in use";
pub const NO_SUCH_NETWORK: &str = "No such network";
pub const ACTIVE_ENDPOINTS: &str = "has active endpoints";
pub const CPU_RANGE: &str = "Range of CPUs is from";
pub const CPUS_AVAILABLE: &str = "CPUs available";
pub const NO_SPACE_LEFT: &str = "no space left on device";
pub const NO_SUCH_VOLUME: &[&str] = &["No such volume", "no such volume"];

/// Ways docker and podman say a container does not exist
pub const NO_SUCH_CONTAINER: &[&str] = &[
    "Error: No such object:",
    "Error: No such container:",
    "unable to find",
    "Error: error inspecting object",
    "Error: error looking up container",
    "no such container",
];

/// Subnet already claimed by another network
pub fn subnet_taken(err: &RunError) -> bool {
    err.output_contains(POOL_OVERLAPS)
}

/// Gateway address already claimed
pub fn gateway_taken(err: &RunError) -> bool {
    err.output_contains(GATEWAY_ALLOCATION_FAILED) && err.output_contains(ADDRESS_IN_USE)
}

pub fn network_missing(err: &RunError) -> bool {
    err.output_contains(NO_SUCH_NETWORK)
}

pub fn network_busy(err: &RunError) -> bool {
    err.output_contains(ACTIVE_ENDPOINTS)
}

/// More CPUs requested than the daemon has
pub fn cpu_limit(err: &RunError) -> bool {
    err.output_contains(CPU_RANGE) && err.output_contains(CPUS_AVAILABLE)
}

pub fn ip_in_use(err: &RunError) -> bool {
    err.output_contains(ADDRESS_IN_USE)
}

pub fn out_of_space(err: &RunError) -> bool {
    err.output_contains(NO_SPACE_LEFT)
}

pub fn volume_missing(err: &RunError) -> bool {
    NO_SUCH_VOLUME.iter().any(|m| err.output_contains(m))
}

pub fn container_missing(err: &RunError) -> bool {
    NO_SUCH_CONTAINER.iter().any(|m| err.output_contains(m))
}
