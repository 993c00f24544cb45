//! Host network helpers
//!
//! Daemon host discovery, the host address reachable from inside a
//! container, cluster subnet candidates, and mount/port specs.

pub mod mount;
mod routable;
pub mod subnet;

use crate::engine::Engine;
use crate::env::{CONTAINER_HOST, DOCKER_HOST, HostEnv};

pub use mount::{Mount, MountError, MountPropagation, PortMapping, parse_mount_spec};
pub use routable::{
    DOCKER_HOST_ALIAS, RoutableHost, lookup_host_ip, parse_nslookup,
    routable_host_ip_from_inside,
};
pub use subnet::{FIRST_SUBNET, SUBNET_ATTEMPTS, Subnet, candidate_subnets, gateway_of};

/// The daemon address the engine CLI will use, if overridden
///
/// `DOCKER_HOST` for Docker, `CONTAINER_HOST` for Podman.
pub fn daemon_host(env: &HostEnv, engine: Engine) -> Option<&str> {
    match engine {
        Engine::Docker => env.get(DOCKER_HOST),
        Engine::Podman => env.get(CONTAINER_HOST),
    }
}

/// Whether the engine talks to a daemon on another machine
///
/// Socket URLs (`unix://`, `npipe://`) have no host part and count as
/// local.
pub fn is_external_daemon_host(env: &HostEnv, engine: Engine) -> bool {
    let Some(host) = daemon_host(env, engine) else {
        return false;
    };
    match url::Url::parse(host) {
        Ok(url) => url.host_str().is_some_and(|h| !h.is_empty()),
        Err(e) => {
            tracing::debug!("Unable to parse daemon host {:?}: {}", host, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_host_per_engine() {
        let env = HostEnv::from_pairs([
            (DOCKER_HOST, "tcp://10.0.0.5:2376"),
            (CONTAINER_HOST, "unix:///run/podman/podman.sock"),
        ]);
        assert_eq!(daemon_host(&env, Engine::Docker), Some("tcp://10.0.0.5:2376"));
        assert!(is_external_daemon_host(&env, Engine::Docker));
        assert!(!is_external_daemon_host(&env, Engine::Podman));
    }

    #[test]
    fn unset_host_is_local() {
        let env = HostEnv::default();
        assert_eq!(daemon_host(&env, Engine::Docker), None);
        assert!(!is_external_daemon_host(&env, Engine::Docker));
    }

    #[test]
    fn ssh_host_is_external() {
        let env = HostEnv::from_pairs([(DOCKER_HOST, "ssh://me@build-box")]);
        assert!(is_external_daemon_host(&env, Engine::Docker));
    }
}
