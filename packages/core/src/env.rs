//! Host environment snapshot
//!
//! The access layer reads environment variables in many places (daemon
//! host, context selection, rootless overrides, proxy restoration). Rust
//! 2024 makes mutating the process environment `unsafe`, so every consumer
//! reads from an immutable [`HostEnv`] captured once at startup. Tests
//! build their own snapshot instead of touching the real environment.

use std::collections::HashMap;

/// Prefix for every variable owned by kicup
pub const ENV_PREFIX: &str = "KICUP_";

/// Forces rootless Podman (no `sudo -n` prefix)
pub const ROOTLESS_ENV: &str = "KICUP_ROOTLESS";

/// Suppresses slow-command warnings
pub const SUPPRESS_PERFORMANCE_ENV: &str = "KICUP_SUPPRESS_DOCKER_PERFORMANCE";

/// Set when the user's shell has been pointed at a cluster-internal daemon
pub const ACTIVE_DOCKERD_ENV: &str = "KICUP_ACTIVE_DOCKERD";

/// Set when the user's shell has been pointed at a cluster-internal Podman
pub const ACTIVE_PODMAN_ENV: &str = "KICUP_ACTIVE_PODMAN";

/// Prefix for snapshots of the user's pre-existing values
pub const EXISTING_PREFIX: &str = "KICUP_EXISTING_";

pub const DOCKER_HOST: &str = "DOCKER_HOST";
pub const DOCKER_CONTEXT: &str = "DOCKER_CONTEXT";
pub const DOCKER_CONFIG: &str = "DOCKER_CONFIG";
pub const DOCKER_TLS_VERIFY: &str = "DOCKER_TLS_VERIFY";
pub const DOCKER_CERT_PATH: &str = "DOCKER_CERT_PATH";
pub const CONTAINER_HOST: &str = "CONTAINER_HOST";
pub const CONTAINER_SSHKEY: &str = "CONTAINER_SSHKEY";
pub const HTTPS_PROXY: &str = "HTTPS_PROXY";
pub const NO_PROXY: &str = "NO_PROXY";

/// Variables restored from `KICUP_EXISTING_*` snapshots when pointing back
/// at the host daemon
pub const RESTORABLE_VARS: &[&str] = &[
    DOCKER_HOST,
    DOCKER_TLS_VERIFY,
    DOCKER_CERT_PATH,
    HTTPS_PROXY,
    NO_PROXY,
];

/// Podman remote variables restored when pointing back at the host Podman
pub const PODMAN_RESTORABLE_VARS: &[&str] = &[CONTAINER_HOST, CONTAINER_SSHKEY];

/// Immutable view of the environment variables kicup cares about
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    vars: HashMap<String, String>,
}

/// A single change to apply to a child process environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvChange {
    Set(String, String),
    Remove(String),
}

impl HostEnv {
    /// Capture the current process environment
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `key`, treating an empty value as unset
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Whether `key` is present at all, even with an empty value
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Parse a boolean flag
    ///
    /// Unset means `false`. Values that do not parse log a warning and
    /// also count as `false`.
    pub fn flag(&self, key: &str) -> bool {
        let Some(raw) = self.get(key) else {
            return false;
        };
        match parse_bool(raw) {
            Some(v) => v,
            None => {
                tracing::warn!("{key}={raw:?} is not a boolean, treating as false");
                false
            }
        }
    }

    /// Changes that point engine commands back at the user's own daemon
    ///
    /// Returns nothing unless `KICUP_ACTIVE_DOCKERD` is set, meaning the
    /// shell was configured to talk to a cluster-internal daemon. Each
    /// restorable variable is reset to its `KICUP_EXISTING_*` snapshot, or
    /// removed when no snapshot exists.
    pub fn host_daemon_restore(&self) -> Vec<EnvChange> {
        self.restore(ACTIVE_DOCKERD_ENV, RESTORABLE_VARS)
    }

    /// Podman counterpart of [`HostEnv::host_daemon_restore`], keyed on
    /// `KICUP_ACTIVE_PODMAN`
    pub fn host_podman_restore(&self) -> Vec<EnvChange> {
        self.restore(ACTIVE_PODMAN_ENV, PODMAN_RESTORABLE_VARS)
    }

    fn restore(&self, marker: &str, names: &[&str]) -> Vec<EnvChange> {
        if !self.contains(marker) {
            return Vec::new();
        }
        let mut changes: Vec<EnvChange> = names
            .iter()
            .map(|name| {
                let snapshot = format!("{EXISTING_PREFIX}{name}");
                match self.get(&snapshot) {
                    Some(value) => EnvChange::Set((*name).to_string(), value.to_string()),
                    None => EnvChange::Remove((*name).to_string()),
                }
            })
            .collect();
        changes.push(EnvChange::Remove(marker.to_string()));
        changes
    }

    /// A copy of this snapshot with `changes` applied
    pub fn with_changes(&self, changes: &[EnvChange]) -> Self {
        let mut vars = self.vars.clone();
        for change in changes {
            match change {
                EnvChange::Set(key, value) => {
                    vars.insert(key.clone(), value.clone());
                }
                EnvChange::Remove(key) => {
                    vars.remove(key);
                }
            }
        }
        Self { vars }
    }
}

/// Parse the boolean spellings accepted by environment flags
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Some(true),
        "0" | "f" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
