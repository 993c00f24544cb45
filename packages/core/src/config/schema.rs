//! Configuration schema for kicup
//!
//! Defines the structure and defaults for the config.json file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure
///
/// Serialized to/from `~/.config/kicup/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Config file version for migrations
    pub version: u32,

    /// Run Podman without `sudo -n` on Linux (default: false)
    #[serde(default)]
    pub rootless: bool,

    /// Never print slow-command warnings (default: false)
    #[serde(default)]
    pub suppress_slow_command_warnings: bool,

    /// SSH client used for tunnels and connectivity checks (default: "ssh")
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,

    /// Seconds a resolved daemon context stays cached (default: 30)
    #[serde(default = "default_context_cache_ttl")]
    pub context_cache_ttl_secs: u64,

    /// Engine command deadlines and warning thresholds
    #[serde(default)]
    pub runner: RunnerConfig,

    /// SSH tunnel supervision settings
    #[serde(default)]
    pub tunnel: TunnelConfig,
}

/// Deadlines for engine CLI invocations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Kill deadline for ordinary commands (default: 19)
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// Kill deadline for `volume` and `ps` commands (default: 30)
    #[serde(default = "default_slow_timeout_secs")]
    pub slow_timeout_secs: u64,

    /// Slow warning threshold for ordinary commands (default: 2000)
    #[serde(default = "default_warn_ms")]
    pub default_warn_ms: u64,

    /// Slow warning threshold for `volume` and `ps` commands (default: 3000)
    #[serde(default = "default_slow_warn_ms")]
    pub slow_warn_ms: u64,
}

/// Tunnel readiness, retry and health-check timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TunnelConfig {
    /// Seconds to wait for a forwarded port to accept connections (default: 10)
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Start attempts for a new tunnel (default: 3)
    #[serde(default = "default_start_attempts")]
    pub start_attempts: u32,

    /// Start attempts when restarting a dead tunnel (default: 2)
    #[serde(default = "default_restart_attempts")]
    pub restart_attempts: u32,

    /// Seconds between health checks (default: 30)
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,

    /// Seconds between metrics snapshots in the log (default: 300)
    #[serde(default = "default_metrics_interval")]
    pub metrics_log_interval_secs: u64,

    /// Seconds after which health monitoring stops (default: 900)
    #[serde(default = "default_health_window")]
    pub health_check_window_secs: u64,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_context_cache_ttl() -> u64 {
    30
}

fn default_timeout_secs() -> u64 {
    19
}

fn default_slow_timeout_secs() -> u64 {
    30
}

fn default_warn_ms() -> u64 {
    2000
}

fn default_slow_warn_ms() -> u64 {
    3000
}

fn default_ready_timeout() -> u64 {
    10
}

fn default_start_attempts() -> u32 {
    3
}

fn default_restart_attempts() -> u32 {
    2
}

fn default_health_interval() -> u64 {
    30
}

fn default_metrics_interval() -> u64 {
    300
}

fn default_health_window() -> u64 {
    900
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            rootless: false,
            suppress_slow_command_warnings: false,
            ssh_program: default_ssh_program(),
            context_cache_ttl_secs: default_context_cache_ttl(),
            runner: RunnerConfig::default(),
            tunnel: TunnelConfig::default(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            slow_timeout_secs: default_slow_timeout_secs(),
            default_warn_ms: default_warn_ms(),
            slow_warn_ms: default_slow_warn_ms(),
        }
    }
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: default_ready_timeout(),
            start_attempts: default_start_attempts(),
            restart_attempts: default_restart_attempts(),
            health_check_interval_secs: default_health_interval(),
            metrics_log_interval_secs: default_metrics_interval(),
            health_check_window_secs: default_health_window(),
        }
    }
}

impl Config {
    /// Create a new Config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.context_cache_ttl_secs)
    }
}
