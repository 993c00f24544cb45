//! Tunnel timing and the ssh program

use std::time::Duration;

use crate::config::Config;

/// Control socket shared by every ssh invocation kicup makes
pub const CONTROL_PATH: &str = "/tmp/kicup-ssh-%r@%h:%p";

/// Timing for tunnel start, readiness, restarts and health checks
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelSettings {
    /// Program used for every ssh invocation
    pub ssh_program: String,
    pub control_path: String,
    /// How long a new forwarding may take to accept connections
    pub ready_timeout: Duration,
    /// Per-dial timeout of a port probe
    pub probe_timeout: Duration,
    /// Pause between readiness sweeps
    pub probe_interval: Duration,
    pub start_attempts: u32,
    pub restart_attempts: u32,
    /// Delay unit between start attempts (attempt × step)
    pub retry_step: Duration,
    /// Pause before a restart
    pub restart_delay: Duration,
    /// Deadline of the `echo` round trip
    pub ssh_check_timeout: Duration,
    /// Deadline of the curl probe through SSH
    pub remote_check_timeout: Duration,
    pub health_check_interval: Duration,
    pub metrics_log_interval: Duration,
    /// Health monitoring stops after this long
    pub health_check_window: Duration,
    /// How often a daemonized forwarding's port is checked
    pub port_watch_interval: Duration,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            control_path: CONTROL_PATH.to_string(),
            ready_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
            probe_interval: Duration::from_millis(50),
            start_attempts: 3,
            restart_attempts: 2,
            retry_step: Duration::from_millis(500),
            restart_delay: Duration::from_secs(1),
            ssh_check_timeout: Duration::from_secs(5),
            remote_check_timeout: Duration::from_secs(3),
            health_check_interval: Duration::from_secs(30),
            metrics_log_interval: Duration::from_secs(300),
            health_check_window: Duration::from_secs(900),
            port_watch_interval: Duration::from_secs(2),
        }
    }
}

impl TunnelSettings {
    pub fn from_config(config: &Config) -> Self {
        let tunnel = &config.tunnel;
        Self {
            ssh_program: config.ssh_program.clone(),
            ready_timeout: Duration::from_secs(tunnel.ready_timeout_secs),
            start_attempts: tunnel.start_attempts.max(1),
            restart_attempts: tunnel.restart_attempts.max(1),
            health_check_interval: Duration::from_secs(tunnel.health_check_interval_secs.max(1)),
            metrics_log_interval: Duration::from_secs(tunnel.metrics_log_interval_secs.max(1)),
            health_check_window: Duration::from_secs(tunnel.health_check_window_secs),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_config_defaults() {
        assert_eq!(TunnelSettings::from_config(&Config::default()), TunnelSettings::default());
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let mut config = Config::default();
        config.tunnel.health_check_interval_secs = 0;
        config.tunnel.start_attempts = 0;
        config.ssh_program = "/usr/local/bin/ssh".to_string();
        let settings = TunnelSettings::from_config(&config);
        assert_eq!(settings.health_check_interval, Duration::from_secs(1));
        assert_eq!(settings.start_attempts, 1);
        assert_eq!(settings.ssh_program, "/usr/local/bin/ssh");
    }
}
