//! Connectivity checks and the periodic health task

use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use tokio::time::{self, MissedTickBehavior};

use super::manager::Shared;
use super::probe::probe_port;
use super::settings::TunnelSettings;
use super::ssh::{self, SSH_CHECK_TOKEN, TunnelSpec};
use super::{SshTunnel, TunnelError, TunnelStatus};
use crate::context::SshEndpoint;
use crate::runner::{Cmd, CommandRunner};

/// `echo` over SSH; the output must carry the check token
pub(crate) async fn check_ssh(
    runner: &CommandRunner,
    settings: &TunnelSettings,
    endpoint: &SshEndpoint,
) -> Result<(), TunnelError> {
    let cmd = Cmd::new(&settings.ssh_program)
        .args(ssh::check_args(endpoint, &settings.control_path))
        .timeout(settings.ssh_check_timeout);
    let rr = runner.run(cmd, false).await.map_err(TunnelError::SshCheck)?;
    if !rr.contains(SSH_CHECK_TOKEN) {
        return Err(TunnelError::UnexpectedResponse(rr.output()));
    }
    Ok(())
}

/// curl the forwarded service from the SSH server; any HTTP code counts
async fn check_remote_service(
    runner: &CommandRunner,
    settings: &TunnelSettings,
    spec: &TunnelSpec,
) -> Result<String, TunnelError> {
    let cmd = Cmd::new(&settings.ssh_program)
        .args(ssh::remote_check_args(spec))
        .timeout(settings.remote_check_timeout);
    let rr = runner
        .run(cmd, false)
        .await
        .map_err(|e| TunnelError::RemoteService(e.to_string()))?;
    let code = rr.stdout_str().trim().to_string();
    if code.is_empty() || code == "000" {
        return Err(TunnelError::RemoteService(
            "remote service not responding".to_string(),
        ));
    }
    Ok(code)
}

/// Probe the local port, the SSH connection, and (informationally) the
/// remote service, recording the outcome in the tunnel's metrics
pub(crate) async fn perform_health_check(
    runner: &CommandRunner,
    settings: &TunnelSettings,
    tunnel: &SshTunnel,
) -> Result<(), TunnelError> {
    let started = Instant::now();
    tunnel.update_metrics(|m| m.begin_check(Local::now()));

    let probe = probe_port(tunnel.local_port(), settings.probe_timeout).await;
    tunnel.update_metrics(|m| m.record_protocols(probe.ipv4.is_ok(), probe.ipv6.is_ok()));
    if !probe.any_ok() {
        let err = probe.into_error();
        tunnel.update_metrics(|m| m.record_failure(err.to_string()));
        return Err(err);
    }
    tracing::debug!(
        "Tunnel health check: IPv4={}, IPv6={}",
        probe.ipv4.is_ok(),
        probe.ipv6.is_ok()
    );

    if let Err(err) = check_ssh(runner, settings, tunnel.endpoint()).await {
        tunnel.update_metrics(|m| m.record_failure(err.to_string()));
        return Err(err);
    }

    match check_remote_service(runner, settings, tunnel.spec()).await {
        Ok(code) => tracing::debug!("Remote service health check: HTTP {}", code),
        Err(e) => tracing::debug!("Remote service connectivity check failed (may be normal): {}", e),
    }

    let latency = started.elapsed();
    tunnel.update_metrics(|m| m.record_success(latency, Local::now()));
    Ok(())
}

/// Check the tunnel on every tick until it stops or the window closes
///
/// Also logs the manager-wide metrics report on its own, slower ticker.
pub(crate) async fn monitor_health(shared: Arc<Shared>, tunnel: Arc<SshTunnel>) {
    let settings = &shared.settings;
    let cancel = tunnel.cancel_token().clone();
    let now = time::Instant::now();

    let mut checks = time::interval_at(
        now + settings.health_check_interval,
        settings.health_check_interval,
    );
    checks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut reports = time::interval_at(
        now + settings.metrics_log_interval,
        settings.metrics_log_interval,
    );
    reports.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let window = time::sleep(settings.health_check_window);
    tokio::pin!(window);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = &mut window => {
                tracing::debug!(
                    "Stopping health monitoring for {} after {:?}",
                    tunnel.key(),
                    settings.health_check_window
                );
                return;
            }
            _ = reports.tick() => shared.log_metrics(),
            _ = checks.tick() => {
                match tunnel.status() {
                    TunnelStatus::Stopped => return,
                    TunnelStatus::Active | TunnelStatus::Unhealthy => {}
                    TunnelStatus::Starting | TunnelStatus::Restarting => continue,
                }
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => return,
                    outcome = perform_health_check(&shared.runner, settings, &tunnel) => outcome,
                };
                match outcome {
                    Ok(()) => {
                        if tunnel.transition(&[TunnelStatus::Unhealthy], TunnelStatus::Active) {
                            tracing::info!("SSH tunnel health restored: {}", tunnel.key());
                        }
                    }
                    Err(e) => {
                        tracing::warn!("SSH tunnel health check failed for {}: {}", tunnel.key(), e);
                        tunnel.transition(&[TunnelStatus::Active], TunnelStatus::Unhealthy);
                    }
                }
            }
        }
    }
}
