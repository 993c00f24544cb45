//! The keyed collection of tunnels and their supervisor tasks

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use super::health::{check_ssh, monitor_health};
use super::probe::{find_available_port, probe_port};
use super::process::{Launched, start_with_retry};
use super::settings::TunnelSettings;
use super::ssh::{self, TunnelSpec};
use super::{SshTunnel, TunnelError, TunnelMetrics, TunnelStatus};
use crate::context::{ContextInfo, ssh_endpoint};
use crate::runner::{Cmd, CommandRunner};

/// Remote side of API server tunnels
const API_SERVER_HOST: &str = "localhost";

/// Remote side of container SSH tunnels
const CONTAINER_SSH_HOST: &str = "127.0.0.1";

/// State shared between the manager and its background tasks
pub(crate) struct Shared {
    pub(crate) settings: TunnelSettings,
    pub(crate) runner: Arc<CommandRunner>,
    tunnels: Mutex<HashMap<String, Arc<SshTunnel>>>,
    /// Serializes opens of the same key
    opening: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Creates, supervises and stops SSH tunnels
///
/// The map lock only guards insertions and removals; process spawns,
/// probes and checks all run without it. Opens of one key are serialized
/// by a per-key async lock, so a key never gets two ssh processes.
pub struct TunnelManager {
    shared: Arc<Shared>,
}

impl TunnelManager {
    pub fn new(settings: TunnelSettings, runner: Arc<CommandRunner>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                runner,
                tunnels: Mutex::new(HashMap::new()),
                opening: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &TunnelSettings {
        &self.shared.settings
    }

    /// Forward a fresh local port to `localhost:{remote_port}` on the SSH host
    pub async fn create_api_server_tunnel(
        &self,
        ctx: &ContextInfo,
        remote_port: u16,
    ) -> Result<Arc<SshTunnel>, TunnelError> {
        let endpoint = ssh_endpoint(ctx)?;
        let local_port = find_available_port()?;
        let key = format!("{}:{}->localhost:{}", endpoint.host, remote_port, local_port);
        let spec = TunnelSpec {
            endpoint,
            local_port,
            remote_host: API_SERVER_HOST.to_string(),
            remote_port,
        };
        let tunnel = self.open(key, spec).await?;
        tracing::info!("SSH tunnel created: {}", tunnel.key());
        Ok(tunnel)
    }

    /// Forward a fresh local port to a container's published SSH port
    pub async fn create_container_ssh_tunnel(
        &self,
        ctx: &ContextInfo,
        container: &str,
        remote_port: u16,
    ) -> Result<Arc<SshTunnel>, TunnelError> {
        let endpoint = ssh_endpoint(ctx)?;
        let local_port = find_available_port()?;
        let spec = TunnelSpec {
            endpoint,
            local_port,
            remote_host: CONTAINER_SSH_HOST.to_string(),
            remote_port,
        };
        let tunnel = self.open(format!("container-ssh-{container}"), spec).await?;
        tracing::info!(
            "Container SSH tunnel created: {} (localhost:{} -> {}:{} via {})",
            tunnel.key(),
            tunnel.local_port(),
            tunnel.remote_host(),
            tunnel.remote_port(),
            tunnel.endpoint().target()
        );
        Ok(tunnel)
    }

    /// The local URL of the API server for `ctx`
    ///
    /// `None` for local contexts. Remote contexts must be SSH.
    pub async fn api_server_endpoint(
        &self,
        ctx: &ContextInfo,
        api_server_port: u16,
    ) -> Result<Option<String>, TunnelError> {
        if !ctx.is_remote {
            return Ok(None);
        }
        if !ctx.is_ssh {
            return Err(TunnelError::UnsupportedContext);
        }
        let tunnel = self.create_api_server_tunnel(ctx, api_server_port).await?;
        Ok(Some(tunnel.local_url()))
    }

    /// Register and start a tunnel under `key`
    ///
    /// An active tunnel already under `key` is returned as is; one in any
    /// other state is stopped and replaced. Nothing is registered when the
    /// pre-check or every start attempt fails.
    pub(crate) async fn open(&self, key: String, spec: TunnelSpec) -> Result<Arc<SshTunnel>, TunnelError> {
        let gate = self.shared.open_gate(&key);
        let result = {
            let _guard = gate.lock().await;
            self.open_locked(key.clone(), spec).await
        };
        self.shared.release_gate(&key, gate);
        result
    }

    async fn open_locked(&self, key: String, spec: TunnelSpec) -> Result<Arc<SshTunnel>, TunnelError> {
        let stale = {
            let mut tunnels = self.lock();
            match tunnels.get(&key) {
                Some(existing) if existing.status() == TunnelStatus::Active => {
                    tracing::info!("SSH tunnel already active: {}", key);
                    return Ok(existing.clone());
                }
                Some(_) => tunnels.remove(&key),
                None => None,
            }
        };
        if let Some(stale) = stale {
            tracing::debug!("Replacing stale tunnel {} ({})", key, stale.status());
            stale.shutdown().await;
        }

        let tunnel = Arc::new(SshTunnel::new(key.clone(), spec));
        let settings = &self.shared.settings;

        check_ssh(&self.shared.runner, settings, tunnel.endpoint())
            .await
            .map_err(|e| TunnelError::PreCheck {
                key: key.clone(),
                source: Box::new(e),
            })?;

        let launched = start_with_retry(settings, tunnel.spec(), settings.start_attempts)
            .await
            .map_err(|e| TunnelError::Start {
                key: key.clone(),
                source: Box::new(e),
            })?;
        tunnel.set_status(TunnelStatus::Active);

        let replaced = self.lock().insert(key, tunnel.clone());
        if let Some(replaced) = replaced {
            replaced.cancel();
        }

        tunnel.attach(tokio::spawn(supervise(
            self.shared.clone(),
            tunnel.clone(),
            launched,
        )));
        tunnel.attach(tokio::spawn(monitor_health(
            self.shared.clone(),
            tunnel.clone(),
        )));
        Ok(tunnel)
    }

    /// Stop and forget the tunnel under `key`
    pub async fn stop_tunnel(&self, key: &str) -> Result<(), TunnelError> {
        let tunnel = self
            .lock()
            .remove(key)
            .ok_or_else(|| TunnelError::NotFound(key.to_string()))?;
        tunnel.shutdown().await;
        tracing::info!("SSH tunnel stopped: {}", key);
        Ok(())
    }

    /// Stop every tunnel; harmless when there are none
    pub async fn stop_all_tunnels(&self) {
        let tunnels: Vec<Arc<SshTunnel>> = self.lock().drain().map(|(_, t)| t).collect();
        if tunnels.is_empty() {
            return;
        }
        for tunnel in tunnels {
            tunnel.shutdown().await;
        }
        tracing::info!("All SSH tunnels stopped");
    }

    /// Registered tunnels, in any state
    pub fn tunnels(&self) -> BTreeMap<String, Arc<SshTunnel>> {
        self.lock()
            .iter()
            .map(|(k, t)| (k.clone(), t.clone()))
            .collect()
    }

    /// Registered tunnels that are currently active
    pub fn active_tunnels(&self) -> BTreeMap<String, Arc<SshTunnel>> {
        self.lock()
            .iter()
            .filter(|(_, t)| t.status() == TunnelStatus::Active)
            .map(|(k, t)| (k.clone(), t.clone()))
            .collect()
    }

    /// A copy of every tunnel's metrics
    pub fn metrics_snapshot(&self) -> BTreeMap<String, TunnelMetrics> {
        self.shared.metrics_snapshot()
    }

    /// Log the metrics report for every tunnel
    pub fn log_metrics(&self) {
        self.shared.log_metrics();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SshTunnel>>> {
        self.shared.lock()
    }
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<SshTunnel>>> {
        self.tunnels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open_gate(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.opening
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Forget the gate for `key` once no other open is waiting on it
    fn release_gate(&self, key: &str, gate: Arc<tokio::sync::Mutex<()>>) {
        let mut opening = self.opening.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here.
        if Arc::strong_count(&gate) <= 2 {
            opening.remove(key);
        }
    }

    pub(crate) fn metrics_snapshot(&self) -> BTreeMap<String, TunnelMetrics> {
        let tunnels: Vec<Arc<SshTunnel>> = self.lock().values().cloned().collect();
        tunnels
            .into_iter()
            .map(|t| (t.key().to_string(), t.metrics()))
            .collect()
    }

    pub(crate) fn log_metrics(&self) {
        let snapshot = self.metrics_snapshot();
        if snapshot.is_empty() {
            tracing::debug!("No active tunnels to report metrics for");
            return;
        }
        tracing::info!("=== SSH Tunnel Health Metrics ===");
        for (key, metrics) in &snapshot {
            for line in metrics.report(key) {
                tracing::info!("{}", line);
            }
        }
        tracing::info!("=== End Tunnel Metrics ===");
    }

    /// Drop a daemonized ssh's forwardings from the control master
    async fn release_forwarding(&self, spec: &TunnelSpec) {
        let cmd = Cmd::new(&self.settings.ssh_program)
            .args(ssh::cancel_args(spec, &self.settings.control_path))
            .timeout(self.settings.ssh_check_timeout);
        if let Err(e) = self.runner.run(cmd, false).await {
            tracing::debug!("Releasing forwarding of port {} failed: {}", spec.local_port, e);
        }
    }

    async fn restart(&self, tunnel: &SshTunnel, was_forked: bool) -> Result<Launched, TunnelError> {
        tracing::info!(
            "Restarting SSH tunnel to {}:{}",
            tunnel.endpoint().host,
            tunnel.endpoint().port
        );
        tunnel.update_metrics(|m| m.restart_count += 1);
        if was_forked {
            self.release_forwarding(tunnel.spec()).await;
        }
        tokio::time::sleep(self.settings.restart_delay).await;
        tunnel.set_status(TunnelStatus::Restarting);

        let launched =
            start_with_retry(&self.settings, tunnel.spec(), self.settings.restart_attempts).await?;
        tunnel.transition(&[TunnelStatus::Restarting], TunnelStatus::Active);
        Ok(launched)
    }
}

/// Why a forwarding went away
enum Exit {
    /// ssh exited 0: it went to the background
    Clean,
    Lost(String),
}

async fn wait_exit(settings: &TunnelSettings, port: u16, launched: &mut Launched) -> Exit {
    match launched {
        Launched::Attached(child) => match child.wait().await {
            Ok(status) if status.success() => Exit::Clean,
            Ok(status) => Exit::Lost(format!("ssh exited with {status}")),
            Err(e) => Exit::Lost(format!("waiting for ssh: {e}")),
        },
        Launched::Forked => loop {
            tokio::time::sleep(settings.port_watch_interval).await;
            let probe = probe_port(port, settings.probe_timeout).await;
            if !probe.any_ok() {
                return Exit::Lost(probe.into_error().to_string());
            }
        },
    }
}

/// Watch the forwarding and restart it while the tunnel is live
///
/// Cancellation kills an attached process or releases a daemonized one.
/// The tunnel ends `stopped` however this returns.
async fn supervise(shared: Arc<Shared>, tunnel: Arc<SshTunnel>, mut launched: Launched) {
    let cancel = tunnel.cancel_token().clone();
    let port = tunnel.local_port();

    loop {
        let exit = tokio::select! {
            _ = cancel.cancelled() => None,
            exit = wait_exit(&shared.settings, port, &mut launched) => Some(exit),
        };
        let Some(exit) = exit else {
            match launched {
                Launched::Attached(mut child) => {
                    if let Err(e) = child.kill().await {
                        tracing::debug!("SSH tunnel kill result: {}", e);
                    }
                }
                Launched::Forked => shared.release_forwarding(tunnel.spec()).await,
            }
            break;
        };

        let was_forked = matches!(launched, Launched::Forked);
        match exit {
            Exit::Clean => {
                tracing::info!(
                    "SSH tunnel {} went to the background, watching port {}",
                    tunnel.key(),
                    port
                );
                launched = Launched::Forked;
                continue;
            }
            Exit::Lost(reason) => {
                tracing::warn!("SSH tunnel {} lost: {}", tunnel.key(), reason);
            }
        }

        if !tunnel.status().is_live() {
            break;
        }
        tracing::info!("Attempting to restart SSH tunnel...");
        let restarted = tokio::select! {
            _ = cancel.cancelled() => None,
            result = shared.restart(&tunnel, was_forked) => Some(result),
        };
        match restarted {
            None => break,
            Some(Ok(next)) => {
                tracing::info!("SSH tunnel restarted successfully: {}", tunnel.key());
                launched = next;
            }
            Some(Err(e)) => {
                tracing::error!("Failed to restart SSH tunnel {}: {}", tunnel.key(), e);
                break;
            }
        }
    }

    tunnel.set_status(TunnelStatus::Stopped);
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, TcpListener};
    use std::time::Duration;

    use super::*;
    use crate::context::SshEndpoint;
    use crate::tunnel::testing::{StubSsh, eventually};

    fn ssh_context() -> ContextInfo {
        ContextInfo {
            name: "builder".to_string(),
            host: "ssh://me@example.test:2222".to_string(),
            is_remote: true,
            is_ssh: true,
            tls: None,
        }
    }

    fn spec(local_port: u16) -> TunnelSpec {
        TunnelSpec {
            endpoint: SshEndpoint {
                user: "me".to_string(),
                host: "example.test".to_string(),
                port: 22,
            },
            local_port,
            remote_host: API_SERVER_HOST.to_string(),
            remote_port: 8443,
        }
    }

    fn bind_local() -> (TcpListener, u16) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn open_then_stop() {
        let stub = StubSsh::new("exec sleep 30");
        let manager = stub.manager(stub.settings());
        let (_listener, port) = bind_local();

        let tunnel = manager.open("api".to_string(), spec(port)).await.unwrap();
        assert_eq!(tunnel.status(), TunnelStatus::Active);
        assert!(manager.active_tunnels().contains_key("api"));

        let calls = stub.calls();
        assert!(calls[0].ends_with("me@example.test echo ssh-health-check"));
        assert!(calls[1].starts_with(&format!(
            "-L 127.0.0.1:{port}:localhost:8443 -L [::1]:{port}:localhost:8443 -N -f"
        )));

        manager.stop_tunnel("api").await.unwrap();
        assert_eq!(tunnel.status(), TunnelStatus::Stopped);
        assert!(manager.tunnels().is_empty());
        assert!(matches!(
            manager.stop_tunnel("api").await,
            Err(TunnelError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn active_tunnel_is_reused() {
        let stub = StubSsh::new("exec sleep 30");
        let manager = stub.manager(stub.settings());
        let (_listener, port) = bind_local();

        let first = manager.open("api".to_string(), spec(port)).await.unwrap();
        let second = manager.open("api".to_string(), spec(port)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(stub.launches(), 1);
        manager.stop_all_tunnels().await;
    }

    #[tokio::test]
    async fn concurrent_opens_share_one_process() {
        let stub = StubSsh::new("exec sleep 30");
        let manager = stub.manager(stub.settings());
        let (_listener, port) = bind_local();

        let (first, second) = tokio::join!(
            manager.open("api".to_string(), spec(port)),
            manager.open("api".to_string(), spec(port)),
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(stub.launches(), 1);
        assert_eq!(manager.tunnels().len(), 1);
        assert!(manager.shared.opening.lock().unwrap().is_empty());

        manager.stop_all_tunnels().await;
        assert_eq!(first.status(), TunnelStatus::Stopped);
    }

    #[tokio::test]
    async fn precheck_failure_registers_nothing() {
        let stub = StubSsh::with_check("echo 'Permission denied' >&2; exit 255", "exec sleep 30");
        let manager = stub.manager(stub.settings());
        let (_listener, port) = bind_local();

        let err = manager.open("api".to_string(), spec(port)).await.unwrap_err();
        assert!(matches!(err, TunnelError::PreCheck { .. }));
        assert!(err.to_string().starts_with("SSH connectivity pre-check failed for api: "));
        assert!(manager.tunnels().is_empty());
        assert_eq!(stub.launches(), 0);
    }

    #[tokio::test]
    async fn unexpected_check_output_fails() {
        let stub = StubSsh::with_check("echo hello", "exec sleep 30");
        let manager = stub.manager(stub.settings());
        let err = manager
            .open("api".to_string(), spec(find_available_port().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err.root(), TunnelError::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn start_failure_registers_nothing() {
        let stub = StubSsh::new("exit 255");
        let manager = stub.manager(stub.settings());

        let err = manager
            .create_api_server_tunnel(&ssh_context(), 8443)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Start { .. }));
        assert!(err.to_string().starts_with("starting SSH tunnel example.test:8443->localhost:"));
        assert!(manager.tunnels().is_empty());
        assert_eq!(stub.launches(), 2);
        assert!(stub.calls().iter().all(|c| c.starts_with("-p 2222 ")));
    }

    #[tokio::test]
    async fn exited_process_is_restarted() {
        let stub = StubSsh::new(
            "if [ \"$(grep -c -- ' -N ' \"$log\")\" -le 1 ]; then sleep 0.3; exit 1; fi; exec sleep 30",
        );
        let manager = stub.manager(stub.settings());
        let (_listener, port) = bind_local();

        let tunnel = manager.open("api".to_string(), spec(port)).await.unwrap();
        assert!(eventually(Duration::from_secs(5), || tunnel.metrics().restart_count == 1).await);
        assert!(
            eventually(Duration::from_secs(5), || tunnel.status() == TunnelStatus::Active).await
        );
        assert_eq!(stub.launches(), 2);

        manager.stop_all_tunnels().await;
        assert_eq!(tunnel.status(), TunnelStatus::Stopped);
        assert!(manager.tunnels().is_empty());
    }

    #[tokio::test]
    async fn forked_tunnel_follows_its_port() {
        let stub = StubSsh::new("exit 0");
        let manager = stub.manager(stub.settings());
        let (listener, port) = bind_local();

        let tunnel = manager.open("api".to_string(), spec(port)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tunnel.status(), TunnelStatus::Active);

        drop(listener);
        assert!(
            eventually(Duration::from_secs(5), || tunnel.status() == TunnelStatus::Stopped).await
        );
        let metrics = tunnel.metrics();
        assert_eq!(metrics.restart_count, 1);
        assert!(stub.calls().iter().any(|c| c.starts_with("-O cancel")));
        // A tunnel that could not be restarted stays registered.
        assert!(manager.tunnels().contains_key("api"));
        assert!(manager.active_tunnels().is_empty());
        manager.stop_tunnel("api").await.unwrap();
    }

    #[tokio::test]
    async fn health_checks_track_the_port() {
        let stub = StubSsh::new("exec sleep 30");
        let mut settings = stub.settings();
        settings.health_check_interval = Duration::from_millis(50);
        let manager = stub.manager(settings);
        let (listener, port) = bind_local();

        let tunnel = manager.open("api".to_string(), spec(port)).await.unwrap();
        assert!(eventually(Duration::from_secs(5), || tunnel.metrics().last_success.is_some()).await);
        assert!(tunnel.metrics().ipv4_ok);

        drop(listener);
        assert!(
            eventually(Duration::from_secs(5), || tunnel.status() == TunnelStatus::Unhealthy)
                .await
        );
        let metrics = tunnel.metrics();
        assert!(metrics.failed_checks >= 1);
        assert!(metrics.failed_checks <= metrics.total_checks);
        assert!(metrics.last_error.contains("not responsive"));

        let _listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap();
        assert!(
            eventually(Duration::from_secs(5), || tunnel.status() == TunnelStatus::Active).await
        );
        assert!(manager.metrics_snapshot()["api"].last_error.is_empty());
        manager.stop_all_tunnels().await;
    }

    #[tokio::test]
    async fn endpoint_depends_on_context_kind() {
        let stub = StubSsh::new("exec sleep 30");
        let manager = stub.manager(stub.settings());

        let local = ContextInfo::local_default();
        assert_eq!(manager.api_server_endpoint(&local, 8443).await.unwrap(), None);

        let tcp = ContextInfo {
            name: "remote".to_string(),
            host: "tcp://10.0.0.5:2376".to_string(),
            is_remote: true,
            is_ssh: false,
            tls: None,
        };
        assert!(matches!(
            manager.api_server_endpoint(&tcp, 8443).await,
            Err(TunnelError::UnsupportedContext)
        ));
        assert!(matches!(
            manager.create_container_ssh_tunnel(&tcp, "kicup", 22).await,
            Err(TunnelError::Context(_))
        ));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn stop_all_is_idempotent() {
        let stub = StubSsh::new("exec sleep 30");
        let manager = stub.manager(stub.settings());
        manager.stop_all_tunnels().await;
        manager.stop_all_tunnels().await;
        assert!(manager.metrics_snapshot().is_empty());
        manager.log_metrics();
    }
}
