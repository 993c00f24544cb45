//! Spawning the forwarding process and waiting for the port

use std::process::Stdio;
use std::time::Instant;

use tokio::process::{Child, Command};
use tokio_retry::RetryIf;

use super::probe::probe_port;
use super::settings::TunnelSettings;
use super::ssh::{self, TunnelSpec};
use super::TunnelError;

/// Sweeps between "still waiting" log lines
const WAIT_LOG_EVERY: u32 = 20;

/// A forwarding that accepted connections
#[derive(Debug)]
pub(crate) enum Launched {
    /// ssh is still our child
    Attached(Child),
    /// ssh daemonized after forwarding; only the port can be watched
    Forked,
}

fn spawn(settings: &TunnelSettings, spec: &TunnelSpec) -> Result<Child, TunnelError> {
    let args = ssh::tunnel_args(spec, &settings.control_path);
    tracing::debug!(
        "Spawning SSH tunnel: {} localhost:{} -> {}:{} via {}",
        settings.ssh_program,
        spec.local_port,
        spec.remote_host,
        spec.remote_port,
        spec.endpoint.target()
    );

    Command::new(&settings.ssh_program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TunnelError::Spawn {
            program: settings.ssh_program.clone(),
            source,
        })
}

/// Probe until the port answers, the process fails, or time runs out
///
/// A clean exit is ssh going to the background with `-f`; probing
/// continues and the result is [`Launched::Forked`].
async fn wait_ready(
    settings: &TunnelSettings,
    port: u16,
    mut child: Child,
) -> Result<Launched, (TunnelError, Child)> {
    let deadline = Instant::now() + settings.ready_timeout;
    let mut forked = false;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let probe = probe_port(port, settings.probe_timeout).await;
        if probe.any_ok() {
            tracing::debug!(
                "SSH tunnel ready on port {} after {} attempts (IPv4: {}, IPv6: {})",
                port,
                attempts,
                probe.ipv4.is_ok(),
                probe.ipv6.is_ok()
            );
            return Ok(if forked {
                Launched::Forked
            } else {
                Launched::Attached(child)
            });
        }
        if attempts % WAIT_LOG_EVERY == 0 {
            tracing::debug!("Still waiting for tunnel on port {} (attempt {})", port, attempts);
        }

        if !forked {
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) if status.success() => forked = true,
                Ok(Some(status)) => return Err((TunnelError::ProcessExited(status), child)),
                Err(e) => return Err((TunnelError::Wait(e), child)),
            }
        }

        if Instant::now() >= deadline {
            return Err((
                TunnelError::NotReady {
                    port,
                    timeout: settings.ready_timeout,
                },
                child,
            ));
        }
        tokio::time::sleep(settings.probe_interval).await;
    }
}

/// One start attempt; a failed attempt leaves no process behind
pub(crate) async fn start(settings: &TunnelSettings, spec: &TunnelSpec) -> Result<Launched, TunnelError> {
    let child = spawn(settings, spec)?;
    match wait_ready(settings, spec.local_port, child).await {
        Ok(launched) => Ok(launched),
        Err((err, mut child)) => {
            if let Err(e) = child.kill().await {
                tracing::debug!("SSH tunnel kill result: {}", e);
            }
            Err(err)
        }
    }
}

/// Start with up to `attempts` tries, sleeping `n × retry_step` after the
/// n-th failure
pub(crate) async fn start_with_retry(
    settings: &TunnelSettings,
    spec: &TunnelSpec,
    attempts: u32,
) -> Result<Launched, TunnelError> {
    let attempts = attempts.max(1);
    let step = settings.retry_step;
    let delays = (1..attempts).map(move |n| step * n);
    let mut attempt = 0u32;

    let result = RetryIf::spawn(
        delays,
        || {
            attempt += 1;
            tracing::debug!("Starting SSH tunnel (attempt {}/{})", attempt, attempts);
            start(settings, spec)
        },
        |e: &TunnelError| {
            tracing::warn!("SSH tunnel start attempt failed: {}", e);
            !matches!(e, TunnelError::Spawn { .. })
        },
    )
    .await;

    match result {
        Ok(launched) => {
            tracing::info!("SSH tunnel started successfully on port {}", spec.local_port);
            Ok(launched)
        }
        Err(e) => Err(TunnelError::Exhausted {
            attempts,
            source: Box::new(e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, TcpListener};

    use super::*;
    use crate::context::SshEndpoint;
    use crate::tunnel::find_available_port;
    use crate::tunnel::testing::StubSsh;

    fn spec(local_port: u16) -> TunnelSpec {
        TunnelSpec {
            endpoint: SshEndpoint {
                user: "me".to_string(),
                host: "example.test".to_string(),
                port: 22,
            },
            local_port,
            remote_host: "localhost".to_string(),
            remote_port: 8443,
        }
    }

    #[tokio::test]
    async fn attached_when_port_answers() {
        let stub = StubSsh::new("exec sleep 30");
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();

        let launched = start(&stub.settings(), &spec(port)).await.unwrap();
        assert!(matches!(launched, Launched::Attached(_)));
    }

    #[tokio::test]
    async fn clean_exit_means_forked() {
        let stub = StubSsh::new("exit 0");
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        // Let the stub exit before the first probe lands.
        drop(listener);
        let mut settings = stub.settings();
        settings.ready_timeout = std::time::Duration::from_secs(2);

        let task = tokio::spawn({
            let settings = settings.clone();
            async move { start(&settings, &spec(port)).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let _listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).unwrap();

        let launched = task.await.unwrap().unwrap();
        assert!(matches!(launched, Launched::Forked));
    }

    #[tokio::test]
    async fn failed_exit_is_reported_per_attempt() {
        let stub = StubSsh::new("exit 255");
        let port = find_available_port().unwrap();

        let err = start_with_retry(&stub.settings(), &spec(port), 2)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::Exhausted { attempts: 2, .. }));
        assert!(matches!(err.root(), TunnelError::ProcessExited(_)));
        assert_eq!(stub.launches(), 2);
    }

    #[tokio::test]
    async fn missing_program_is_not_retried() {
        let mut settings = StubSsh::new("exit 0").settings();
        settings.ssh_program = "/nonexistent/ssh".to_string();

        let err = start_with_retry(&settings, &spec(find_available_port().unwrap()), 3)
            .await
            .unwrap_err();
        assert!(matches!(err.root(), TunnelError::Spawn { .. }));
    }
}
