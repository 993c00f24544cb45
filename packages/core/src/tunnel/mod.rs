//! SSH tunnel management
//!
//! Forwards local ports to services behind an `ssh://` daemon context.
//! Each tunnel wraps an `ssh -L` process that a supervisor task restarts
//! when it dies, while a health task probes the forwarded port and the SSH
//! connection and keeps per-tunnel metrics.

mod error;
mod health;
mod manager;
mod metrics;
mod probe;
mod process;
mod settings;
pub mod ssh;

use std::fmt;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::context::SshEndpoint;

pub use error::TunnelError;
pub use manager::TunnelManager;
pub use metrics::TunnelMetrics;
pub use probe::{PortProbe, find_available_port, probe_port};
pub use settings::{CONTROL_PATH, TunnelSettings};
pub use ssh::TunnelSpec;

/// How long stopping a tunnel waits for its tasks to finish
const STOP_GRACE: Duration = Duration::from_secs(10);

/// Lifecycle of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelStatus {
    Starting,
    Active,
    Unhealthy,
    Restarting,
    Stopped,
}

impl TunnelStatus {
    /// Whether the forwarding is expected to work right now
    pub fn is_live(self) -> bool {
        matches!(self, TunnelStatus::Active | TunnelStatus::Unhealthy)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TunnelStatus::Starting => "starting",
            TunnelStatus::Active => "active",
            TunnelStatus::Unhealthy => "unhealthy",
            TunnelStatus::Restarting => "restarting",
            TunnelStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TunnelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One supervised port forwarding
///
/// The supervisor task owns the `ssh` child process; the tunnel owns the
/// cancel token and the task handles, so cancelling the tunnel kills the
/// process.
pub struct SshTunnel {
    key: String,
    spec: TunnelSpec,
    status: RwLock<TunnelStatus>,
    metrics: Mutex<TunnelMetrics>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SshTunnel {
    pub(crate) fn new(key: String, spec: TunnelSpec) -> Self {
        Self {
            key,
            spec,
            status: RwLock::new(TunnelStatus::Starting),
            metrics: Mutex::new(TunnelMetrics::new()),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn spec(&self) -> &TunnelSpec {
        &self.spec
    }

    pub fn local_port(&self) -> u16 {
        self.spec.local_port
    }

    pub fn remote_host(&self) -> &str {
        &self.spec.remote_host
    }

    pub fn remote_port(&self) -> u16 {
        self.spec.remote_port
    }

    pub fn endpoint(&self) -> &SshEndpoint {
        &self.spec.endpoint
    }

    /// `https://localhost:{local_port}`
    pub fn local_url(&self) -> String {
        format!("https://localhost:{}", self.spec.local_port)
    }

    pub fn status(&self) -> TunnelStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_status(&self, status: TunnelStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Move to `to` only from one of `from`; returns whether it moved
    pub(crate) fn transition(&self, from: &[TunnelStatus], to: TunnelStatus) -> bool {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        if from.contains(&status) {
            *status = to;
            true
        } else {
            false
        }
    }

    /// A consistent copy of the metrics
    pub fn metrics(&self) -> TunnelMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn update_metrics(&self, update: impl FnOnce(&mut TunnelMetrics)) {
        update(&mut self.metrics.lock().unwrap_or_else(PoisonError::into_inner));
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn attach(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Cancel the tunnel without waiting for its tasks
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Cancel the tunnel and wait for the process to be released
    pub(crate) async fn shutdown(&self) {
        self.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            if tokio::time::timeout(STOP_GRACE, task).await.is_err() {
                tracing::warn!("Tunnel {} did not stop within {:?}", self.key, STOP_GRACE);
            }
        }
        self.set_status(TunnelStatus::Stopped);
    }
}

impl fmt::Debug for SshTunnel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshTunnel")
            .field("key", &self.key)
            .field("spec", &self.spec)
            .field("status", &self.status())
            .finish()
    }
}
