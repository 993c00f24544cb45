//! Per-tunnel health metrics

use std::time::Duration;

use chrono::{DateTime, Local};

/// Weight of the previous average in the latency moving average
const LATENCY_DECAY: f64 = 0.8;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Health-check counters and the last observed state of a tunnel
///
/// Counters only grow and `failed_checks <= total_checks`.
#[derive(Debug, Clone, PartialEq)]
pub struct TunnelMetrics {
    pub created_at: DateTime<Local>,
    pub last_health_check: Option<DateTime<Local>>,
    pub last_success: Option<DateTime<Local>>,
    pub total_checks: u64,
    pub failed_checks: u64,
    pub restart_count: u64,
    pub avg_latency: Duration,
    pub ipv4_ok: bool,
    pub ipv6_ok: bool,
    pub last_error: String,
    pub uptime_seconds: u64,
}

impl Default for TunnelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl TunnelMetrics {
    pub fn new() -> Self {
        Self::created(Local::now())
    }

    fn created(at: DateTime<Local>) -> Self {
        Self {
            created_at: at,
            last_health_check: None,
            last_success: None,
            total_checks: 0,
            failed_checks: 0,
            restart_count: 0,
            avg_latency: Duration::ZERO,
            ipv4_ok: false,
            ipv6_ok: false,
            last_error: String::new(),
            uptime_seconds: 0,
        }
    }

    pub(crate) fn begin_check(&mut self, now: DateTime<Local>) {
        self.last_health_check = Some(now);
        self.total_checks += 1;
        self.uptime_seconds = (now - self.created_at).num_seconds().max(0) as u64;
    }

    pub(crate) fn record_protocols(&mut self, ipv4_ok: bool, ipv6_ok: bool) {
        self.ipv4_ok = ipv4_ok;
        self.ipv6_ok = ipv6_ok;
    }

    pub(crate) fn record_failure(&mut self, error: impl Into<String>) {
        self.failed_checks = (self.failed_checks + 1).min(self.total_checks);
        self.last_error = error.into();
    }

    pub(crate) fn record_success(&mut self, latency: Duration, now: DateTime<Local>) {
        self.last_success = Some(now);
        self.last_error.clear();
        self.avg_latency = if self.avg_latency.is_zero() {
            latency
        } else {
            let nanos = self.avg_latency.as_nanos() as f64 * LATENCY_DECAY
                + latency.as_nanos() as f64 * (1.0 - LATENCY_DECAY);
            Duration::from_nanos(nanos.round() as u64)
        };
    }

    /// Percentage of checks that passed, 0 before the first check
    pub fn success_rate(&self) -> f64 {
        if self.total_checks == 0 {
            return 0.0;
        }
        (self.total_checks - self.failed_checks) as f64 / self.total_checks as f64 * 100.0
    }

    /// The lines of the periodic metrics report for one tunnel
    pub fn report(&self, key: &str) -> Vec<String> {
        let uptime = Duration::from_secs(self.uptime_seconds);
        let last_success = self
            .last_success
            .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
            .unwrap_or_else(|| "never".to_string());
        let mut lines = vec![
            format!("Tunnel: {key}"),
            format!(
                "  Uptime: {} ({} seconds)",
                humantime::format_duration(uptime),
                self.uptime_seconds
            ),
            format!(
                "  Health Checks: {} total, {} failed ({:.1}% success rate)",
                self.total_checks,
                self.failed_checks,
                self.success_rate()
            ),
            format!("  Restarts: {}", self.restart_count),
            format!("  Avg Latency: {:?}", self.avg_latency),
            format!(
                "  Protocol Support: IPv4={}, IPv6={}",
                self.ipv4_ok, self.ipv6_ok
            ),
            format!("  Last Successful Check: {last_success}"),
        ];
        if !self.last_error.is_empty() {
            lines.push(format!("  Last Error: {}", self.last_error));
        }
        lines
    }
}
