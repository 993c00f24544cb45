//! Local port allocation and dual-stack probing

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};
use std::time::Duration;

use tokio::net::TcpStream;

use super::TunnelError;

/// Find an available local port for a tunnel
///
/// The listener is dropped before returning, so another process may take
/// the port first; ssh's `ExitOnForwardFailure` turns that into a failed
/// start attempt.
pub fn find_available_port() -> Result<u16, TunnelError> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(TunnelError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(TunnelError::PortAllocation)?
        .port();
    drop(listener);
    Ok(port)
}

/// Result of dialing a port on both loopback addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortProbe {
    pub ipv4: Result<(), String>,
    pub ipv6: Result<(), String>,
}

impl PortProbe {
    /// At least one address family accepted the connection
    pub fn any_ok(&self) -> bool {
        self.ipv4.is_ok() || self.ipv6.is_ok()
    }

    pub fn into_error(self) -> TunnelError {
        fn describe(result: Result<(), String>) -> String {
            result.err().unwrap_or_else(|| "ok".to_string())
        }
        TunnelError::PortUnresponsive {
            ipv4: describe(self.ipv4),
            ipv6: describe(self.ipv6),
        }
    }
}

async fn dial(addr: SocketAddr, timeout: Duration) -> Result<(), String> {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("dial {addr}: {e}")),
        Err(_) => Err(format!("dial {addr}: i/o timeout")),
    }
}

/// Dial `127.0.0.1:port` and `[::1]:port` concurrently
pub async fn probe_port(port: u16, timeout: Duration) -> PortProbe {
    let (ipv4, ipv6) = tokio::join!(
        dial(SocketAddr::from((Ipv4Addr::LOCALHOST, port)), timeout),
        dial(SocketAddr::from((Ipv6Addr::LOCALHOST, port)), timeout),
    );
    PortProbe { ipv4, ipv6 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_a_port() {
        let port = find_available_port().unwrap();
        assert_ne!(port, 0);
    }

    #[tokio::test]
    async fn probe_sees_ipv4_listener() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = probe_port(port, Duration::from_millis(500)).await;
        assert!(probe.ipv4.is_ok());
        assert!(probe.any_ok());
    }

    #[tokio::test]
    async fn closed_port_reports_both_families() {
        let port = find_available_port().unwrap();
        let probe = probe_port(port, Duration::from_millis(500)).await;
        assert!(!probe.any_ok());
        let message = probe.into_error().to_string();
        assert!(message.starts_with("local tunnel port not responsive (IPv4: dial 127.0.0.1:"));
        assert!(message.contains("IPv6: dial [::1]:"));
    }
}
