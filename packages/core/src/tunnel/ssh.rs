//! ssh argument lists
//!
//! Every invocation shares one control master per user/host/port so the
//! health checks reuse the forwarding connection.

use crate::context::SshEndpoint;
use crate::context::host::DEFAULT_SSH_PORT;

/// Token echoed back by the connectivity check
pub const SSH_CHECK_TOKEN: &str = "ssh-health-check";

/// What a tunnel forwards, and through which SSH server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelSpec {
    pub endpoint: SshEndpoint,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
}

impl TunnelSpec {
    /// IPv4 then IPv6 loopback forwardings
    pub fn forwards(&self) -> [String; 2] {
        let target = format!("{}:{}", self.remote_host, self.remote_port);
        [
            format!("127.0.0.1:{}:{target}", self.local_port),
            format!("[::1]:{}:{target}", self.local_port),
        ]
    }
}

fn push_options(args: &mut Vec<String>, options: &[&str]) {
    for option in options {
        args.push("-o".to_string());
        args.push((*option).to_string());
    }
}

fn push_control(args: &mut Vec<String>, control_path: &str) {
    args.push("-o".to_string());
    args.push("ControlMaster=auto".to_string());
    args.push("-o".to_string());
    args.push(format!("ControlPath={control_path}"));
    args.push("-o".to_string());
    args.push("ControlPersist=600".to_string());
}

/// Prepend `-p` when the server is not on port 22
fn with_port(endpoint: &SshEndpoint, args: Vec<String>) -> Vec<String> {
    if endpoint.port == DEFAULT_SSH_PORT {
        return args;
    }
    let mut full = vec!["-p".to_string(), endpoint.port.to_string()];
    full.extend(args);
    full
}

/// The forwarding process: `-L` for both loopbacks, no command, background
pub fn tunnel_args(spec: &TunnelSpec, control_path: &str) -> Vec<String> {
    let mut args = Vec::new();
    for forward in spec.forwards() {
        args.push("-L".to_string());
        args.push(forward);
    }
    args.push("-N".to_string());
    args.push("-f".to_string());
    push_options(
        &mut args,
        &[
            "StrictHostKeyChecking=no",
            "UserKnownHostsFile=/dev/null",
            "LogLevel=ERROR",
            "ServerAliveInterval=30",
            "ServerAliveCountMax=3",
            "ExitOnForwardFailure=yes",
        ],
    );
    push_control(&mut args, control_path);
    args.push(spec.endpoint.target());
    with_port(&spec.endpoint, args)
}

/// A non-interactive `echo` round trip
pub fn check_args(endpoint: &SshEndpoint, control_path: &str) -> Vec<String> {
    let mut args = Vec::new();
    push_options(
        &mut args,
        &[
            "ConnectTimeout=3",
            "StrictHostKeyChecking=no",
            "UserKnownHostsFile=/dev/null",
            "LogLevel=ERROR",
            "BatchMode=yes",
        ],
    );
    push_control(&mut args, control_path);
    args.push(endpoint.target());
    args.push("echo".to_string());
    args.push(SSH_CHECK_TOKEN.to_string());
    with_port(endpoint, args)
}

/// curl the forwarded service from the SSH server, printing the HTTP code
pub fn remote_check_args(spec: &TunnelSpec) -> Vec<String> {
    let mut args = Vec::new();
    push_options(
        &mut args,
        &[
            "ConnectTimeout=2",
            "StrictHostKeyChecking=no",
            "UserKnownHostsFile=/dev/null",
            "LogLevel=ERROR",
            "BatchMode=yes",
        ],
    );
    args.push(spec.endpoint.target());
    args.extend(
        [
            "curl",
            "-k",
            "--connect-timeout",
            "2",
            "--max-time",
            "3",
            "--silent",
            "--output",
            "/dev/null",
            "--write-out",
            "%{http_code}",
        ]
        .map(String::from),
    );
    args.push(format!("https://{}:{}/", spec.remote_host, spec.remote_port));
    with_port(&spec.endpoint, args)
}

/// Ask the control master to drop this tunnel's forwardings
pub fn cancel_args(spec: &TunnelSpec, control_path: &str) -> Vec<String> {
    let mut args = vec!["-O".to_string(), "cancel".to_string()];
    for forward in spec.forwards() {
        args.push("-L".to_string());
        args.push(forward);
    }
    args.push("-o".to_string());
    args.push(format!("ControlPath={control_path}"));
    args.push(spec.endpoint.target());
    with_port(&spec.endpoint, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::CONTROL_PATH;

    fn spec(port: u16) -> TunnelSpec {
        TunnelSpec {
            endpoint: SshEndpoint {
                user: "core".to_string(),
                host: "builder.example".to_string(),
                port,
            },
            local_port: 41234,
            remote_host: "localhost".to_string(),
            remote_port: 8443,
        }
    }

    #[test]
    fn tunnel_args_forward_both_loopbacks() {
        let args = tunnel_args(&spec(22), CONTROL_PATH);
        assert_eq!(
            args[..6],
            [
                "-L",
                "127.0.0.1:41234:localhost:8443",
                "-L",
                "[::1]:41234:localhost:8443",
                "-N",
                "-f"
            ]
        );
        assert!(args.contains(&"ExitOnForwardFailure=yes".to_string()));
        assert!(args.contains(&"ControlPath=/tmp/kicup-ssh-%r@%h:%p".to_string()));
        assert!(args.contains(&"ControlPersist=600".to_string()));
        assert_eq!(args.last().unwrap(), "core@builder.example");
    }

    #[test]
    fn non_default_port_is_prepended() {
        let args = tunnel_args(&spec(2222), CONTROL_PATH);
        assert_eq!(args[..2], ["-p", "2222"]);
        assert_eq!(args[2], "-L");

        let check = check_args(&spec(2222).endpoint, CONTROL_PATH);
        assert_eq!(check[..2], ["-p", "2222"]);
    }

    #[test]
    fn check_echoes_token_in_batch_mode() {
        let args = check_args(&spec(22).endpoint, CONTROL_PATH);
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert!(args.contains(&"ConnectTimeout=3".to_string()));
        assert_eq!(
            args[args.len() - 3..],
            ["core@builder.example", "echo", "ssh-health-check"]
        );
    }

    #[test]
    fn remote_check_targets_forwarded_service() {
        let args = remote_check_args(&spec(22));
        assert_eq!(args.last().unwrap(), "https://localhost:8443/");
        assert!(args.contains(&"%{http_code}".to_string()));
    }

    #[test]
    fn cancel_names_the_same_forwards() {
        let args = cancel_args(&spec(22), CONTROL_PATH);
        assert_eq!(args[..2], ["-O", "cancel"]);
        assert!(args.contains(&"[::1]:41234:localhost:8443".to_string()));
    }
}
