//! Daemon host URL classification and validation

use url::{Host, Url};

use super::ContextInfo;
use super::error::ContextError;

/// Default SSH port when the context URL omits one
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Classify a daemon host URL as `(is_remote, is_ssh)`
///
/// - empty → local
/// - `ssh://` → remote over SSH
/// - `tcp://`, `https://` → remote unless the hostname is loopback
/// - `unix://`, `npipe://` → local
/// - anything else → remote, with a warning
pub fn parse_host_info(host: &str) -> Result<(bool, bool), ContextError> {
    if host.is_empty() {
        return Ok((false, false));
    }
    // Socket paths carry no hostname to classify.
    if host.starts_with("unix://") || host.starts_with("npipe://") {
        return Ok((false, false));
    }

    let url = parse_url(host)?;
    match url.scheme() {
        "ssh" => Ok((true, true)),
        "tcp" | "https" => {
            let local = matches!(
                hostname(&url).as_deref(),
                Some("localhost" | "127.0.0.1" | "::1")
            );
            Ok((!local, false))
        }
        "unix" | "npipe" => Ok((false, false)),
        other => {
            tracing::warn!("Unknown daemon host scheme {:?}, assuming remote", other);
            Ok((true, false))
        }
    }
}

/// Where to reach the SSH daemon behind an `ssh://` context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEndpoint {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl SshEndpoint {
    /// `user@host` as passed to ssh
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Extract user, host and port from an SSH context
pub fn ssh_endpoint(ctx: &ContextInfo) -> Result<SshEndpoint, ContextError> {
    if !ctx.is_ssh {
        return Err(ContextError::NotSsh(ctx.name.clone()));
    }
    if ctx.host.is_empty() {
        return Err(ContextError::MissingHost {
            kind: "SSH",
            name: ctx.name.clone(),
        });
    }
    let url = parse_url(&ctx.host)?;
    if url.username().is_empty() {
        return Err(ContextError::SshMissingUser(ctx.host.clone()));
    }
    let host = hostname(&url).ok_or_else(|| ContextError::SshMissingHostname(ctx.host.clone()))?;
    Ok(SshEndpoint {
        user: url.username().to_string(),
        host,
        port: url.port().unwrap_or(DEFAULT_SSH_PORT),
    })
}

/// Check that an SSH context names both a user and a host
pub fn validate_ssh_context(ctx: &ContextInfo) -> Result<(), ContextError> {
    if ctx.host.is_empty() {
        return Err(ContextError::MissingHost {
            kind: "SSH",
            name: ctx.name.clone(),
        });
    }
    let url = parse_url(&ctx.host)?;
    if url.username().is_empty() {
        return Err(ContextError::SshMissingUser(ctx.host.clone()));
    }
    if hostname(&url).is_none() {
        return Err(ContextError::SshMissingHostname(ctx.host.clone()));
    }
    Ok(())
}

/// Check that a TCP/TLS context names a host
///
/// Missing TLS material on `tcp://` or `https://` is only a warning.
pub fn validate_tcp_context(ctx: &ContextInfo) -> Result<(), ContextError> {
    if ctx.host.is_empty() {
        return Err(ContextError::MissingHost {
            kind: "TCP",
            name: ctx.name.clone(),
        });
    }
    let url = parse_url(&ctx.host)?;
    if hostname(&url).is_none() {
        return Err(ContextError::TcpMissingHostname(ctx.host.clone()));
    }
    if matches!(url.scheme(), "https" | "tcp") && ctx.tls.is_none() {
        tracing::warn!(
            "TCP daemon context {:?} may need TLS configuration",
            ctx.name
        );
    }
    Ok(())
}

/// Validate whichever kind of remote context is in use
pub fn validate_remote_context(ctx: &ContextInfo) -> Result<(), ContextError> {
    if !ctx.is_remote {
        return Ok(());
    }
    if ctx.is_ssh {
        validate_ssh_context(ctx)
    } else {
        validate_tcp_context(ctx)
    }
}

fn parse_url(host: &str) -> Result<Url, ContextError> {
    Url::parse(host).map_err(|e| ContextError::InvalidHost {
        host: host.to_string(),
        reason: e.to_string(),
    })
}

/// Hostname without brackets, or `None` when the URL has no host
fn hostname(url: &Url) -> Option<String> {
    match url.host()? {
        Host::Domain(d) if d.is_empty() => None,
        Host::Domain(d) => Some(d.to_string()),
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(host: &str, remote: bool, ssh: bool) -> ContextInfo {
        ContextInfo {
            name: "test".to_string(),
            host: host.to_string(),
            is_remote: remote,
            is_ssh: ssh,
            tls: None,
        }
    }

    #[test]
    fn classify_hosts() {
        assert_eq!(parse_host_info("").unwrap(), (false, false));
        assert_eq!(parse_host_info("ssh://user@host:22").unwrap(), (true, true));
        assert_eq!(parse_host_info("tcp://localhost:2376").unwrap(), (false, false));
        assert_eq!(parse_host_info("tcp://127.0.0.1:2376").unwrap(), (false, false));
        assert_eq!(parse_host_info("tcp://[::1]:2376").unwrap(), (false, false));
        assert_eq!(parse_host_info("tcp://example.com:2376").unwrap(), (true, false));
        assert_eq!(parse_host_info("https://example.com:2376").unwrap(), (true, false));
        assert_eq!(
            parse_host_info("unix:///var/run/daemon.sock").unwrap(),
            (false, false)
        );
        assert_eq!(
            parse_host_info("npipe:////./pipe/daemon").unwrap(),
            (false, false)
        );
    }

    #[test]
    fn unknown_scheme_is_remote() {
        assert_eq!(parse_host_info("fd://example.com").unwrap(), (true, false));
    }

    #[test]
    fn unparseable_host_is_an_error() {
        let err = parse_host_info("not a url").unwrap_err();
        assert!(matches!(err, ContextError::InvalidHost { .. }));
    }

    #[test]
    fn ssh_endpoint_defaults_port() {
        let ep = ssh_endpoint(&ctx("ssh://user@example.com", true, true)).unwrap();
        assert_eq!(ep.user, "user");
        assert_eq!(ep.host, "example.com");
        assert_eq!(ep.port, 22);
        assert_eq!(ep.target(), "user@example.com");

        let ep = ssh_endpoint(&ctx("ssh://ops@10.0.0.5:2222", true, true)).unwrap();
        assert_eq!(ep.port, 2222);
    }

    #[test]
    fn ssh_validation_requires_user() {
        let err = validate_ssh_context(&ctx("ssh://example.com", true, true)).unwrap_err();
        assert!(matches!(err, ContextError::SshMissingUser(_)));
    }

    #[test]
    fn ssh_validation_rejects_empty_host() {
        let err = validate_ssh_context(&ctx("", true, true)).unwrap_err();
        assert!(matches!(err, ContextError::MissingHost { .. }));
    }

    #[test]
    fn tcp_validation_without_tls_is_ok() {
        assert!(validate_tcp_context(&ctx("tcp://example.com:2376", true, false)).is_ok());
    }

    #[test]
    fn local_contexts_skip_validation() {
        assert!(validate_remote_context(&ContextInfo::local_default()).is_ok());
    }

    #[test]
    fn ssh_endpoint_rejects_tcp_context() {
        let err = ssh_endpoint(&ctx("tcp://example.com:2376", true, false)).unwrap_err();
        assert!(matches!(err, ContextError::NotSsh(_)));
    }
}
