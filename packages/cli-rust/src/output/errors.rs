//! Error formatting with cause-specific tips
//!
//! Engine, tunnel and context errors are recognized anywhere in the error
//! chain; each adds the tips that apply to its cause.

use console::style;
use kicup_core::hostnet::MountError;
use kicup_core::{ContextError, EngineError, ErrorKind, RunError, TunnelError};

/// Render `err` as a styled multi-line message for stderr
pub fn format_error(err: &anyhow::Error) -> String {
    let mut out = format!("{} {}", style("Error:").red().bold(), err);
    let tips = tips_for(err);
    if !tips.is_empty() {
        out.push('\n');
        for tip in tips {
            out.push_str(&format!("\n  {} {}", style("Tip:").cyan(), tip));
        }
    }
    out
}

fn tips_for(err: &anyhow::Error) -> Vec<&'static str> {
    let mut tips = Vec::new();
    for cause in err.chain() {
        let found = if let Some(e) = cause.downcast_ref::<EngineError>() {
            engine_tips(e)
        } else if let Some(e) = cause.downcast_ref::<TunnelError>() {
            tunnel_tips(e)
        } else if let Some(e) = cause.downcast_ref::<ContextError>() {
            context_tips(e)
        } else if let Some(e) = cause.downcast_ref::<RunError>() {
            run_tips(e)
        } else if cause.downcast_ref::<MountError>().is_some() {
            vec!["Mount specs look like /host/path:/container/path[:ro,Z,rshared]"]
        } else {
            Vec::new()
        };
        for tip in found {
            if !tips.contains(&tip) {
                tips.push(tip);
            }
        }
    }
    tips
}

fn engine_tips(err: &EngineError) -> Vec<&'static str> {
    let Some(kind) = err.kind() else {
        return Vec::new();
    };
    let tip = match kind {
        ErrorKind::WindowsContainers => "Switch the daemon to Linux containers.",
        ErrorKind::MinDockerVersion => "Upgrade the container engine to a supported version.",
        ErrorKind::CpuCountLimit => "Give the daemon more CPUs, or ask for fewer per node.",
        ErrorKind::IpInUse => "Another container holds that address; remove it or use another network.",
        ErrorKind::InsufficientStorage => {
            "Free disk space for the daemon, e.g. with `docker system prune`."
        }
        ErrorKind::ExitedUnexpectedly => {
            "Run `kicup container debug <name> -vv` for inspect output and full logs."
        }
        ErrorKind::DaemonInfo => "Check that the daemon is running and reachable: `docker info`.",
        ErrorKind::GetSshPortContainerNotRunning | ErrorKind::GetPortContainerNotRunning => {
            "Start the container first; `kicup container status <name>` shows its state."
        }
        ErrorKind::NetworkSubnetTaken | ErrorKind::NetworkGatewayTaken => {
            "Remove unused networks with `docker network prune`."
        }
        ErrorKind::NetworkNotFound => "List existing networks with `docker network ls`.",
        ErrorKind::NetworkInUse => "Stop the containers attached to the network first.",
        ErrorKind::VolumeNotFound => "List existing volumes with `docker volume ls`.",
    };
    let mut tips = vec![tip];
    if kind.is_fail_fast() {
        tips.push("Retrying will not help until this is fixed.");
    }
    tips
}

fn tunnel_tips(err: &TunnelError) -> Vec<&'static str> {
    match err.root() {
        TunnelError::Context(e) => context_tips(e),
        TunnelError::UnsupportedContext => vec![
            "Tunnels need an ssh:// context; tcp:// daemons are reached directly.",
        ],
        TunnelError::Spawn { .. } => {
            vec!["Install an OpenSSH client or set `ssh_program` in the config file."]
        }
        TunnelError::SshCheck(_) | TunnelError::UnexpectedResponse(_) => vec![
            "Check that `ssh user@host echo ok` works without a password prompt.",
            "Load your key into ssh-agent; tunnels run ssh with BatchMode=yes.",
        ],
        TunnelError::ProcessExited(_)
        | TunnelError::NotReady { .. }
        | TunnelError::PortUnresponsive { .. } => vec![
            "Check that the service is listening on the remote host.",
            "Run with -vv to see each start attempt.",
        ],
        TunnelError::RemoteService(_) => {
            vec!["The API server on the remote host did not answer; is the cluster up?"]
        }
        TunnelError::PortAllocation(_)
        | TunnelError::Wait(_)
        | TunnelError::Exhausted { .. }
        | TunnelError::PreCheck { .. }
        | TunnelError::Start { .. }
        | TunnelError::NotFound(_) => Vec::new(),
    }
}

fn context_tips(err: &ContextError) -> Vec<&'static str> {
    match err {
        ContextError::SshMissingUser(_) | ContextError::SshMissingHostname(_) => {
            vec!["SSH daemon hosts look like ssh://user@host[:port]."]
        }
        ContextError::InvalidHost { .. }
        | ContextError::MissingHost { .. }
        | ContextError::TcpMissingHostname(_) => {
            vec!["Check DOCKER_HOST, or the endpoint of the current docker context."]
        }
        ContextError::NotFound(_) | ContextError::MissingDockerEndpoint(_) => vec![
            "List contexts with `docker context ls`; pick one with `docker context use`.",
        ],
        ContextError::Parse { .. } => {
            vec!["Check ~/.docker/config.json and the context store for syntax errors."]
        }
        ContextError::NoConfigDir => vec!["Set HOME or DOCKER_CONFIG."],
        ContextError::NotSsh(_) | ContextError::Read { .. } | ContextError::Tls(_) => Vec::new(),
    }
}

fn run_tips(err: &RunError) -> Vec<&'static str> {
    match err {
        RunError::DeadlineExceeded { .. } => vec![
            "The daemon is slow to respond; raise `runner.default_timeout_secs` in the config file.",
        ],
        RunError::Spawn { .. } => vec!["Check that docker or podman is installed and on PATH."],
        RunError::Wait { .. } | RunError::Failed { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_fast_errors_say_retrying_will_not_help() {
        let err = anyhow::Error::from(EngineError::from(ErrorKind::CpuCountLimit).fail_fast());
        let tips = tips_for(&err);
        assert!(tips[0].contains("more CPUs"));
        assert!(tips.contains(&"Retrying will not help until this is fixed."));
    }

    #[test]
    fn tunnel_tips_look_through_labels() {
        let err = TunnelError::PreCheck {
            key: "host:8443->localhost:4000".to_string(),
            source: Box::new(TunnelError::UnexpectedResponse("nope".to_string())),
        };
        let tips = tips_for(&anyhow::Error::from(err));
        assert!(tips.iter().any(|t| t.contains("BatchMode")));
    }

    #[test]
    fn context_errors_inside_tunnel_errors_get_context_tips() {
        let err = TunnelError::from(ContextError::SshMissingUser("ssh://box".to_string()));
        let tips = tips_for(&anyhow::Error::from(err));
        assert_eq!(tips, vec!["SSH daemon hosts look like ssh://user@host[:port]."]);
    }

    #[test]
    fn unrelated_errors_have_no_tips() {
        let err = anyhow::anyhow!("something else");
        assert!(tips_for(&err).is_empty());
        assert!(format_error(&err).contains("something else"));
    }

    #[test]
    fn tips_are_listed_once() {
        let inner = EngineError::from(ErrorKind::NetworkInUse);
        let err = anyhow::Error::from(inner.wrap("removing network kind"));
        assert_eq!(tips_for(&err).len(), 1);
    }
}
