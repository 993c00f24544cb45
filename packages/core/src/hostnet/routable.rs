//! Host address reachable from inside a node container

use std::fmt;
use std::net::IpAddr;

use serde::Serialize;

use crate::engine::{Engine, EngineClient, EngineError};

/// DNS name Docker Desktop resolves to the host
pub const DOCKER_HOST_ALIAS: &str = "host.docker.internal";

/// How a container reaches the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RoutableHost {
    Ip(IpAddr),
    Name(String),
}

impl fmt::Display for RoutableHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutableHost::Ip(ip) => write!(f, "{ip}"),
            RoutableHost::Name(name) => f.write_str(name),
        }
    }
}

/// The host address as seen from inside `container`
///
/// Docker on Linux: the gateway of the container's bridge network, which
/// shares the container's name. Docker Desktop: [`DOCKER_HOST_ALIAS`].
/// Podman on Linux: the container's own default gateway. Podman elsewhere
/// is unsupported.
pub async fn routable_host_ip_from_inside(
    client: &EngineClient,
    engine: Engine,
    container: &str,
) -> Result<RoutableHost, EngineError> {
    routable_host_for(client, engine, container, cfg!(target_os = "linux")).await
}

pub(crate) async fn routable_host_for(
    client: &EngineClient,
    engine: Engine,
    container: &str,
    linux: bool,
) -> Result<RoutableHost, EngineError> {
    if engine == Engine::Podman {
        if !linux {
            return Err(EngineError::Unsupported(
                "finding the host IP from inside a podman container is only implemented for linux"
                    .to_string(),
            ));
        }
        return podman_gateway(client, container).await;
    }
    if !linux {
        return Ok(RoutableHost::Name(DOCKER_HOST_ALIAS.to_string()));
    }

    let network = client
        .network_inspect(container)
        .await
        .map_err(|e| e.wrap(format!("network inspect {container}")))?;
    let gateway: IpAddr = network
        .gateway
        .parse()
        .map_err(|e| EngineError::parse("network gateway", format!("{:?}: {e}", network.gateway)))?;
    Ok(RoutableHost::Ip(gateway))
}

async fn podman_gateway(client: &EngineClient, container: &str) -> Result<RoutableHost, EngineError> {
    let rr = client
        .run(
            Engine::Podman,
            ["container", "inspect", "--format", "{{.NetworkSettings.Gateway}}", container],
            "inspect gateway",
        )
        .await?;
    let raw = rr.stdout_str();
    let gateway: IpAddr = raw
        .trim()
        .parse()
        .map_err(|e| EngineError::parse("container gateway", format!("{:?}: {e}", raw.trim())))?;
    Ok(RoutableHost::Ip(gateway))
}

/// Resolve `name` with `nslookup` inside `container`
pub async fn lookup_host_ip(
    client: &EngineClient,
    engine: Engine,
    container: &str,
    name: &str,
) -> Result<IpAddr, EngineError> {
    let rr = client
        .run(engine, ["exec", container, "nslookup", name], "nslookup")
        .await?;
    parse_nslookup(&rr.stdout_str()).ok_or_else(|| {
        EngineError::parse(
            "nslookup output",
            format!("no address for {name} in {:?}", rr.stdout_str().trim()),
        )
    })
}

/// First address following the `Name:` line of `nslookup` output
///
/// The resolver's own `Address:` line comes before `Name:` and is skipped.
pub fn parse_nslookup(output: &str) -> Option<IpAddr> {
    let mut answered = false;
    for line in output.lines().map(str::trim) {
        if line.starts_with("Name:") {
            answered = true;
            continue;
        }
        if !answered {
            continue;
        }
        if let Some(rest) = line.strip_prefix("Address") {
            let addr = rest.trim_start_matches(|c: char| c.is_ascii_digit() || c == ' ');
            let addr = addr.trim_start_matches(':').trim();
            if let Ok(ip) = addr.parse() {
                return Some(ip);
            }
        }
    }
    None
}
