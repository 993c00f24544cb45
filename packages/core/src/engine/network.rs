//! Cluster network create, inspect and remove

use std::net::Ipv4Addr;

use serde::Serialize;

use super::{CREATED_BY_LABEL, Engine, EngineClient, EngineError, ErrorKind, PROFILE_LABEL, stderr};
use crate::hostnet::{FIRST_SUBNET, SUBNET_ATTEMPTS, Subnet, candidate_subnets, gateway_of};

/// `network inspect` template: subnet and gateway of the first IPAM config
pub const NETWORK_INSPECT_FORMAT: &str =
    "{{(index .IPAM.Config 0).Subnet}},{{(index .IPAM.Config 0).Gateway}}";

/// Addressing of an existing network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub subnet: String,
    pub gateway: String,
}

fn parse_network_inspect(output: &str) -> Result<NetworkInfo, EngineError> {
    let line = output.trim();
    let mut parts = line.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(subnet), Some(gateway), None) if !subnet.is_empty() => Ok(NetworkInfo {
            subnet: subnet.trim().to_string(),
            gateway: gateway.trim().to_string(),
        }),
        _ => Err(EngineError::parse(
            "network inspect output",
            format!("unexpected {line:?}"),
        )),
    }
}

impl EngineClient {
    /// Subnet and gateway of a docker network
    pub async fn network_inspect(&self, name: &str) -> Result<NetworkInfo, EngineError> {
        let rr = self
            .run_raw(
                Engine::Docker,
                ["network", "inspect", name, "--format", NETWORK_INSPECT_FORMAT],
            )
            .await
            .map_err(|e| {
                if stderr::network_missing(&e) {
                    EngineError::from(ErrorKind::NetworkNotFound)
                } else {
                    EngineError::command("network inspect", e)
                }
            })?;
        parse_network_inspect(&rr.stdout_str())
    }

    /// Create a bridge network for a cluster and return its gateway
    ///
    /// An existing network of the same name is reused. Otherwise private
    /// /24s are tried in turn while the daemon reports the subnet or
    /// gateway as taken.
    pub async fn network_create(&self, engine: Engine, name: &str) -> Result<Ipv4Addr, EngineError> {
        if engine != Engine::Docker {
            return Err(EngineError::Unsupported(format!(
                "{engine} networks are not supported"
            )));
        }

        match self.network_inspect(name).await {
            Ok(existing) => {
                tracing::info!("Found existing network {} with subnet {}", name, existing.subnet);
                return existing.gateway.parse().map_err(|e| {
                    EngineError::parse("network gateway", format!("{:?}: {e}", existing.gateway))
                });
            }
            Err(e) if e.kind() == Some(ErrorKind::NetworkNotFound) => {}
            Err(e) => {
                tracing::debug!("Inspecting network {} before create failed: {}", name, e);
            }
        }

        let mut last_err = None;
        for subnet in candidate_subnets(FIRST_SUBNET, SUBNET_ATTEMPTS) {
            let gateway = gateway_of(&subnet);
            match self.try_create_network(engine, name, &subnet, gateway).await {
                Ok(()) => {
                    tracing::info!("Created network {} with subnet {}", name, subnet);
                    return Ok(gateway);
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        Some(ErrorKind::NetworkSubnetTaken | ErrorKind::NetworkGatewayTaken)
                    ) =>
                {
                    tracing::info!("Subnet {} is taken, trying the next one", subnet);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let err = last_err.unwrap_or_else(|| EngineError::from(ErrorKind::NetworkSubnetTaken));
        Err(err.wrap(format!("failed to create network {name}")))
    }

    async fn try_create_network(
        &self,
        engine: Engine,
        name: &str,
        subnet: &Subnet,
        gateway: Ipv4Addr,
    ) -> Result<(), EngineError> {
        let args = [
            "network".to_string(),
            "create".to_string(),
            "--driver=bridge".to_string(),
            format!("--subnet={subnet}"),
            format!("--gateway={gateway}"),
            "-o".to_string(),
            "com.docker.network.bridge.enable_ip_masquerade=true".to_string(),
            format!("--label={CREATED_BY_LABEL}=true"),
            format!("--label={PROFILE_LABEL}={name}"),
            name.to_string(),
        ];
        self.run_raw(engine, args).await.map(|_| ()).map_err(|e| {
            if stderr::subnet_taken(&e) {
                EngineError::from(ErrorKind::NetworkSubnetTaken)
            } else if stderr::gateway_taken(&e) {
                EngineError::from(ErrorKind::NetworkGatewayTaken)
            } else {
                EngineError::command("network create", e)
            }
        })
    }

    /// Remove a docker network
    ///
    /// A network that is already gone is not an error.
    pub async fn network_remove(&self, name: &str) -> Result<(), EngineError> {
        match self.network_inspect(name).await {
            Err(e) if e.kind() == Some(ErrorKind::NetworkNotFound) => {
                tracing::debug!("Network {} does not exist, nothing to remove", name);
                return Ok(());
            }
            _ => {}
        }

        self.run_raw(Engine::Docker, ["network", "rm", name])
            .await
            .map(|_| ())
            .map_err(|e| {
                if stderr::network_missing(&e) {
                    EngineError::from(ErrorKind::NetworkNotFound)
                } else if stderr::network_busy(&e) {
                    EngineError::from(ErrorKind::NetworkInUse)
                } else {
                    EngineError::command("network rm", e)
                }
            })
    }

    /// Names of networks carrying `label`
    pub async fn networks_by_label(&self, label: &str) -> Result<Vec<String>, EngineError> {
        let rr = self
            .run(
                Engine::Docker,
                [
                    "network",
                    "ls",
                    &format!("--filter=label={label}"),
                    "--format",
                    "{{.Name}}",
                ],
                "network ls",
            )
            .await?;
        Ok(non_empty_lines(&rr.stdout_str()))
    }
}

pub(crate) fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
