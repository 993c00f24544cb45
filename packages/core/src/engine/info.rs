//! Daemon system info, cached per process

use serde::{Deserialize, Serialize};

use super::{Engine, EngineClient, EngineError, ErrorKind};

/// What the daemon reports about its host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SysInfo {
    pub cpus: i64,
    /// Bytes
    pub total_memory: i64,
    pub os_type: String,
    pub swarm_active: bool,
    pub storage_driver: String,
}

#[derive(Debug, Deserialize)]
struct DockerInfo {
    #[serde(rename = "NCPU", default)]
    ncpu: i64,
    #[serde(rename = "MemTotal", default)]
    mem_total: i64,
    #[serde(rename = "OSType", default)]
    os_type: String,
    #[serde(rename = "Swarm", default)]
    swarm: DockerSwarm,
    #[serde(rename = "Driver", default)]
    driver: String,
}

#[derive(Debug, Default, Deserialize)]
struct DockerSwarm {
    #[serde(rename = "LocalNodeState", default)]
    local_node_state: String,
}

#[derive(Debug, Deserialize)]
struct PodmanInfo {
    #[serde(default)]
    host: PodmanHost,
    #[serde(default)]
    store: PodmanStore,
}

#[derive(Debug, Default, Deserialize)]
struct PodmanHost {
    #[serde(default)]
    cpus: i64,
    #[serde(rename = "memTotal", alias = "MemTotal", default)]
    mem_total: i64,
    #[serde(default)]
    os: String,
}

#[derive(Debug, Default, Deserialize)]
struct PodmanStore {
    #[serde(rename = "graphDriverName", alias = "GraphDriverName", default)]
    graph_driver_name: String,
}

/// Parse `docker system info --format json`
pub(crate) fn parse_docker_info(raw: &[u8]) -> Result<SysInfo, EngineError> {
    let info: DockerInfo = serde_json::from_slice(raw)
        .map_err(|e| EngineError::parse("docker system info", e.to_string()))?;
    Ok(SysInfo {
        cpus: info.ncpu,
        total_memory: info.mem_total,
        os_type: info.os_type,
        swarm_active: info.swarm.local_node_state == "active",
        storage_driver: info.driver,
    })
}

/// Parse `podman system info --format json`
pub(crate) fn parse_podman_info(raw: &[u8]) -> Result<SysInfo, EngineError> {
    let info: PodmanInfo = serde_json::from_slice(raw)
        .map_err(|e| EngineError::parse("podman system info", e.to_string()))?;
    Ok(SysInfo {
        cpus: info.host.cpus,
        total_memory: info.host.mem_total,
        os_type: info.host.os,
        swarm_active: false,
        storage_driver: info.store.graph_driver_name,
    })
}

impl EngineClient {
    /// Daemon info, fetched once per process
    ///
    /// A failed fetch is cached too and reported as [`ErrorKind::DaemonInfo`]
    /// on every later call. A daemon running Windows containers is rejected
    /// with a fail-fast [`ErrorKind::WindowsContainers`].
    pub async fn daemon_info(&self, engine: Engine) -> Result<SysInfo, EngineError> {
        let cell = match engine {
            Engine::Docker => &self.docker_info,
            Engine::Podman => &self.podman_info,
        };
        let cached = cell
            .get_or_init(|| async {
                self.fetch_info(engine).await.map_err(|e| {
                    tracing::debug!("{} system info failed: {}", engine, e);
                    e.to_string()
                })
            })
            .await;

        let info = cached
            .clone()
            .map_err(|msg| EngineError::sentinel(ErrorKind::DaemonInfo, msg))?;
        if info.os_type.eq_ignore_ascii_case("windows") {
            return Err(EngineError::from(ErrorKind::WindowsContainers).fail_fast());
        }
        Ok(info)
    }

    async fn fetch_info(&self, engine: Engine) -> Result<SysInfo, EngineError> {
        let rr = self
            .run(
                engine,
                ["system", "info", "--format", "json"],
                &format!("{engine} system info"),
            )
            .await?;
        match engine {
            Engine::Docker => parse_docker_info(&rr.stdout),
            Engine::Podman => parse_podman_info(&rr.stdout),
        }
    }
}
