//! Node container lifecycle and inspection

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use super::network::non_empty_lines;
use super::{
    BACKOFF_INITIAL, CREATED_BY_LABEL, Engine, EngineClient, EngineError, ErrorKind, PROFILE_LABEL,
    retry_unless_fail_fast, stderr,
};
use crate::hostnet::{Mount, PortMapping};
use crate::runner::{RunError, RunResult};

/// Log lines quoted back to the user when a container dies on start
pub const POST_MORTEM_LOG_LINES: usize = 4;

/// Address podman reports as an empty string
const DEFAULT_BIND_IPV4: &str = "127.0.0.1";

const SSH_PORT: u16 = 22;

/// First delay while waiting for a container to stop
const SHUTDOWN_INITIAL: Duration = Duration::from_millis(500);

/// Pause after `init 0` so the engine notices the exit
const SHUTDOWN_SETTLE: Duration = Duration::from_secs(1);

/// Run flag for daemons with `userns-remap` enabled
const USERNS_HOST_ARG: &str = "--userns=host";

/// Container state as reported by `{{.State.Status}}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerState {
    Running,
    Stopped,
    Paused,
    Starting,
    Error,
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Running => "Running",
            ContainerState::Stopped => "Stopped",
            ContainerState::Paused => "Paused",
            ContainerState::Starting => "Starting",
            ContainerState::Error => "Error",
        };
        f.write_str(s)
    }
}

impl FromStr for ContainerState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "created" | "configured" | "exited" => Ok(ContainerState::Stopped),
            "running" => Ok(ContainerState::Running),
            "paused" => Ok(ContainerState::Paused),
            "restarting" => Ok(ContainerState::Starting),
            "dead" => Ok(ContainerState::Error),
            other => Err(EngineError::parse(
                "container status",
                format!("unknown state {other:?}"),
            )),
        }
    }
}

/// What to run for a new node container
#[derive(Debug, Clone, Default)]
pub struct CreateOpts {
    /// Container and host name
    pub name: String,
    /// Cluster the container belongs to; defaults to `name`
    pub profile: String,
    /// Extra `run` flags placed before the image
    pub run_args: Vec<String>,
    /// Arguments after the image
    pub container_args: Vec<String>,
    pub mounts: Vec<Mount>,
    pub port_mappings: Vec<PortMapping>,
}

/// Full `run` argv for a node container, without the program
pub fn run_argv(engine: Engine, image: &str, opts: &CreateOpts, linux: bool) -> Vec<String> {
    let profile = if opts.profile.is_empty() {
        &opts.name
    } else {
        &opts.profile
    };

    let mut args = vec!["run".to_string()];
    // Nested containers in rootful podman need the cgroupfs manager.
    if engine == Engine::Podman && linux {
        args.push("--cgroup-manager".to_string());
        args.push("cgroupfs".to_string());
    }
    args.extend([
        "-d".to_string(),
        "-t".to_string(),
        format!("--name={}", opts.name),
        format!("--hostname={}", opts.name),
        format!("--label={CREATED_BY_LABEL}=true"),
        format!("--label={PROFILE_LABEL}={profile}"),
    ]);
    args.extend(opts.run_args.iter().cloned());
    args.extend(opts.mounts.iter().map(Mount::volume_arg));
    args.extend(opts.port_mappings.iter().map(PortMapping::publish_arg));
    args.push(image.to_string());
    args.extend(opts.container_args.iter().cloned());
    args
}

/// `start` argv for an existing container, without the program
pub fn start_argv(engine: Engine, name: &str, linux: bool) -> Vec<String> {
    let mut args = vec!["start".to_string()];
    if engine == Engine::Podman && linux {
        args.push("--cgroup-manager".to_string());
        args.push("cgroupfs".to_string());
    }
    args.push(name.to_string());
    args
}

fn classify_create_error(err: RunError) -> EngineError {
    if stderr::cpu_limit(&err) {
        EngineError::from(ErrorKind::CpuCountLimit).fail_fast()
    } else if stderr::ip_in_use(&err) {
        EngineError::from(ErrorKind::IpInUse).fail_fast()
    } else if stderr::out_of_space(&err) {
        EngineError::from(ErrorKind::InsufficientStorage).fail_fast()
    } else {
        EngineError::command("container create", err)
    }
}

fn forwarded_port_format(engine: Engine, port: u16) -> String {
    match engine {
        Engine::Podman => format!(
            "{{{{range .NetworkSettings.Ports}}}}{{{{if eq .ContainerPort {port}}}}}{{{{.HostPort}}}}{{{{end}}}}{{{{end}}}}"
        ),
        Engine::Docker => format!(
            "'{{{{(index (index .NetworkSettings.Ports \"{port}/tcp\") 0).HostPort}}}}'"
        ),
    }
}

fn parse_host_port(output: &str) -> Result<u16, EngineError> {
    let raw = output.trim().trim_matches('\'');
    raw.parse()
        .map_err(|e| EngineError::parse("host port", format!("{raw:?}: {e}")))
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

impl EngineClient {
    /// Run a node container and wait for it to be running
    ///
    /// Returns the `run` arguments used. CPU over-subscription, address
    /// conflicts and a full disk fail fast. A container that never reaches
    /// running yields [`ErrorKind::ExitedUnexpectedly`] with the tail of its
    /// logs, or [`ErrorKind::DaemonInfo`] when the daemon itself is unwell.
    pub async fn container_create(
        &self,
        engine: Engine,
        image: &str,
        opts: &CreateOpts,
    ) -> Result<Vec<String>, EngineError> {
        if engine == Engine::Docker && cfg!(windows) {
            self.daemon_info(engine).await?;
        }

        let mut opts = opts.clone();
        if self.userns_remap_enabled(engine).await {
            opts.run_args.push(USERNS_HOST_ARG.to_string());
        }
        let opts = &opts;

        let argv = run_argv(engine, image, opts, cfg!(target_os = "linux"));
        self.run_raw(engine, argv.clone())
            .await
            .map_err(classify_create_error)?;

        let name = opts.name.as_str();
        let waited = retry_unless_fail_fast(BACKOFF_INITIAL, self.wait_budget, move || {
            self.require_running(engine, name)
        })
        .await;

        if let Err(e) = waited {
            tracing::warn!("Container {} did not start: {}", opts.name, e);
            let excerpt = self.post_mortem_debug(engine, &opts.name).await;
            self.daemon_info(engine).await?;
            return Err(EngineError::sentinel(ErrorKind::ExitedUnexpectedly, excerpt));
        }

        tracing::info!("Container {} is running", opts.name);
        Ok(argv)
    }

    /// Start an existing container
    pub async fn container_start(&self, engine: Engine, name: &str) -> Result<(), EngineError> {
        self.run(
            engine,
            start_argv(engine, name, cfg!(target_os = "linux")),
            &format!("starting container {name}"),
        )
        .await?;
        Ok(())
    }

    /// Power off a node container from inside and wait until it has stopped
    ///
    /// A failed `init 0` is only logged; the wait decides the outcome. Node
    /// containers must be shut down this way before removal so their
    /// processes and port bindings are released.
    pub async fn shut_down(&self, engine: Engine, name: &str) -> Result<(), EngineError> {
        if let Err(e) = self
            .run_raw(
                engine,
                ["exec", "--privileged", "-t", name, "/bin/bash", "-c", "sudo init 0"],
            )
            .await
        {
            tracing::info!("error shutting down {}: {}", name, e);
        }
        tokio::time::sleep(SHUTDOWN_SETTLE).await;

        retry_unless_fail_fast(SHUTDOWN_INITIAL, self.wait_budget, move || {
            self.require_stopped(engine, name)
        })
        .await
        .map_err(|e| e.wrap("verify shutdown"))?;
        tracing::info!("Successfully shut down container {}", name);
        Ok(())
    }

    async fn require_stopped(&self, engine: Engine, name: &str) -> Result<(), EngineError> {
        match self.container_status(engine, name).await {
            Ok(ContainerState::Stopped) => Ok(()),
            Ok(other) => Err(EngineError::NotStopped {
                name: name.to_string(),
                state: other.to_string(),
            }),
            Err(e) => {
                tracing::debug!("temporary error verifying shutdown of {}: {}", name, e);
                Err(e)
            }
        }
    }

    /// Whether a container named exactly `name` exists, running or not
    pub async fn container_exists(&self, engine: Engine, name: &str) -> Result<bool, EngineError> {
        let rr = self
            .run(
                engine,
                ["ps", "-a", "--format", "{{.Names}}"],
                "listing containers",
            )
            .await?;
        Ok(rr.stdout_str().lines().any(|line| line.trim() == name))
    }

    /// Whether `name` carries kicup's creator label
    ///
    /// Anything that cannot be inspected counts as not ours.
    pub async fn is_created_by_kicup(&self, engine: Engine, name: &str) -> bool {
        match self
            .run_raw(engine, ["container", "inspect", name, "--format", "{{.Config.Labels}}"])
            .await
        {
            Ok(rr) => rr.stdout_str().contains(&format!("{CREATED_BY_LABEL}:true")),
            Err(e) => {
                tracing::debug!("label check of {} failed: {}", name, e);
                false
            }
        }
    }

    /// Whether the daemon runs with `userns-remap`
    ///
    /// Errors count as disabled.
    pub async fn userns_remap_enabled(&self, engine: Engine) -> bool {
        match self
            .run_raw(engine, ["info", "--format", "{{json .SecurityOptions}}"])
            .await
        {
            Ok(rr) => rr
                .stdout_str()
                .lines()
                .next()
                .is_some_and(|line| line.contains("name=userns")),
            Err(e) => {
                tracing::debug!("{} security options unavailable: {}", engine, e);
                false
            }
        }
    }

    async fn require_running(&self, engine: Engine, name: &str) -> Result<(), EngineError> {
        match self.container_status(engine, name).await? {
            ContainerState::Running => Ok(()),
            other => Err(EngineError::sentinel(
                ErrorKind::ExitedUnexpectedly,
                format!("container {name} status is {other}"),
            )),
        }
    }

    pub async fn container_inspect(&self, engine: Engine, name: &str) -> Result<RunResult, EngineError> {
        self.run(
            engine,
            ["container", "inspect", name],
            &format!("inspecting container {name}"),
        )
        .await
    }

    /// Container logs with timestamps
    pub async fn container_logs(&self, engine: Engine, name: &str) -> Result<RunResult, EngineError> {
        let args: Vec<&str> = match engine {
            Engine::Docker => vec!["logs", "--timestamps", "--details", name],
            Engine::Podman => vec!["logs", "--timestamps", name],
        };
        self.run(engine, args, &format!("container logs for {name}"))
            .await
    }

    pub async fn container_status(
        &self,
        engine: Engine,
        name: &str,
    ) -> Result<ContainerState, EngineError> {
        let rr = self
            .run(
                engine,
                ["container", "inspect", name, "--format={{.State.Status}}"],
                &format!("container status for {name}"),
            )
            .await?;
        rr.stdout_str().parse()
    }

    pub async fn container_running(&self, engine: Engine, name: &str) -> Result<bool, EngineError> {
        let rr = self
            .run(
                engine,
                ["container", "inspect", name, "--format={{.State.Running}}"],
                &format!("checking if container {name} is running"),
            )
            .await?;
        Ok(rr.stdout_str().trim() == "true")
    }

    /// Host port that `internal_port` of the container is published on
    pub async fn forwarded_port(
        &self,
        engine: Engine,
        name: &str,
        internal_port: u16,
    ) -> Result<u16, EngineError> {
        let format = forwarded_port_format(engine, internal_port);
        let rr = match self
            .run_raw(engine, ["container", "inspect", "-f", &format, name])
            .await
        {
            Ok(rr) => rr,
            Err(e) => {
                if !self.container_running(engine, name).await.unwrap_or(false) {
                    return Err(EngineError::sentinel(
                        ErrorKind::GetPortContainerNotRunning,
                        format!("port {internal_port} of {name}"),
                    ));
                }
                return Err(EngineError::command(
                    format!("get port {internal_port} for {name:?}"),
                    e,
                ));
            }
        };
        parse_host_port(&rr.stdout_str())
    }

    /// Host port for the container's sshd
    pub async fn ssh_port(&self, engine: Engine, name: &str) -> Result<u16, EngineError> {
        self.forwarded_port(engine, name, SSH_PORT)
            .await
            .map_err(|e| match e.kind() {
                Some(ErrorKind::GetPortContainerNotRunning) => {
                    EngineError::from(ErrorKind::GetSshPortContainerNotRunning)
                }
                _ => e,
            })
    }

    /// IPv4 and IPv6 addresses of a container; IPv6 may be empty
    pub async fn container_ips(
        &self,
        engine: Engine,
        name: &str,
    ) -> Result<(String, String), EngineError> {
        match engine {
            Engine::Podman => {
                let rr = self
                    .run(
                        engine,
                        ["container", "inspect", "-f", "{{.NetworkSettings.IPAddress}}", name],
                        &format!("podman inspect ip {name}"),
                    )
                    .await?;
                let ip = rr.stdout_str().trim().to_string();
                if ip.is_empty() {
                    Ok((DEFAULT_BIND_IPV4.to_string(), String::new()))
                } else {
                    Ok((ip, String::new()))
                }
            }
            Engine::Docker => {
                let rr = self
                    .run(
                        engine,
                        [
                            "container",
                            "inspect",
                            "-f",
                            "{{range .NetworkSettings.Networks}}{{.IPAddress}},{{.GlobalIPv6Address}}{{end}}",
                            name,
                        ],
                        "inspecting NetworkSettings.Networks",
                    )
                    .await?;
                parse_docker_ips(&rr.stdout_str())
            }
        }
    }

    /// Full container ID, or an empty string when no such container exists
    pub async fn container_id(&self, engine: Engine, name: &str) -> Result<String, EngineError> {
        match self
            .run_raw(engine, ["container", "inspect", "-f", "{{.Id}}", name])
            .await
        {
            Ok(rr) => Ok(rr.stdout_str().trim().to_string()),
            Err(e) if stderr::container_missing(&e) => Ok(String::new()),
            Err(e) => Err(EngineError::command(format!("container id of {name}"), e)),
        }
    }

    pub async fn list_containers_by_label(
        &self,
        engine: Engine,
        label: &str,
    ) -> Result<Vec<String>, EngineError> {
        let rr = self
            .run(
                engine,
                [
                    "ps",
                    "-a",
                    "--filter",
                    &format!("label={label}"),
                    "--format",
                    "{{.Names}}",
                ],
                "listing containers",
            )
            .await?;
        Ok(non_empty_lines(&rr.stdout_str()))
    }

    /// Force-remove every container carrying `label`
    ///
    /// Returns the names removed. Per-container failures are logged and
    /// skipped.
    pub async fn delete_containers_by_label(
        &self,
        engine: Engine,
        label: &str,
    ) -> Result<Vec<String>, EngineError> {
        let mut deleted = Vec::new();
        for name in self.list_containers_by_label(engine, label).await? {
            match self.run(engine, ["rm", "-f", "-v", &name], "removing container").await {
                Ok(_) => deleted.push(name),
                Err(e) => tracing::warn!("Failed to remove container {}: {}", name, e),
            }
        }
        Ok(deleted)
    }

    /// Gather diagnostics for a container that failed to start
    ///
    /// Everything is logged at debug level. Returns the last
    /// [`POST_MORTEM_LOG_LINES`] log lines for the user-facing error.
    pub async fn post_mortem_debug(&self, engine: Engine, name: &str) -> String {
        match self.container_inspect(engine, name).await {
            Ok(rr) => tracing::debug!("container inspect {}:\n{}", name, rr.output()),
            Err(e) => tracing::debug!("container inspect {} failed: {}", name, e),
        }

        let excerpt = match self.container_logs(engine, name).await {
            Ok(rr) => {
                tracing::debug!("container logs {}:\n{}", name, rr.output());
                last_lines(
                    &format!("{}\n{}", rr.stdout_str(), rr.stderr_str()),
                    POST_MORTEM_LOG_LINES,
                )
            }
            Err(e) => {
                tracing::debug!("container logs {} failed: {}", name, e);
                String::new()
            }
        };

        match self.daemon_info(engine).await {
            Ok(info) => tracing::debug!("{} system info: {:?}", engine, info),
            Err(e) => tracing::debug!("{} system info failed: {}", engine, e),
        }

        if engine == Engine::Docker {
            match self.network_inspect(name).await {
                Ok(net) => tracing::debug!("network {}: {:?}", name, net),
                Err(e) => tracing::debug!("network inspect {} failed: {}", name, e),
            }
        }

        excerpt
    }
}

fn parse_docker_ips(output: &str) -> Result<(String, String), EngineError> {
    let lines = non_empty_lines(output);
    if lines.len() != 1 {
        return Err(EngineError::parse(
            "container addresses",
            format!("IPs output should only be one line, got {} lines", lines.len()),
        ));
    }
    let ips: Vec<&str> = lines[0].split(',').collect();
    match ips.as_slice() {
        [v4, v6] => Ok((v4.to_string(), v6.to_string())),
        other => Err(EngineError::parse(
            "container addresses",
            format!("should have 2 values, got {}: {other:?}", other.len()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::engine::testing::StubEngine;
    use crate::hostnet::parse_mount_spec;

    #[test]
    fn states_map_from_engine_strings() {
        assert_eq!("running\n".parse::<ContainerState>().unwrap(), ContainerState::Running);
        assert_eq!("exited".parse::<ContainerState>().unwrap(), ContainerState::Stopped);
        assert_eq!("paused".parse::<ContainerState>().unwrap(), ContainerState::Paused);
        assert_eq!("restarting".parse::<ContainerState>().unwrap(), ContainerState::Starting);
        assert_eq!("dead".parse::<ContainerState>().unwrap(), ContainerState::Error);
        assert!("removing".parse::<ContainerState>().is_err());
    }

    #[test]
    fn run_argv_renders_mounts_and_ports() {
        let opts = CreateOpts {
            name: "kicup".into(),
            run_args: vec!["--privileged".into()],
            container_args: vec!["--debug".into()],
            mounts: vec![parse_mount_spec("/lib/modules:/lib/modules:ro").unwrap()],
            port_mappings: vec![PortMapping::ephemeral("127.0.0.1", 22)],
            ..Default::default()
        };
        let argv = run_argv(Engine::Podman, "kicbase:v1", &opts, true);
        assert_eq!(
            argv,
            vec![
                "run",
                "--cgroup-manager",
                "cgroupfs",
                "-d",
                "-t",
                "--name=kicup",
                "--hostname=kicup",
                "--label=created_by.kicup.io=true",
                "--label=name.kicup.io=kicup",
                "--privileged",
                "--volume=/lib/modules:/lib/modules:ro",
                "--publish=127.0.0.1::22",
                "kicbase:v1",
                "--debug",
            ]
        );

        let docker = run_argv(Engine::Docker, "kicbase:v1", &opts, true);
        assert!(!docker.contains(&"--cgroup-manager".to_string()));
    }

    #[test]
    fn host_port_output_is_trimmed() {
        assert_eq!(parse_host_port("'32771'\n").unwrap(), 32771);
        assert!(parse_host_port("''").is_err());
    }

    #[test]
    fn docker_ips_need_one_line_of_two() {
        assert_eq!(
            parse_docker_ips("192.168.49.2,\n").unwrap(),
            ("192.168.49.2".to_string(), String::new())
        );
        assert!(parse_docker_ips("a,b\nc,d\n").is_err());
        assert!(parse_docker_ips("192.168.49.2").is_err());
    }

    #[test]
    fn forwarded_port_templates() {
        assert_eq!(
            forwarded_port_format(Engine::Docker, 22),
            "'{{(index (index .NetworkSettings.Ports \"22/tcp\") 0).HostPort}}'"
        );
        assert_eq!(
            forwarded_port_format(Engine::Podman, 8443),
            "{{range .NetworkSettings.Ports}}{{if eq .ContainerPort 8443}}{{.HostPort}}{{end}}{{end}}"
        );
    }

    #[tokio::test]
    async fn create_waits_for_running() {
        let stub = StubEngine::new(
            Engine::Docker,
            r#"case "$1" in
  run) echo 0123abcd ;;
  container) echo running ;;
esac"#,
        );
        let opts = CreateOpts {
            name: "kicup".into(),
            ..Default::default()
        };
        let argv = stub
            .client
            .container_create(Engine::Docker, "kicbase:v1", &opts)
            .await
            .unwrap();
        assert_eq!(argv.first().map(String::as_str), Some("run"));
        assert!(stub.calls().iter().any(|c| c.contains("--format={{.State.Status}}")));
    }

    #[tokio::test]
    async fn cpu_limit_fails_fast() {
        let stub = StubEngine::new(
            Engine::Docker,
            "echo 'docker: Error response from daemon: Range of CPUs is from 0.01 to 8.00, as there are only 8 CPUs available.' >&2; exit 125",
        );
        let opts = CreateOpts {
            name: "kicup".into(),
            ..Default::default()
        };
        let err = stub
            .client
            .container_create(Engine::Docker, "kicbase:v1", &opts)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::CpuCountLimit));
        assert!(err.is_fail_fast());
        assert_eq!(stub.calls().iter().filter(|c| c.starts_with("run ")).count(), 1);
    }

    #[tokio::test]
    async fn exited_container_reports_log_tail() {
        let stub = StubEngine::new(
            Engine::Docker,
            r#"case "$1" in
  run) echo 0123abcd ;;
  logs) printf 'one\ntwo\nthree\nfour\nfive\n' ;;
  system) echo '{"NCPU":2,"MemTotal":1,"OSType":"linux"}' ;;
  network) echo 'Error: No such network: kicup' >&2; exit 1 ;;
  container)
    case "$*" in
      *State.Status*) echo exited ;;
      *) echo '[]' ;;
    esac ;;
esac"#,
        )
        .with_wait_budget(Duration::from_millis(100));
        let opts = CreateOpts {
            name: "kicup".into(),
            ..Default::default()
        };
        let err = stub
            .client
            .container_create(Engine::Docker, "kicbase:v1", &opts)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ExitedUnexpectedly));
        assert!(err.to_string().ends_with("two\nthree\nfour\nfive"));
    }

    #[tokio::test]
    async fn missing_container_id_is_empty() {
        let stub = StubEngine::new(
            Engine::Podman,
            "echo 'Error: no such container kicup' >&2; exit 125",
        );
        assert_eq!(
            stub.client.container_id(Engine::Podman, "kicup").await.unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn ssh_port_of_stopped_container() {
        let stub = StubEngine::new(
            Engine::Docker,
            r#"case "$*" in
  *State.Running*) echo false ;;
  *) echo 'template parsing error: index of untyped nil' >&2; exit 1 ;;
esac"#,
        );
        let err = stub.client.ssh_port(Engine::Docker, "kicup").await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::GetSshPortContainerNotRunning));
    }

    #[tokio::test]
    async fn podman_logs_skip_details() {
        let stub = StubEngine::new(Engine::Podman, "echo line");
        stub.client
            .container_logs(Engine::Podman, "kicup")
            .await
            .unwrap();
        assert_eq!(stub.calls(), vec!["logs --timestamps kicup"]);
    }

    #[tokio::test]
    async fn delete_by_label_removes_each() {
        let stub = StubEngine::new(
            Engine::Docker,
            r#"case "$1" in
  ps) printf 'kicup\nkicup-m02\n' ;;
  rm) echo "$4" ;;
esac"#,
        );
        let deleted = stub
            .client
            .delete_containers_by_label(Engine::Docker, "name.kicup.io=kicup")
            .await
            .unwrap();
        assert_eq!(deleted, vec!["kicup", "kicup-m02"]);
        assert!(stub.calls().contains(&"rm -f -v kicup-m02".to_string()));
    }

    #[test]
    fn start_argv_adds_cgroup_manager_for_podman_on_linux() {
        assert_eq!(
            start_argv(Engine::Podman, "kicup", true),
            vec!["start", "--cgroup-manager", "cgroupfs", "kicup"]
        );
        assert_eq!(start_argv(Engine::Podman, "kicup", false), vec!["start", "kicup"]);
        assert_eq!(start_argv(Engine::Docker, "kicup", true), vec!["start", "kicup"]);
    }

    #[tokio::test]
    async fn userns_remap_adds_host_namespace() {
        let stub = StubEngine::new(
            Engine::Docker,
            r#"case "$1" in
  info) echo '["name=seccomp,profile=builtin","name=userns"]' ;;
  run) echo 0123abcd ;;
  container) echo running ;;
esac"#,
        );
        let opts = CreateOpts {
            name: "kicup".into(),
            ..Default::default()
        };
        let argv = stub
            .client
            .container_create(Engine::Docker, "kicbase:v1", &opts)
            .await
            .unwrap();
        assert!(argv.contains(&"--userns=host".to_string()));
        assert_eq!(stub.calls()[0], "info --format {{json .SecurityOptions}}");
    }

    #[tokio::test]
    async fn userns_check_failure_counts_as_disabled() {
        let stub = StubEngine::new(Engine::Docker, "exit 1");
        assert!(!stub.client.userns_remap_enabled(Engine::Docker).await);
    }

    #[tokio::test]
    async fn exists_matches_whole_names() {
        let stub = StubEngine::new(Engine::Docker, "printf 'kicup-m02\\nother\\n'");
        assert!(!stub.client.container_exists(Engine::Docker, "kicup").await.unwrap());
        assert!(stub.client.container_exists(Engine::Docker, "kicup-m02").await.unwrap());
        assert_eq!(stub.calls()[0], "ps -a --format {{.Names}}");
    }

    #[tokio::test]
    async fn creator_label_is_checked() {
        let ours = StubEngine::new(
            Engine::Docker,
            "echo 'map[created_by.kicup.io:true name.kicup.io:kicup]'",
        );
        assert!(ours.client.is_created_by_kicup(Engine::Docker, "kicup").await);

        let foreign = StubEngine::new(Engine::Docker, "echo 'map[maintainer:someone]'");
        assert!(!foreign.client.is_created_by_kicup(Engine::Docker, "kicup").await);

        let missing = StubEngine::new(
            Engine::Docker,
            "echo 'Error: No such object: kicup' >&2; exit 1",
        );
        assert!(!missing.client.is_created_by_kicup(Engine::Docker, "kicup").await);
    }

    #[tokio::test]
    async fn start_runs_start() {
        let stub = StubEngine::new(Engine::Docker, "echo kicup");
        stub.client.container_start(Engine::Docker, "kicup").await.unwrap();
        assert_eq!(stub.calls(), vec!["start kicup"]);
    }

    #[tokio::test]
    async fn shut_down_waits_for_exit() {
        // Reports running once, then exited.
        let stub = StubEngine::new(
            Engine::Docker,
            r#"case "$1" in
  exec) echo 'Error: container is not running' >&2; exit 1 ;;
  container)
    if [ "$(grep -c State.Status "$(dirname "$0")/calls.log")" -le 1 ]; then echo running; else echo exited; fi ;;
esac"#,
        );
        stub.client.shut_down(Engine::Docker, "kicup").await.unwrap();
        let calls = stub.calls();
        assert_eq!(calls[0], "exec --privileged -t kicup /bin/bash -c sudo init 0");
        assert_eq!(
            calls.iter().filter(|c| c.contains("State.Status")).count(),
            2
        );
    }

    #[tokio::test]
    async fn shut_down_gives_up_on_running_container() {
        let stub = StubEngine::new(Engine::Docker, "echo running")
            .with_wait_budget(Duration::from_millis(600));
        let err = stub.client.shut_down(Engine::Docker, "kicup").await.unwrap_err();
        assert!(err.to_string().starts_with("verify shutdown: "));
    }
}
