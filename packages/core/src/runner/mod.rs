//! Command runner
//!
//! Every external program kicup invokes (docker, podman, ssh, curl, sudo,
//! nslookup) goes through [`CommandRunner::run`]. The runner applies a
//! kill deadline, captures both output streams while mirroring them to
//! optional sinks, warns once per command when an invocation is slow, and
//! renders failures with the full command line and captured output.

mod notify;
mod result;

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::context::ContextResolver;
use crate::engine::Engine;
use crate::env::{EnvChange, HostEnv, ROOTLESS_ENV, SUPPRESS_PERFORMANCE_ENV};
use crate::hostnet::is_external_daemon_host;

pub use notify::{ConsoleNotifier, Notifier};
pub use result::{DEADLINE_EXIT_CODE, RunError, RunResult};

/// Shared byte buffer that receives a copy of a command's output
pub type Sink = Arc<Mutex<Vec<u8>>>;

/// How long to keep reading pipes after the process is gone
///
/// Grandchildren can hold a pipe open after the direct child was killed.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// A command to run, program first
#[derive(Debug, Clone, Default)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<EnvChange>,
    dir: Option<PathBuf>,
    stdout_sink: Option<Sink>,
    stderr_sink: Option<Sink>,
    timeout: Option<Duration>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Start a command for the given engine's CLI
    pub fn engine(engine: Engine) -> Self {
        Self::new(engine.binary())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push(EnvChange::Set(key.into(), value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.envs.push(EnvChange::Remove(key.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Mirror stdout into `sink` in addition to capturing it
    pub fn stdout_sink(mut self, sink: Sink) -> Self {
        self.stdout_sink = Some(sink);
        self
    }

    /// Mirror stderr into `sink` in addition to capturing it
    pub fn stderr_sink(mut self, sink: Sink) -> Self {
        self.stderr_sink = Some(sink);
        self
    }

    /// Override the runner's default deadline for this command
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_envs(&self) -> &[EnvChange] {
        &self.envs
    }

    /// Program followed by its arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// The engine this command drives, looking through a `sudo` prefix
    pub fn target_engine(&self) -> Option<Engine> {
        if self.program == "sudo" {
            return self
                .args
                .iter()
                .find(|a| !a.starts_with('-'))
                .and_then(|p| Engine::from_program(p));
        }
        Engine::from_program(&self.program)
    }
}

/// Deadlines and policy flags for the runner
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    pub default_timeout: Duration,
    pub slow_timeout: Duration,
    pub default_warn: Duration,
    pub slow_warn: Duration,
    pub suppress_slow_warnings: bool,
    pub rootless: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(19),
            slow_timeout: Duration::from_secs(30),
            default_warn: Duration::from_secs(2),
            slow_warn: Duration::from_secs(3),
            suppress_slow_warnings: false,
            rootless: false,
        }
    }
}

impl RunnerSettings {
    /// Build settings from the config file, with environment overrides
    pub fn from_config(config: &Config, env: &HostEnv) -> Self {
        Self {
            default_timeout: Duration::from_secs(config.runner.default_timeout_secs),
            slow_timeout: Duration::from_secs(config.runner.slow_timeout_secs),
            default_warn: Duration::from_millis(config.runner.default_warn_ms),
            slow_warn: Duration::from_millis(config.runner.slow_warn_ms),
            suppress_slow_warnings: config.suppress_slow_command_warnings
                || env.flag(SUPPRESS_PERFORMANCE_ENV),
            rootless: config.rootless || env.flag(ROOTLESS_ENV),
        }
    }

    /// Kill deadline and warning threshold for an argv
    ///
    /// `volume` and `ps` subcommands are known to be slow on busy daemons
    /// and get the longer pair.
    pub fn limits_for(&self, argv: &[String]) -> (Duration, Duration) {
        if is_slow_subcommand(argv) {
            (self.slow_timeout, self.slow_warn)
        } else {
            (self.default_timeout, self.default_warn)
        }
    }
}

fn is_slow_subcommand(argv: &[String]) -> bool {
    matches!(argv.get(1).map(String::as_str), Some("volume" | "ps"))
}

/// Prefix a Podman command with `sudo -n` when running rootful on Linux
///
/// Environment, working directory and sinks carry over unchanged.
pub fn prefix_cmd_for(cmd: Cmd, linux: bool, rootless: bool) -> Cmd {
    if cmd.program != Engine::Podman.binary() || !linux || rootless {
        return cmd;
    }
    let Cmd {
        program,
        args,
        envs,
        dir,
        stdout_sink,
        stderr_sink,
        timeout,
    } = cmd;
    let mut prefixed = vec!["-n".to_string(), program];
    prefixed.extend(args);
    Cmd {
        program: "sudo".to_string(),
        args: prefixed,
        envs,
        dir,
        stdout_sink,
        stderr_sink,
        timeout,
    }
}

/// Runs external commands with deadlines and slow-command warnings
pub struct CommandRunner {
    settings: RunnerSettings,
    env: HostEnv,
    notifier: Arc<dyn Notifier>,
    context: Option<Arc<ContextResolver>>,
    already_warned: Mutex<HashSet<String>>,
}

impl CommandRunner {
    pub fn new(settings: RunnerSettings, env: HostEnv) -> Self {
        Self {
            settings,
            env,
            notifier: Arc::new(ConsoleNotifier),
            context: None,
            already_warned: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the console notifier
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Inject the current daemon context's environment into docker commands
    pub fn with_context_resolver(mut self, resolver: Arc<ContextResolver>) -> Self {
        self.context = Some(resolver);
        self
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn env(&self) -> &HostEnv {
        &self.env
    }

    /// Apply the sudo policy for this host
    pub fn prefix_cmd(&self, cmd: Cmd) -> Cmd {
        prefix_cmd_for(cmd, cfg!(target_os = "linux"), self.settings.rootless)
    }

    /// Run a command to completion
    ///
    /// With `warn_slow`, an invocation that outlasts its warning threshold
    /// produces a user-visible warning, at most once per distinct command
    /// string. A deadline breach kills the process and returns
    /// [`RunError::DeadlineExceeded`] carrying whatever output was captured.
    pub async fn run(&self, cmd: Cmd, warn_slow: bool) -> Result<RunResult, RunError> {
        let cmd = self.with_engine_env(cmd);
        let argv = cmd.argv();
        let (default_deadline, warn_after) = self.settings.limits_for(&argv);
        let deadline = cmd.timeout.unwrap_or(default_deadline);
        let rendered = RunResult {
            args: argv.clone(),
            ..Default::default()
        }
        .command();

        let mut process = tokio::process::Command::new(&cmd.program);
        process
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.dir {
            process.current_dir(dir);
        }
        for change in &cmd.envs {
            match change {
                EnvChange::Set(key, value) => {
                    process.env(key, value);
                }
                EnvChange::Remove(key) => {
                    process.env_remove(key);
                }
            }
        }

        tracing::debug!("Run: {}", rendered);
        let started = Instant::now();
        let mut child = process.spawn().map_err(|source| RunError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let stdout_buf: Sink = Arc::default();
        let stderr_buf: Sink = Arc::default();
        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(tokio::spawn(pump(
                out,
                stdout_buf.clone(),
                cmd.stdout_sink.clone(),
            )));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(tokio::spawn(pump(
                err,
                stderr_buf.clone(),
                cmd.stderr_sink.clone(),
            )));
        }

        let status = match tokio::time::timeout(deadline, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(source)) => {
                return Err(RunError::Wait {
                    command: rendered,
                    source,
                });
            }
            Err(_) => {
                if let Err(e) = child.start_kill() {
                    tracing::debug!("kill after deadline failed: {}", e);
                }
                if let Err(e) = child.wait().await {
                    tracing::debug!("reaping {} after deadline failed: {}", rendered, e);
                }
                None
            }
        };
        let elapsed = started.elapsed();
        drain(pumps).await;

        let result = RunResult {
            args: argv,
            stdout: take(&stdout_buf),
            stderr: take(&stderr_buf),
            exit_code: status
                .and_then(|s| s.code())
                .unwrap_or(DEADLINE_EXIT_CODE),
        };

        if warn_slow && elapsed > warn_after {
            self.warn_slow(&cmd, &result, elapsed);
        }

        let Some(status) = status else {
            tracing::warn!("{} exceeded its {:?} deadline", rendered, deadline);
            return Err(RunError::DeadlineExceeded {
                deadline,
                result: Box::new(result),
            });
        };

        if !status.success() {
            // Probing for a missing network is routine.
            if rendered.contains("network inspect") && result.exit_code == 1 {
                tracing::debug!("{} returned with exit code 1", rendered);
            } else {
                tracing::warn!("{} returned with exit code {}", rendered, result.exit_code);
            }
            return Err(RunError::Failed {
                status: status.to_string(),
                result: Box::new(result),
            });
        }

        tracing::debug!("Completed: {} ({:?})", rendered, elapsed);
        Ok(result)
    }

    fn with_engine_env(&self, mut cmd: Cmd) -> Cmd {
        let Some(engine) = cmd.target_engine() else {
            return cmd;
        };
        match engine {
            Engine::Docker => cmd.envs.extend(self.env.host_daemon_restore()),
            Engine::Podman => cmd.envs.extend(self.env.host_podman_restore()),
        }

        if engine == Engine::Docker {
            if let Some(resolver) = &self.context {
                match resolver.context_environment() {
                    Ok(vars) => {
                        for (key, value) in vars {
                            cmd = cmd.env(key, value);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to apply docker context environment: {}", e);
                    }
                }
            }
        }
        cmd
    }

    fn warn_slow(&self, cmd: &Cmd, result: &RunResult, elapsed: Duration) {
        if self.settings.suppress_slow_warnings {
            return;
        }
        // Remote daemons are expected to be slower.
        if let Some(engine) = cmd.target_engine() {
            if is_external_daemon_host(&self.env, engine) {
                return;
            }
        }

        let command = result.command();
        let first_time = self
            .already_warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.clone());
        if !first_time {
            return;
        }

        self.notifier.warning(&format!(
            "Executing \"{command}\" took an unusually long time: {elapsed:.1?}"
        ));
        if cmd.program != "sudo" {
            self.notifier.tip(&format!(
                "Restarting the {} service may improve performance.",
                cmd.program
            ));
        }
    }
}

async fn pump<R>(mut reader: R, capture: Sink, mirror: Option<Sink>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                capture
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(&chunk[..n]);
                if let Some(mirror) = &mirror {
                    mirror
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]);
                }
            }
        }
    }
}

async fn drain(pumps: Vec<JoinHandle<()>>) {
    for mut handle in pumps {
        if tokio::time::timeout(PIPE_DRAIN_GRACE, &mut handle)
            .await
            .is_err()
        {
            handle.abort();
        }
    }
}

fn take(buf: &Sink) -> Vec<u8> {
    std::mem::take(&mut *buf.lock().unwrap_or_else(PoisonError::into_inner))
}
