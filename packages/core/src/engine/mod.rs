//! Engine facade
//!
//! Typed operations over the `docker` and `podman` CLIs. Every call goes
//! through the [`CommandRunner`], so deadlines, slow-command warnings, the
//! rootful Podman `sudo` policy and docker context environment all apply.

mod container;
mod error;
mod image;
mod info;
mod network;
mod retry;
pub mod stderr;
mod volume;

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::OnceCell;

use crate::runner::{Cmd, CommandRunner, RunError, RunResult};

pub use container::{ContainerState, CreateOpts, POST_MORTEM_LOG_LINES};
pub use error::{EngineError, ErrorKind};
pub use info::SysInfo;
pub use network::NetworkInfo;
pub use retry::{BACKOFF_BUDGET, BACKOFF_INITIAL, backoff, retry_unless_fail_fast};

/// Label marking resources created by kicup
pub const CREATED_BY_LABEL: &str = "created_by.kicup.io";

/// Label holding the cluster name a resource belongs to
pub const PROFILE_LABEL: &str = "name.kicup.io";

/// Supported container engines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Docker,
    Podman,
}

impl Engine {
    /// CLI binary name
    pub fn binary(self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Podman => "podman",
        }
    }

    /// The engine a program path refers to, by file name
    pub fn from_program(program: &str) -> Option<Engine> {
        let stem = Path::new(program).file_stem()?.to_str()?;
        match stem {
            "docker" => Some(Engine::Docker),
            "podman" => Some(Engine::Podman),
            _ => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Engine::Docker),
            "podman" => Ok(Engine::Podman),
            other => Err(format!("unknown container engine: {other}")),
        }
    }
}

/// Engine operations bound to a command runner
pub struct EngineClient {
    runner: Arc<CommandRunner>,
    programs: HashMap<Engine, String>,
    wait_budget: Duration,
    docker_info: OnceCell<Result<SysInfo, String>>,
    podman_info: OnceCell<Result<SysInfo, String>>,
}

impl EngineClient {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self {
            runner,
            programs: HashMap::new(),
            wait_budget: BACKOFF_BUDGET,
            docker_info: OnceCell::new(),
            podman_info: OnceCell::new(),
        }
    }

    /// Use a specific executable for an engine instead of the one on `PATH`
    ///
    /// The file name must still be `docker` or `podman`.
    pub fn with_program(mut self, engine: Engine, program: impl Into<String>) -> Self {
        self.programs.insert(engine, program.into());
        self
    }

    /// Cap the time spent waiting for a new container to run
    pub fn with_wait_budget(mut self, budget: Duration) -> Self {
        self.wait_budget = budget;
        self
    }

    pub fn runner(&self) -> &Arc<CommandRunner> {
        &self.runner
    }

    /// A command for `engine`, with the host's sudo policy applied
    pub fn cmd(&self, engine: Engine) -> Cmd {
        let program = self
            .programs
            .get(&engine)
            .map(String::as_str)
            .unwrap_or(engine.binary());
        self.runner.prefix_cmd(Cmd::new(program))
    }

    /// Run an engine subcommand, keeping the runner's error
    ///
    /// Used where stderr markers decide the error kind.
    pub async fn run_raw<I, S>(&self, engine: Engine, args: I) -> Result<RunResult, RunError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.run(self.cmd(engine).args(args), true).await
    }

    /// Run an engine subcommand, labelling failures with `action`
    pub async fn run<I, S>(
        &self,
        engine: Engine,
        args: I,
        action: &str,
    ) -> Result<RunResult, EngineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_raw(engine, args)
            .await
            .map_err(|e| EngineError::command(action, e))
    }
}
