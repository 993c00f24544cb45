//! Process-wide access layer
//!
//! One context resolver, TLS manager, command runner, engine client and
//! tunnel manager, wired together from a [`Config`] and a [`HostEnv`].

use std::sync::{Arc, OnceLock};

use crate::config::{Config, load_config};
use crate::context::{ContextError, ContextInfo, ContextResolver, TlsManager};
use crate::engine::EngineClient;
use crate::env::HostEnv;
use crate::runner::{CommandRunner, RunnerSettings};
use crate::tunnel::{TunnelError, TunnelManager, TunnelSettings};

static GLOBAL: OnceLock<Services> = OnceLock::new();

pub struct Services {
    config: Config,
    env: HostEnv,
    tls: Arc<TlsManager>,
    resolver: Arc<ContextResolver>,
    runner: Arc<CommandRunner>,
    engine: EngineClient,
    tunnels: TunnelManager,
}

impl Services {
    pub fn new(config: Config, env: HostEnv) -> Self {
        let tls = Arc::new(TlsManager::new());
        // Resolve against the user's own daemon, not a cluster-internal one.
        let resolver_env = env.with_changes(&env.host_daemon_restore());
        let resolver = Arc::new(ContextResolver::with_ttl(
            resolver_env,
            tls.clone(),
            config.context_cache_ttl(),
        ));
        let runner = Arc::new(
            CommandRunner::new(RunnerSettings::from_config(&config, &env), env.clone())
                .with_context_resolver(resolver.clone()),
        );
        let engine = EngineClient::new(runner.clone());
        let tunnels = TunnelManager::new(TunnelSettings::from_config(&config), runner.clone());

        Self {
            config,
            env,
            tls,
            resolver,
            runner,
            engine,
            tunnels,
        }
    }

    /// The shared instance, built on first use from the config file and the
    /// process environment
    ///
    /// A config file that fails to load logs a warning and defaults apply.
    pub fn global() -> &'static Services {
        GLOBAL.get_or_init(|| {
            let config = load_config().unwrap_or_else(|e| {
                tracing::warn!("Using default configuration: {:#}", e);
                Config::default()
            });
            Services::new(config, HostEnv::capture())
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn env(&self) -> &HostEnv {
        &self.env
    }

    pub fn tls(&self) -> &Arc<TlsManager> {
        &self.tls
    }

    pub fn resolver(&self) -> &Arc<ContextResolver> {
        &self.resolver
    }

    pub fn runner(&self) -> &Arc<CommandRunner> {
        &self.runner
    }

    pub fn engine(&self) -> &EngineClient {
        &self.engine
    }

    pub fn tunnels(&self) -> &TunnelManager {
        &self.tunnels
    }

    pub fn current_context(&self) -> Result<Arc<ContextInfo>, ContextError> {
        self.resolver.current()
    }

    /// Local URL of the API server on the current context, tunnelling over
    /// SSH when needed
    pub async fn api_server_endpoint(&self, port: u16) -> Result<Option<String>, TunnelError> {
        let ctx = self.resolver.current()?;
        self.tunnels.api_server_endpoint(&ctx, port).await
    }

    /// Stop every tunnel and remove every TLS directory
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.tunnels.stop_all_tunnels().await;
        self.tls.cleanup_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ENV_HOST_CONTEXT;
    use crate::env::{ACTIVE_DOCKERD_ENV, DOCKER_HOST};

    #[test]
    fn resolver_sees_the_restored_host_daemon() {
        let env = HostEnv::from_pairs([
            (ACTIVE_DOCKERD_ENV, "kicup"),
            (DOCKER_HOST, "tcp://192.168.49.2:2376"),
            ("KICUP_EXISTING_DOCKER_HOST", "unix:///run/user/1000/docker.sock"),
        ]);
        let services = Services::new(Config::default(), env);
        let ctx = services.current_context().unwrap();
        assert_eq!(ctx.name, ENV_HOST_CONTEXT);
        assert_eq!(ctx.host, "unix:///run/user/1000/docker.sock");
        assert!(!ctx.is_remote);
        // The runner still sees the raw snapshot and restores per command.
        assert_eq!(services.env().get(DOCKER_HOST), Some("tcp://192.168.49.2:2376"));
    }

    #[tokio::test]
    async fn local_context_needs_no_tunnel() {
        let env = HostEnv::from_pairs([(DOCKER_HOST, "unix:///var/run/docker.sock")]);
        let services = Services::new(Config::default(), env);
        assert_eq!(services.api_server_endpoint(8443).await.unwrap(), None);
        assert!(services.tunnels().tunnels().is_empty());
    }

    #[tokio::test]
    async fn shutdown_twice_is_harmless() {
        let services = Services::new(Config::default(), HostEnv::default());
        services.shutdown().await;
        services.shutdown().await;
        assert!(services.tls().is_empty());
    }
}
