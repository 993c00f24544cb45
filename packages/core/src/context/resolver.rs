//! Current daemon context resolution with a short-lived cache

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use super::error::ContextError;
use super::host::parse_host_info;
use super::store;
use super::tls::TlsManager;
use super::{ContextInfo, DEFAULT_CONTEXT, ENV_HOST_CONTEXT};
use crate::config::docker_config_dir;
use crate::env::{DOCKER_CERT_PATH, DOCKER_CONTEXT, DOCKER_HOST, DOCKER_TLS_VERIFY, HostEnv};

/// How long a resolved context stays valid
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

struct CachedContext {
    info: Arc<ContextInfo>,
    fetched_at: Instant,
}

/// Resolves where the container daemon lives
///
/// Precedence:
/// 1. `DOCKER_HOST` → synthetic `environment-host` context
/// 2. `DOCKER_CONTEXT` → named context from the store
/// 3. `currentContext` in the docker config file; a missing config
///    directory means the local default
/// 4. empty or `default` → local default
/// 5. otherwise the named context's docker endpoint and TLS files
pub struct ContextResolver {
    env: HostEnv,
    tls: Arc<TlsManager>,
    ttl: Duration,
    cache: RwLock<Option<CachedContext>>,
}

impl ContextResolver {
    pub fn new(env: HostEnv, tls: Arc<TlsManager>) -> Self {
        Self::with_ttl(env, tls, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(env: HostEnv, tls: Arc<TlsManager>, ttl: Duration) -> Self {
        Self {
            env,
            tls,
            ttl,
            cache: RwLock::new(None),
        }
    }

    pub fn tls_manager(&self) -> &Arc<TlsManager> {
        &self.tls
    }

    /// The current context
    ///
    /// Within the cache TTL every call returns the same `Arc`.
    pub fn current(&self) -> Result<Arc<ContextInfo>, ContextError> {
        if let Some(info) = self.cached() {
            return Ok(info);
        }

        let resolved = Arc::new(self.resolve()?);

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have filled the cache while we were resolving.
        if let Some(entry) = cache.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.info.clone());
            }
        }
        *cache = Some(CachedContext {
            info: resolved.clone(),
            fetched_at: Instant::now(),
        });
        Ok(resolved)
    }

    /// Environment variables that point an engine CLI at the current context
    ///
    /// `DOCKER_HOST` is set for any non-empty host. When the context carries
    /// TLS material, `DOCKER_TLS_VERIFY=1` and `DOCKER_CERT_PATH` are added,
    /// with the certificates materialized by the TLS manager.
    pub fn context_environment(&self) -> Result<BTreeMap<String, String>, ContextError> {
        let ctx = self.current()?;
        let mut vars = BTreeMap::new();
        if !ctx.host.is_empty() {
            vars.insert(DOCKER_HOST.to_string(), ctx.host.clone());
        }
        if let Some(bundle) = ctx.tls.as_ref().filter(|b| !b.is_empty()) {
            let path = self.tls.get_or_create_path(&ctx.name, bundle)?;
            vars.insert(DOCKER_TLS_VERIFY.to_string(), "1".to_string());
            vars.insert(
                DOCKER_CERT_PATH.to_string(),
                path.to_string_lossy().into_owned(),
            );
        }
        Ok(vars)
    }

    fn cached(&self) -> Option<Arc<ContextInfo>> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.info.clone())
    }

    fn resolve(&self) -> Result<ContextInfo, ContextError> {
        if let Some(host) = self.env.get(DOCKER_HOST) {
            let (is_remote, is_ssh) = parse_host_info(host)?;
            tracing::debug!("Using daemon host from {}: {}", DOCKER_HOST, host);
            return Ok(ContextInfo {
                name: ENV_HOST_CONTEXT.to_string(),
                host: host.to_string(),
                is_remote,
                is_ssh,
                tls: None,
            });
        }

        let config_dir = docker_config_dir(&self.env);
        let current = match self.env.get(DOCKER_CONTEXT) {
            Some(name) => name.to_string(),
            None => {
                let Some(dir) = config_dir.as_deref().filter(|d| d.is_dir()) else {
                    tracing::debug!("No docker config directory, using default context");
                    return Ok(ContextInfo::local_default());
                };
                store::read_current_context(dir)?
            }
        };

        if current.is_empty() || current == DEFAULT_CONTEXT {
            return Ok(ContextInfo::local_default());
        }

        let dir = config_dir.ok_or(ContextError::NoConfigDir)?;
        let endpoint = store::load_endpoint(&dir, &current)?;
        let (is_remote, is_ssh) = parse_host_info(&endpoint.host)?;

        let tls = if is_remote && !is_ssh {
            match store::load_tls(&dir, &current) {
                Ok(tls) => tls,
                Err(e) => {
                    tracing::warn!("Failed to load TLS data for context {}: {}", current, e);
                    None
                }
            }
        } else {
            None
        };

        tracing::debug!(
            "Resolved daemon context {} (host: {}, remote: {}, ssh: {})",
            current,
            endpoint.host,
            is_remote,
            is_ssh
        );
        Ok(ContextInfo {
            name: current,
            host: endpoint.host,
            is_remote,
            is_ssh,
            tls,
        })
    }
}
