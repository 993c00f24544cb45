//! TLS material manager
//!
//! Docker's context store keeps TLS certificates as blobs; the engine CLI
//! wants a directory (`DOCKER_CERT_PATH`). This module writes each
//! context's bundle into a private temp directory once per process and
//! removes every directory on shutdown.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;

use super::TlsBundle;

/// Prefix for materialized TLS directories under the system temp root
pub const TLS_DIR_PREFIX: &str = "kicup-docker-tls-";

/// Errors from materializing TLS files
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("TLS bundle for context {0:?} is empty")]
    EmptyBundle(String),

    #[error("Refusing to write TLS file with unsafe name {0:?}")]
    InvalidFileName(String),

    #[error("Failed to create TLS directory: {0}")]
    CreateDir(#[source] std::io::Error),

    #[error("Failed to write TLS file {}: {source}", .path.display())]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Registry of materialized TLS directories, keyed by context name
#[derive(Debug)]
pub struct TlsManager {
    prefix: String,
    paths: Mutex<HashMap<String, PathBuf>>,
}

impl Default for TlsManager {
    fn default() -> Self {
        Self::with_prefix(TLS_DIR_PREFIX)
    }
}

impl TlsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            paths: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding `bundle` for `ctx_name`, created on first use
    ///
    /// Repeated calls return the same path until the directory disappears,
    /// in which case the stale entry is evicted and a fresh directory is
    /// written.
    pub fn get_or_create_path(
        &self,
        ctx_name: &str,
        bundle: &TlsBundle,
    ) -> Result<PathBuf, TlsError> {
        if bundle.is_empty() {
            return Err(TlsError::EmptyBundle(ctx_name.to_string()));
        }

        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = paths.get(ctx_name) {
            if existing.is_dir() {
                return Ok(existing.clone());
            }
            tracing::debug!(
                "TLS directory {} for context {} is gone, recreating",
                existing.display(),
                ctx_name
            );
            paths.remove(ctx_name);
        }

        let dir = tempfile::Builder::new()
            .prefix(&self.prefix)
            .tempdir()
            .map_err(TlsError::CreateDir)?
            .keep();

        if let Err(e) = write_bundle(&dir, bundle) {
            if let Err(rm) = fs::remove_dir_all(&dir) {
                tracing::debug!("Failed to remove partial TLS dir {}: {}", dir.display(), rm);
            }
            return Err(e);
        }

        tracing::debug!(
            "Materialized TLS files for context {} at {}",
            ctx_name,
            dir.display()
        );
        paths.insert(ctx_name.to_string(), dir.clone());
        Ok(dir)
    }

    /// Remove every materialized directory and clear the registry
    ///
    /// Safe to call more than once. Per-directory failures are logged and
    /// do not stop the sweep.
    pub fn cleanup_all(&self) {
        let drained: Vec<(String, PathBuf)> = self
            .paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (name, path) in drained {
            match fs::remove_dir_all(&path) {
                Ok(()) => tracing::debug!("Removed TLS directory {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    "Failed to remove TLS directory for context {} at {}: {}",
                    name,
                    path.display(),
                    e
                ),
            }
        }
    }

    /// Number of registered contexts
    pub fn len(&self) -> usize {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn write_bundle(dir: &Path, bundle: &TlsBundle) -> Result<(), TlsError> {
    for (name, bytes) in bundle {
        if Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name.as_str()) {
            return Err(TlsError::InvalidFileName(name.clone()));
        }
        let path = dir.join(name);
        write_private(&path, bytes).map_err(|source| TlsError::WriteFile {
            path: path.clone(),
            source,
        })?;
    }
    Ok(())
}

fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> TlsBundle {
        TlsBundle::from([
            ("ca.pem".to_string(), b"ca".to_vec()),
            ("cert.pem".to_string(), b"cert".to_vec()),
            ("key.pem".to_string(), b"key".to_vec()),
        ])
    }

    #[test]
    fn writes_files_and_memoizes_path() {
        let manager = TlsManager::new();
        let first = manager.get_or_create_path("remote", &bundle()).unwrap();
        let second = manager.get_or_create_path("remote", &bundle()).unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read(first.join("key.pem")).unwrap(), b"key");
        assert!(
            first
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(TLS_DIR_PREFIX)
        );
        manager.cleanup_all();
    }

    #[cfg(unix)]
    #[test]
    fn files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let manager = TlsManager::new();
        let dir = manager.get_or_create_path("remote", &bundle()).unwrap();
        for name in ["ca.pem", "cert.pem", "key.pem"] {
            let mode = fs::metadata(dir.join(name)).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600, "{name}");
        }
        manager.cleanup_all();
    }

    #[test]
    fn recreates_after_external_removal() {
        let manager = TlsManager::new();
        let first = manager.get_or_create_path("remote", &bundle()).unwrap();
        fs::remove_dir_all(&first).unwrap();
        let second = manager.get_or_create_path("remote", &bundle()).unwrap();
        assert_ne!(first, second);
        assert!(second.join("ca.pem").exists());
        manager.cleanup_all();
    }

    #[test]
    fn cleanup_is_idempotent() {
        let manager = TlsManager::new();
        let a = manager.get_or_create_path("a", &bundle()).unwrap();
        let b = manager.get_or_create_path("b", &bundle()).unwrap();
        assert_eq!(manager.len(), 2);

        manager.cleanup_all();
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(manager.is_empty());

        manager.cleanup_all();
        assert!(manager.is_empty());
    }

    #[test]
    fn rejects_empty_bundle_and_path_names() {
        let manager = TlsManager::new();
        assert!(matches!(
            manager.get_or_create_path("x", &TlsBundle::new()),
            Err(TlsError::EmptyBundle(_))
        ));

        let evil = TlsBundle::from([("../escape.pem".to_string(), b"x".to_vec())]);
        assert!(matches!(
            manager.get_or_create_path("x", &evil),
            Err(TlsError::InvalidFileName(_))
        ));
        assert!(manager.is_empty());
    }

    #[test]
    fn failed_write_leaves_no_directory_behind() {
        let prefix = format!("kicup-tls-partial-{}-", std::process::id());
        let manager = TlsManager::with_prefix(prefix.clone());
        let bundle = TlsBundle::from([
            ("ca.pem".to_string(), b"ca".to_vec()),
            ("nested/key.pem".to_string(), b"key".to_vec()),
        ]);
        assert!(manager.get_or_create_path("x", &bundle).is_err());

        let leftovers = fs::read_dir(std::env::temp_dir())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .count();
        assert_eq!(leftovers, 0);
    }
}
