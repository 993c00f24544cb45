//! Reader for the Docker CLI's on-disk context store
//!
//! Layout under the docker config directory:
//!
//! ```text
//! config.json                                   {"currentContext": "..."}
//! contexts/meta/<sha256(name)>/meta.json        {"Endpoints": {"docker": {"Host": ...}}}
//! contexts/tls/<sha256(name)>/docker/*.pem
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::TlsBundle;
use super::error::ContextError;

/// Endpoint name holding the engine API address
const DOCKER_ENDPOINT: &str = "docker";

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(rename = "currentContext", default)]
    current_context: String,
}

#[derive(Debug, Deserialize)]
struct ContextMetadata {
    #[serde(rename = "Endpoints", default)]
    endpoints: HashMap<String, EndpointMetadata>,
}

#[derive(Debug, Deserialize)]
struct EndpointMetadata {
    #[serde(rename = "Host", default)]
    host: String,
    #[serde(rename = "SkipTLSVerify", default)]
    skip_tls_verify: bool,
}

/// Docker endpoint of a named context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEndpoint {
    pub host: String,
    pub skip_tls_verify: bool,
}

/// Directory name the store uses for a context
pub fn context_dir_name(name: &str) -> String {
    hex::encode(Sha256::digest(name.as_bytes()))
}

pub fn meta_dir(config_dir: &Path, name: &str) -> PathBuf {
    config_dir
        .join("contexts")
        .join("meta")
        .join(context_dir_name(name))
}

pub fn tls_dir(config_dir: &Path, name: &str) -> PathBuf {
    config_dir
        .join("contexts")
        .join("tls")
        .join(context_dir_name(name))
        .join(DOCKER_ENDPOINT)
}

/// Read the current-context pointer
///
/// A missing `config.json` means no context was ever selected, which the
/// caller treats as `"default"`.
pub fn read_current_context(config_dir: &Path) -> Result<String, ContextError> {
    let path = config_dir.join("config.json");
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(String::new()),
        Err(source) => return Err(ContextError::Read { path, source }),
    };
    if contents.trim().is_empty() {
        return Ok(String::new());
    }
    let config: DockerConfigFile =
        serde_json::from_str(&contents).map_err(|source| ContextError::Parse { path, source })?;
    Ok(config.current_context)
}

/// Load the docker endpoint of a named context
pub fn load_endpoint(config_dir: &Path, name: &str) -> Result<StoredEndpoint, ContextError> {
    let path = meta_dir(config_dir, name).join("meta.json");
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ContextError::NotFound(name.to_string()));
        }
        Err(source) => return Err(ContextError::Read { path, source }),
    };
    let mut meta: ContextMetadata =
        serde_json::from_str(&contents).map_err(|source| ContextError::Parse { path, source })?;

    let endpoint = meta
        .endpoints
        .remove(DOCKER_ENDPOINT)
        .ok_or_else(|| ContextError::MissingDockerEndpoint(name.to_string()))?;
    Ok(StoredEndpoint {
        host: endpoint.host,
        skip_tls_verify: endpoint.skip_tls_verify,
    })
}

/// Load the TLS files stored for a context's docker endpoint
///
/// Returns `None` when the context has no TLS material.
pub fn load_tls(config_dir: &Path, name: &str) -> Result<Option<TlsBundle>, ContextError> {
    let dir = tls_dir(config_dir, name);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(ContextError::Read { path: dir, source }),
    };

    let mut bundle = TlsBundle::new();
    for entry in entries {
        let entry = entry.map_err(|source| ContextError::Read {
            path: dir.clone(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let bytes = fs::read(&path).map_err(|source| ContextError::Read {
            path: path.clone(),
            source,
        })?;
        bundle.insert(entry.file_name().to_string_lossy().into_owned(), bytes);
    }

    Ok((!bundle.is_empty()).then_some(bundle))
}
