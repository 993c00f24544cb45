//! XDG-style path resolution for kicup
//!
//! - Linux/macOS: `~/.config/kicup/`
//! - Windows: `%APPDATA%\kicup\`
//!
//! Also resolves the container engine's own config directory, which holds
//! the current-context pointer and the context store.

use std::path::PathBuf;

use crate::env::{DOCKER_CONFIG, HostEnv};

const PROJECT_DIR: &str = "kicup";

/// Get the kicup configuration directory
pub fn get_config_dir() -> Option<PathBuf> {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".config").join(PROJECT_DIR))
    }
    #[cfg(target_os = "windows")]
    {
        directories::BaseDirs::new().map(|dirs| dirs.config_dir().join(PROJECT_DIR))
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        None
    }
}

/// Get the full path to the config file
///
/// Returns: `{config_dir}/config.json`
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join("config.json"))
}

/// Get the Docker CLI config directory
///
/// `$DOCKER_CONFIG` when set, otherwise `~/.docker`.
pub fn docker_config_dir(env: &HostEnv) -> Option<PathBuf> {
    if let Some(dir) = env.get(DOCKER_CONFIG) {
        return Some(PathBuf::from(dir));
    }
    dirs::home_dir().map(|home| home.join(".docker"))
}
