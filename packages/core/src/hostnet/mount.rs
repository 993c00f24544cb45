//! Bind mount specs and port mappings for container creation.
//!
//! This module provides functionality to:
//! - Parse mount strings in engine CLI format (`[host:]container[:opts]`)
//! - Render mounts as `--volume` arguments and plain `-v` specs
//! - Render port mappings as `--publish` arguments

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while parsing a mount spec.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MountError {
    /// Spec was empty.
    #[error("invalid empty spec")]
    Empty,

    /// Host path given but container path is relative.
    #[error("'{0}' container path must be absolute")]
    RelativeContainerPath(String),

    /// Option field contains something other than Z, ro, rw, rslave, rshared or private.
    #[error("unknown mount option: '{0}'")]
    UnknownOption(String),

    /// Too many colon-separated fields.
    #[error("spec must be in form: <host path>:<container path>[:<options>]")]
    InvalidFormat,
}

/// How mounts propagate between host and container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountPropagation {
    /// `private`: no propagation.
    #[default]
    None,
    /// `rslave`: mounts propagate from host to container.
    HostToContainer,
    /// `rshared`: mounts propagate both ways.
    Bidirectional,
}

impl MountPropagation {
    /// The option keyword, or `None` for the default.
    fn option(self) -> Option<&'static str> {
        match self {
            MountPropagation::None => None,
            MountPropagation::HostToContainer => Some("rslave"),
            MountPropagation::Bidirectional => Some("rshared"),
        }
    }
}

/// A bind mount into a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mount {
    /// Host path; empty for an anonymous volume.
    pub host_path: String,

    /// Path inside the container.
    pub container_path: String,

    pub readonly: bool,

    /// Request SELinux relabeling (`Z`).
    pub selinux_relabel: bool,

    pub propagation: MountPropagation,
}

impl Mount {
    /// Options rendered in the order `ro`, `Z`, propagation.
    fn options(&self) -> Vec<&'static str> {
        let mut opts = Vec::new();
        if self.readonly {
            opts.push("ro");
        }
        if self.selinux_relabel {
            opts.push("Z");
        }
        if let Some(p) = self.propagation.option() {
            opts.push(p);
        }
        opts
    }

    /// `H:C[:opts]`, as passed to `-v`.
    pub fn bind_spec(&self) -> String {
        let mut spec = format!("{}:{}", self.host_path, self.container_path);
        let opts = self.options();
        if !opts.is_empty() {
            spec.push(':');
            spec.push_str(&opts.join(","));
        }
        spec
    }

    /// `--volume=H:C[:opts]`
    pub fn volume_arg(&self) -> String {
        format!("--volume={}", self.bind_spec())
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bind_spec())
    }
}

impl FromStr for Mount {
    type Err = MountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_mount_spec(s)
    }
}

/// Matches `^[A-Z]:` at the start of a spec.
fn has_drive_letter(spec: &str) -> bool {
    let bytes = spec.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_uppercase() && bytes[1] == b':'
}

/// Parse a `[host:]container[:opts]` mount spec.
///
/// A lone field is the container path of an anonymous volume. With a
/// Windows drive letter (`C:\...`) the first two colon-split fields form
/// the host path. Options are a comma list of `Z`, `ro`, `rw`, `rslave`,
/// `rshared` and `private`.
///
/// # Examples
/// ```
/// use kicup_core::hostnet::{MountPropagation, parse_mount_spec};
///
/// let mount = parse_mount_spec("/foo:/bar:Z,rshared").unwrap();
/// assert_eq!(mount.host_path, "/foo");
/// assert!(mount.selinux_relabel);
/// assert_eq!(mount.propagation, MountPropagation::Bidirectional);
///
/// assert!(parse_mount_spec("/foo/bar:baz:private").is_err());
/// ```
pub fn parse_mount_spec(spec: &str) -> Result<Mount, MountError> {
    if spec.is_empty() {
        return Err(MountError::Empty);
    }

    let split: Vec<&str> = spec.split(':').collect();
    let fields: Vec<String> = if has_drive_letter(spec) {
        std::iter::once(format!("{}:{}", split[0], split[1]))
            .chain(split[2..].iter().map(|s| s.to_string()))
            .collect()
    } else {
        split.iter().map(|s| s.to_string()).collect()
    };

    let mut mount = Mount::default();
    match fields.as_slice() {
        [container] => {
            mount.container_path = container.clone();
        }
        [host, container] => {
            mount.host_path = host.clone();
            mount.container_path = container.clone();
        }
        [host, container, opts] => {
            for opt in opts.split(',') {
                match opt {
                    "Z" => mount.selinux_relabel = true,
                    "ro" => mount.readonly = true,
                    "rw" => mount.readonly = false,
                    "rslave" => mount.propagation = MountPropagation::HostToContainer,
                    "rshared" => mount.propagation = MountPropagation::Bidirectional,
                    "private" => mount.propagation = MountPropagation::None,
                    other => return Err(MountError::UnknownOption(other.to_string())),
                }
            }
            mount.host_path = host.clone();
            mount.container_path = container.clone();
        }
        _ => return Err(MountError::InvalidFormat),
    }

    if !mount.host_path.is_empty() && !mount.container_path.starts_with('/') {
        return Err(MountError::RelativeContainerPath(mount.container_path));
    }
    Ok(mount)
}

/// A host port published into a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    /// Bind address on the host; all interfaces when empty.
    pub listen_address: String,

    /// Host port; 0 lets the engine pick one.
    pub host_port: u16,

    pub container_port: u16,
}

impl PortMapping {
    /// Publish `container_port` on a random host port bound to `listen_address`.
    pub fn ephemeral(listen_address: impl Into<String>, container_port: u16) -> Self {
        Self {
            listen_address: listen_address.into(),
            host_port: 0,
            container_port,
        }
    }

    /// `--publish=[listen:]host:container`, leaving `host` empty when 0.
    pub fn publish_arg(&self) -> String {
        let host = if self.host_port == 0 {
            String::new()
        } else {
            self.host_port.to_string()
        };
        if self.listen_address.is_empty() {
            format!("--publish={}:{}", host, self.container_port)
        } else {
            format!(
                "--publish={}:{}:{}",
                self.listen_address, host, self.container_port
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_container() {
        let mount = parse_mount_spec("/home/me/src:/src").unwrap();
        assert_eq!(
            mount,
            Mount {
                host_path: "/home/me/src".into(),
                container_path: "/src".into(),
                readonly: false,
                selinux_relabel: false,
                propagation: MountPropagation::None,
            }
        );
    }

    #[test]
    fn options_are_applied() {
        let mount = parse_mount_spec("/foo:/bar:Z,rshared").unwrap();
        assert!(mount.selinux_relabel);
        assert_eq!(mount.propagation, MountPropagation::Bidirectional);

        let mount = parse_mount_spec("/foo:/bar:ro,rslave").unwrap();
        assert!(mount.readonly);
        assert_eq!(mount.propagation, MountPropagation::HostToContainer);

        let mount = parse_mount_spec("/foo:/bar:ro,rw,private").unwrap();
        assert!(!mount.readonly);
        assert_eq!(mount.propagation, MountPropagation::None);
    }

    #[test]
    fn container_path_only() {
        let mount = parse_mount_spec("/var/lib/data").unwrap();
        assert_eq!(mount.host_path, "");
        assert_eq!(mount.container_path, "/var/lib/data");
    }

    #[test]
    fn windows_drive_letter() {
        let mount = parse_mount_spec(r"C:\Users\me:/data:ro").unwrap();
        assert_eq!(mount.host_path, r"C:\Users\me");
        assert_eq!(mount.container_path, "/data");
        assert!(mount.readonly);
    }

    #[test]
    fn rejects_malformed_specs() {
        assert_eq!(parse_mount_spec(""), Err(MountError::Empty));
        assert_eq!(
            parse_mount_spec("/foo/bar:baz:private"),
            Err(MountError::RelativeContainerPath("baz".into()))
        );
        assert_eq!(
            parse_mount_spec("/foo:bar"),
            Err(MountError::RelativeContainerPath("bar".into()))
        );
        assert_eq!(
            parse_mount_spec("/foo:/bar:bogus"),
            Err(MountError::UnknownOption("bogus".into()))
        );
        assert_eq!(
            parse_mount_spec("/a:/b:ro:extra"),
            Err(MountError::InvalidFormat)
        );
    }

    #[test]
    fn relative_container_path_message() {
        let err = parse_mount_spec("/foo/bar:baz:private").unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[test]
    fn renders_volume_args() {
        let mount = parse_mount_spec("/foo:/bar:Z,ro,rshared").unwrap();
        assert_eq!(mount.volume_arg(), "--volume=/foo:/bar:ro,Z,rshared");
        assert_eq!(mount.to_string(), "/foo:/bar:ro,Z,rshared");

        let plain = parse_mount_spec("/foo:/bar:private").unwrap();
        assert_eq!(plain.volume_arg(), "--volume=/foo:/bar");
    }

    #[test]
    fn renders_publish_args() {
        assert_eq!(
            PortMapping::ephemeral("127.0.0.1", 22).publish_arg(),
            "--publish=127.0.0.1::22"
        );
        let fixed = PortMapping {
            listen_address: String::new(),
            host_port: 8443,
            container_port: 8443,
        };
        assert_eq!(fixed.publish_arg(), "--publish=8443:8443");
    }
}
