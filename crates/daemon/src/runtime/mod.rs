//! Container runtime capability.
//!
//! The workspace services only need to inspect, run, start and stop
//! containers. [`ContainerRuntime`] captures that contract; [`DockerCli`]
//! implements it by invoking a docker compatible CLI.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use common::overlay::OverlayMount;
use serde::{Deserialize, Serialize};

mod docker;
#[cfg(test)]
pub(crate) mod fake;

pub use docker::DockerCli;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("container {0} not found")]
    NotFound(String),
    #[error("container {name} did not stop within {grace:?}")]
    Timeout { name: String, grace: Duration },
    #[error("container runtime command failed: {0}")]
    Command(String),
    #[error("failed to invoke container runtime: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected container runtime output: {0}")]
    Parse(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

/// Container lifecycle status as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
}

impl ContainerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Removing => "removing",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

impl std::str::FromStr for ContainerStatus {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            other => return Err(RuntimeError::Parse(format!("unknown status {other:?}"))),
        })
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A container as seen by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub status: ContainerStatus,
    /// Published container port (tcp) → host port.
    pub host_ports: BTreeMap<u16, u16>,
}

impl ContainerInfo {
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.host_ports.get(&container_port).copied()
    }
}

/// A filesystem attached to a new container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountSpec {
    /// Named volume managed by the runtime.
    Volume {
        name: String,
        target: PathBuf,
        read_only: bool,
    },
    /// Host directory.
    Bind {
        source: PathBuf,
        target: PathBuf,
        read_only: bool,
    },
    /// Overlay of a read-only lower layer and a private upper layer.
    Overlay(OverlayMount),
    /// In-memory scratch space.
    Tmpfs { target: PathBuf },
}

/// Everything needed to create and start a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub image: String,
    pub name: String,
    pub mounts: Vec<MountSpec>,
    /// Container ports to publish on dynamically assigned host ports.
    pub publish: Vec<u16>,
    pub workdir: Option<PathBuf>,
    pub tty: bool,
    pub stdin_open: bool,
    pub read_only_rootfs: bool,
    pub auto_remove: bool,
}

impl RunSpec {
    pub fn new(image: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            name: name.into(),
            mounts: Vec::new(),
            publish: Vec::new(),
            workdir: None,
            tty: false,
            stdin_open: false,
            read_only_rootfs: false,
            auto_remove: false,
        }
    }

    pub fn mount(mut self, mount: MountSpec) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn publish(mut self, port: u16) -> Self {
        self.publish.push(port);
        self
    }

    pub fn workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.tty = true;
        self.stdin_open = true;
        self
    }

    pub fn read_only_rootfs(mut self) -> Self {
        self.read_only_rootfs = true;
        self
    }

    pub fn auto_remove(mut self) -> Self {
        self.auto_remove = true;
        self
    }
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look a container up by name or id.
    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError>;

    /// Create and start a detached container.
    async fn run(&self, spec: &RunSpec) -> Result<ContainerInfo, RuntimeError>;

    async fn start(&self, name_or_id: &str) -> Result<(), RuntimeError>;

    /// Stop a container, killing it once `grace` has elapsed.
    async fn stop(&self, name_or_id: &str, grace: Duration) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("running".parse::<ContainerStatus>().unwrap(), ContainerStatus::Running);
        assert!("exited".parse::<ContainerStatus>().unwrap() != ContainerStatus::Running);
        assert!(matches!(
            "sleeping".parse::<ContainerStatus>(),
            Err(RuntimeError::Parse(_))
        ));
    }

    #[test]
    fn test_run_spec_builder() {
        let spec = RunSpec::new("img:1", "box")
            .publish(7681)
            .workdir("/guest")
            .interactive()
            .read_only_rootfs()
            .auto_remove()
            .mount(MountSpec::Tmpfs {
                target: "/guest".into(),
            });

        assert_eq!(spec.publish, vec![7681]);
        assert!(spec.tty && spec.stdin_open && spec.read_only_rootfs && spec.auto_remove);
        assert_eq!(spec.mounts.len(), 1);
    }
}
