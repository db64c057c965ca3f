use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::{ContainerInfo, ContainerRuntime, MountSpec, RunSpec, RuntimeError};

/// Extra wall-clock time granted to `stop` on top of the grace period
/// before the CLI invocation itself is abandoned.
const STOP_SLACK: Duration = Duration::from_secs(10);

/// Timeout for every CLI call other than `stop`.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// [`ContainerRuntime`] backed by the docker (or podman) command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    async fn exec<I, S>(&self, target: &str, args: I, limit: Duration) -> Result<String, RuntimeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(limit, command.output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(RuntimeError::Timeout {
                    name: target.to_string(),
                    grace: limit,
                })
            }
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if is_missing_container(&stderr) {
            return Err(RuntimeError::NotFound(target.to_string()));
        }
        Err(RuntimeError::Command(format!(
            "{} exited with {}: {}",
            self.binary, output.status, stderr
        )))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError> {
        let stdout = self
            .exec(
                name_or_id,
                ["inspect", "--type", "container", name_or_id],
                COMMAND_TIMEOUT,
            )
            .await?;
        parse_inspect(&stdout)?
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::NotFound(name_or_id.to_string()))
    }

    async fn run(&self, spec: &RunSpec) -> Result<ContainerInfo, RuntimeError> {
        tracing::debug!(name = %spec.name, image = %spec.image, "running container");
        let id = self.exec(&spec.name, run_args(spec), COMMAND_TIMEOUT).await?;
        let id = id
            .lines()
            .last()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RuntimeError::Parse("run printed no container id".to_string()))?;
        self.inspect(id).await
    }

    async fn start(&self, name_or_id: &str) -> Result<(), RuntimeError> {
        self.exec(name_or_id, ["start", name_or_id], COMMAND_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn stop(&self, name_or_id: &str, grace: Duration) -> Result<(), RuntimeError> {
        let secs = grace.as_secs().to_string();
        match self
            .exec(
                name_or_id,
                ["stop", "--time", secs.as_str(), name_or_id],
                grace + STOP_SLACK,
            )
            .await
        {
            Err(RuntimeError::Timeout { name, .. }) => Err(RuntimeError::Timeout { name, grace }),
            other => other.map(|_| ()),
        }
    }
}

fn is_missing_container(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such container") || stderr.contains("no such object")
}

/// Arguments for `docker run` matching `spec`.
pub(crate) fn run_args(spec: &RunSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    if spec.tty {
        args.push("--tty".to_string());
    }
    if spec.stdin_open {
        args.push("--interactive".to_string());
    }
    if spec.read_only_rootfs {
        args.push("--read-only".to_string());
    }
    if spec.auto_remove {
        args.push("--rm".to_string());
    }
    if let Some(workdir) = &spec.workdir {
        args.push("--workdir".to_string());
        args.push(workdir.display().to_string());
    }
    for port in &spec.publish {
        args.push("--publish".to_string());
        args.push(format!("{port}/tcp"));
    }
    for mount in &spec.mounts {
        args.push("--mount".to_string());
        args.push(mount_arg(mount));
    }
    args.push(spec.image.clone());
    args
}

fn mount_arg(mount: &MountSpec) -> String {
    match mount {
        MountSpec::Volume {
            name,
            target,
            read_only,
        } => with_readonly(
            format!("type=volume,src={name},dst={}", target.display()),
            *read_only,
        ),
        MountSpec::Bind {
            source,
            target,
            read_only,
        } => with_readonly(
            format!(
                "type=bind,src={},dst={}",
                source.display(),
                target.display()
            ),
            *read_only,
        ),
        MountSpec::Tmpfs { target } => format!("type=tmpfs,dst={}", target.display()),
        // The option string holds commas, so that field is CSV-quoted.
        MountSpec::Overlay(overlay) => format!(
            "type=volume,dst={},volume-driver=local,volume-opt=type=overlay,\
             volume-opt=device=overlay,\"volume-opt=o={}\"",
            overlay.destination().display(),
            overlay.mount_options()
        ),
    }
}

fn with_readonly(mut arg: String, read_only: bool) -> String {
    if read_only {
        arg.push_str(",readonly");
    }
    arg
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectRecord {
    id: String,
    name: String,
    state: InspectState,
    #[serde(default)]
    network_settings: Option<InspectNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetwork {
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<PortBinding>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PortBinding {
    host_port: String,
}

pub(crate) fn parse_inspect(stdout: &str) -> Result<Vec<ContainerInfo>, RuntimeError> {
    let records: Vec<InspectRecord> =
        serde_json::from_str(stdout).map_err(|e| RuntimeError::Parse(e.to_string()))?;

    records
        .into_iter()
        .map(|record| {
            let mut host_ports = BTreeMap::new();
            let ports = record
                .network_settings
                .and_then(|n| n.ports)
                .unwrap_or_default();
            for (key, bindings) in ports {
                let Some((port, proto)) = key.split_once('/') else {
                    continue;
                };
                if proto != "tcp" {
                    continue;
                }
                let Ok(container_port) = port.parse::<u16>() else {
                    continue;
                };
                let host_port = bindings
                    .unwrap_or_default()
                    .iter()
                    .find_map(|b| b.host_port.parse::<u16>().ok());
                if let Some(host_port) = host_port {
                    host_ports.insert(container_port, host_port);
                }
            }

            Ok(ContainerInfo {
                id: record.id,
                name: record.name.trim_start_matches('/').to_string(),
                status: record.state.status.parse()?,
                host_ports,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ContainerStatus;
    use common::overlay::OverlayMount;

    const INSPECT: &str = r#"[
      {
        "Id": "4f2c9e",
        "Name": "/session_alice",
        "State": { "Status": "running", "Running": true },
        "NetworkSettings": {
          "Ports": {
            "7681/tcp": [
              { "HostIp": "0.0.0.0", "HostPort": "49153" },
              { "HostIp": "::", "HostPort": "49153" }
            ],
            "9000/tcp": null,
            "53/udp": [{ "HostIp": "0.0.0.0", "HostPort": "5353" }]
          }
        }
      }
    ]"#;

    #[test]
    fn test_parse_inspect() {
        let info = parse_inspect(INSPECT).unwrap().remove(0);
        assert_eq!(info.id, "4f2c9e");
        assert_eq!(info.name, "session_alice");
        assert_eq!(info.status, ContainerStatus::Running);
        assert_eq!(info.host_port(7681), Some(49153));
        assert_eq!(info.host_port(9000), None);
        assert_eq!(info.host_port(53), None);
    }

    #[test]
    fn test_parse_inspect_without_ports() {
        let stopped = r#"[{"Id":"x","Name":"/guest_1","State":{"Status":"exited"},"NetworkSettings":{"Ports":{}}}]"#;
        let info = parse_inspect(stopped).unwrap().remove(0);
        assert!(!info.status.is_running());
        assert!(info.host_ports.is_empty());
    }

    #[test]
    fn test_missing_container_detection() {
        assert!(is_missing_container("Error: No such container: session_bob"));
        assert!(is_missing_container("Error: no such container \"x\""));
        assert!(!is_missing_container("permission denied"));
    }

    #[test]
    fn test_run_args() {
        let overlay = OverlayMount::new(
            "/srv/playground/alice/app",
            "/var/lib/cowork/abc/upper",
            "/var/lib/cowork/abc/work",
            "/global/alice/app",
        )
        .unwrap();
        let spec = RunSpec::new("chaospine:1.0.0", "contrib_bob_for_alice_app_abc")
            .publish(7681)
            .auto_remove()
            .mount(MountSpec::Overlay(overlay))
            .mount(MountSpec::Bind {
                source: "/srv/playground".into(),
                target: "/playground".into(),
                read_only: true,
            });

        let args = run_args(&spec);
        assert_eq!(&args[..4], ["run", "--detach", "--name", "contrib_bob_for_alice_app_abc"]);
        assert!(args.contains(&"--rm".to_string()));
        assert!(args.contains(&"7681/tcp".to_string()));
        assert!(!args.contains(&"--tty".to_string()));
        assert!(args.contains(
            &"type=volume,dst=/global/alice/app,volume-driver=local,volume-opt=type=overlay,\
              volume-opt=device=overlay,\"volume-opt=o=lowerdir=/srv/playground/alice/app,\
              upperdir=/var/lib/cowork/abc/upper,workdir=/var/lib/cowork/abc/work\""
                .to_string()
        ));
        assert!(args.contains(&"type=bind,src=/srv/playground,dst=/playground,readonly".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("chaospine:1.0.0"));
    }
}
