//! In-process runtime used by unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ContainerInfo, ContainerRuntime, ContainerStatus, RunSpec, RuntimeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopFailure {
    Timeout,
    Command,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    info: ContainerInfo,
    auto_remove: bool,
}

#[derive(Debug, Default)]
struct Inner {
    containers: HashMap<String, FakeContainer>,
    runs: Vec<RunSpec>,
    starts: Vec<String>,
    stops: Vec<String>,
    next_id: u32,
    fail_runs: bool,
    skip_ports: bool,
    stop_failures: HashMap<String, StopFailure>,
    every_stop_fails: Option<StopFailure>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    inner: Mutex<Inner>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_runs(&self, fail: bool) {
        self.inner.lock().unwrap().fail_runs = fail;
    }

    /// Start containers without publishing any host port.
    pub(crate) fn skip_ports(&self, skip: bool) {
        self.inner.lock().unwrap().skip_ports = skip;
    }

    pub(crate) fn fail_stop(&self, name: &str, failure: StopFailure) {
        self.inner
            .lock()
            .unwrap()
            .stop_failures
            .insert(name.to_string(), failure);
    }

    /// Fail every stop, whatever the container.
    pub(crate) fn fail_every_stop(&self, failure: StopFailure) {
        self.inner.lock().unwrap().every_stop_fails = Some(failure);
    }

    /// Register a running container created outside the service.
    pub(crate) fn insert_running(&self, name: &str) -> ContainerInfo {
        let mut inner = self.inner.lock().unwrap();
        let info = new_info(&mut inner, name, &[], ContainerStatus::Running);
        inner.containers.insert(
            name.to_string(),
            FakeContainer {
                info: info.clone(),
                auto_remove: false,
            },
        );
        info
    }

    pub(crate) fn set_status(&self, name: &str, status: ContainerStatus) {
        if let Some(c) = self.inner.lock().unwrap().containers.get_mut(name) {
            c.info.status = status;
        }
    }

    pub(crate) fn runs(&self) -> Vec<RunSpec> {
        self.inner.lock().unwrap().runs.clone()
    }

    pub(crate) fn starts(&self) -> Vec<String> {
        self.inner.lock().unwrap().starts.clone()
    }

    pub(crate) fn stops(&self) -> Vec<String> {
        self.inner.lock().unwrap().stops.clone()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.inner.lock().unwrap().containers.contains_key(name)
    }

    pub(crate) fn status(&self, name: &str) -> Option<ContainerStatus> {
        self.inner
            .lock()
            .unwrap()
            .containers
            .get(name)
            .map(|c| c.info.status)
    }
}

fn new_info(inner: &mut Inner, name: &str, publish: &[u16], status: ContainerStatus) -> ContainerInfo {
    inner.next_id += 1;
    let id = format!("fake{:08x}", inner.next_id);
    let host_ports = if inner.skip_ports {
        BTreeMap::new()
    } else {
        publish
            .iter()
            .enumerate()
            .map(|(i, port)| (*port, 40_000 + (inner.next_id as u16) * 10 + i as u16))
            .collect()
    };
    ContainerInfo {
        id,
        name: name.to_string(),
        status,
        host_ports,
    }
}

fn find<'a>(inner: &'a mut Inner, name_or_id: &str) -> Option<&'a mut FakeContainer> {
    inner
        .containers
        .values_mut()
        .find(|c| c.info.name == name_or_id || c.info.id == name_or_id)
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn inspect(&self, name_or_id: &str) -> Result<ContainerInfo, RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        find(&mut inner, name_or_id)
            .map(|c| c.info.clone())
            .ok_or_else(|| RuntimeError::NotFound(name_or_id.to_string()))
    }

    async fn run(&self, spec: &RunSpec) -> Result<ContainerInfo, RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.runs.push(spec.clone());
        if inner.fail_runs {
            return Err(RuntimeError::Command("image not available".to_string()));
        }
        if inner.containers.contains_key(&spec.name) {
            return Err(RuntimeError::Command(format!(
                "container name {} is already in use",
                spec.name
            )));
        }
        let info = new_info(&mut inner, &spec.name, &spec.publish, ContainerStatus::Running);
        inner.containers.insert(
            spec.name.clone(),
            FakeContainer {
                info: info.clone(),
                auto_remove: spec.auto_remove,
            },
        );
        Ok(info)
    }

    async fn start(&self, name_or_id: &str) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.starts.push(name_or_id.to_string());
        let container = find(&mut inner, name_or_id)
            .ok_or_else(|| RuntimeError::NotFound(name_or_id.to_string()))?;
        container.info.status = ContainerStatus::Running;
        Ok(())
    }

    async fn stop(&self, name_or_id: &str, grace: Duration) -> Result<(), RuntimeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.stops.push(name_or_id.to_string());
        let failure = inner
            .stop_failures
            .get(name_or_id)
            .copied()
            .or(inner.every_stop_fails);
        match failure {
            Some(StopFailure::Timeout) => {
                return Err(RuntimeError::Timeout {
                    name: name_or_id.to_string(),
                    grace,
                })
            }
            Some(StopFailure::Command) => {
                return Err(RuntimeError::Command("daemon unreachable".to_string()))
            }
            None => {}
        }

        let container = find(&mut inner, name_or_id)
            .ok_or_else(|| RuntimeError::NotFound(name_or_id.to_string()))?;
        if container.auto_remove {
            let name = container.info.name.clone();
            inner.containers.remove(&name);
        } else {
            container.info.status = ContainerStatus::Exited;
        }
        Ok(())
    }
}
