use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::database::models::{is_valid_username, ActiveSession};
use crate::database::Database;
use crate::runtime::{ContainerInfo, MountSpec, RunSpec, RuntimeError};

use super::{register_session, stop_for_rollback, Settings, SharedRuntime, GLOBAL_MOUNT};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid username {0:?}")]
    InvalidUsername(String),
    #[error("failed to create session: {0}")]
    Creation(#[from] RuntimeError),
    #[error("container {0} has no published shell port")]
    PortUnavailable(String),
    #[error("failed to prepare {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session registry error: {0}")]
    Registry(#[from] sqlx::Error),
    #[error("{cause}; rollback left container {container} running")]
    RollbackIncomplete {
        container: String,
        #[source]
        cause: Box<SessionError>,
    },
}

/// Where a client can reach a session's shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub session_url: String,
    pub container_name: String,
}

/// Long-lived owner containers and throwaway guest containers.
#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    runtime: SharedRuntime,
    settings: Arc<Settings>,
}

pub fn owner_container_name(username: &str) -> String {
    format!("session_{username}")
}

impl SessionManager {
    pub fn new(db: Database, runtime: SharedRuntime, settings: Arc<Settings>) -> Self {
        Self {
            db,
            runtime,
            settings,
        }
    }

    /// Get or create `username`'s workspace container.
    ///
    /// A running container is reused as is and a stopped one is started.
    /// Either way the registry entry is confirmed.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_owner_session(&self, username: &str) -> Result<SessionHandle, SessionError> {
        if !is_valid_username(username) {
            return Err(SessionError::InvalidUsername(username.to_string()));
        }
        let name = owner_container_name(username);

        let info = match self.runtime.inspect(&name).await {
            Ok(info) if info.status.is_running() => {
                tracing::debug!(container = %name, "owner container already running");
                info
            }
            Ok(_) => {
                tracing::info!(container = %name, "starting stopped owner container");
                self.runtime.start(&name).await?;
                self.runtime.inspect(&name).await?
            }
            Err(RuntimeError::NotFound(_)) => {
                tracing::info!(container = %name, "creating owner container");
                let spec = self.owner_spec(username, &name)?;
                self.runtime.run(&spec).await?
            }
            Err(e) => return Err(e.into()),
        };

        let session_url = self.shell_url(&info)?;
        register_session(&self.db, &info).await?;
        Ok(SessionHandle {
            session_url,
            container_name: name,
        })
    }

    fn owner_spec(&self, username: &str, name: &str) -> Result<RunSpec, SessionError> {
        let sandbox = &self.settings.sandbox_root;
        let user_root = self.settings.user_root(username);
        std::fs::create_dir_all(&user_root).map_err(|source| SessionError::Filesystem {
            path: user_root.clone(),
            source,
        })?;
        let home = PathBuf::from(format!("/home/{username}"));

        Ok(RunSpec::new(&self.settings.image, name)
            .mount(MountSpec::Volume {
                name: format!("{username}_home"),
                target: home.clone(),
                read_only: false,
            })
            .mount(MountSpec::Bind {
                source: sandbox.clone(),
                target: PathBuf::from(GLOBAL_MOUNT),
                read_only: true,
            })
            .mount(MountSpec::Bind {
                source: user_root,
                target: PathBuf::from(GLOBAL_MOUNT).join(username),
                read_only: false,
            })
            .publish(self.settings.shell_port)
            .workdir(home)
            .interactive())
    }

    /// Start a brand-new anonymous container. Every call yields a new one.
    #[tracing::instrument(skip(self))]
    pub async fn create_guest_session(&self) -> Result<SessionHandle, SessionError> {
        let name = format!("guest_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let spec = RunSpec::new(&self.settings.image, &name)
            .mount(MountSpec::Bind {
                source: self.settings.sandbox_root.clone(),
                target: PathBuf::from(GLOBAL_MOUNT),
                read_only: true,
            })
            .mount(MountSpec::Tmpfs {
                target: PathBuf::from("/guest"),
            })
            .publish(self.settings.shell_port)
            .workdir("/guest")
            .interactive()
            .read_only_rootfs()
            .auto_remove();

        let info = self.runtime.run(&spec).await?;
        let registered = match self.shell_url(&info) {
            Ok(url) => register_session(&self.db, &info)
                .await
                .map(|_| url)
                .map_err(SessionError::from),
            Err(e) => Err(e),
        };

        match registered {
            Ok(session_url) => {
                tracing::info!(container = %name, "guest session ready");
                Ok(SessionHandle {
                    session_url,
                    container_name: name,
                })
            }
            Err(e) => {
                match stop_for_rollback(&self.runtime, &name, self.settings.rollback_stop_grace).await {
                    Ok(()) => Err(e),
                    Err(_) => Err(SessionError::RollbackIncomplete {
                        container: name,
                        cause: Box::new(e),
                    }),
                }
            }
        }
    }

    /// Record activity for a session. Returns `false` for unknown sessions.
    pub async fn heartbeat(&self, container_name: &str) -> Result<bool, sqlx::Error> {
        ActiveSession::touch(container_name, OffsetDateTime::now_utc(), &*self.db).await
    }

    fn shell_url(&self, info: &ContainerInfo) -> Result<String, SessionError> {
        info.host_port(self.settings.shell_port)
            .map(|port| self.settings.session_url(port))
            .ok_or_else(|| SessionError::PortUnavailable(info.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::StopFailure;
    use crate::runtime::ContainerStatus;
    use crate::workspace::test_utils::Fixture;

    #[tokio::test]
    async fn test_ensure_owner_session_is_idempotent() {
        let fx = Fixture::new().await;
        let sessions = fx.sessions();

        let first = sessions.ensure_owner_session("alice").await.unwrap();
        let second = sessions.ensure_owner_session("alice").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.container_name, "session_alice");
        assert!(first.session_url.starts_with("http://127.0.0.1:"));
        assert_eq!(fx.fake.runs().len(), 1);
        assert!(fx.fake.starts().is_empty());
        assert_eq!(ActiveSession::list(&*fx.db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_owner_container_layout() {
        let fx = Fixture::new().await;
        fx.sessions().ensure_owner_session("alice").await.unwrap();

        let spec = fx.fake.runs().remove(0);
        assert_eq!(spec.workdir, Some(PathBuf::from("/home/alice")));
        assert!(spec.tty && spec.stdin_open);
        assert!(!spec.auto_remove);
        assert_eq!(spec.publish, vec![7681]);
        assert!(spec.mounts.contains(&MountSpec::Volume {
            name: "alice_home".into(),
            target: "/home/alice".into(),
            read_only: false,
        }));
        assert!(spec.mounts.contains(&MountSpec::Bind {
            source: fx.settings.sandbox_root.clone(),
            target: "/global".into(),
            read_only: true,
        }));
        assert!(fx.settings.sandbox_root.join("alice").is_dir());
    }

    #[tokio::test]
    async fn test_stopped_owner_container_is_started() {
        let fx = Fixture::new().await;
        let sessions = fx.sessions();
        sessions.ensure_owner_session("alice").await.unwrap();
        fx.fake.set_status("session_alice", ContainerStatus::Exited);

        sessions.ensure_owner_session("alice").await.unwrap();
        assert_eq!(fx.fake.starts(), vec!["session_alice".to_string()]);
        assert_eq!(fx.fake.status("session_alice"), Some(ContainerStatus::Running));
        assert_eq!(fx.fake.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_owner_session_failure_wraps_runtime_error() {
        let fx = Fixture::new().await;
        fx.fake.fail_runs(true);
        let err = fx.sessions().ensure_owner_session("alice").await.unwrap_err();
        assert!(matches!(err, SessionError::Creation(_)));
        assert!(ActiveSession::list(&*fx.db).await.unwrap().is_empty());

        let err = fx.sessions().ensure_owner_session("../root").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidUsername(_)));
    }

    #[tokio::test]
    async fn test_guest_sessions_are_unique() {
        let fx = Fixture::new().await;
        let sessions = fx.sessions();

        let a = sessions.create_guest_session().await.unwrap();
        let b = sessions.create_guest_session().await.unwrap();
        assert_ne!(a.container_name, b.container_name);
        assert!(a.container_name.starts_with("guest_"));
        assert_eq!(a.container_name.len(), "guest_".len() + 8);

        let spec = fx.fake.runs().remove(0);
        assert!(spec.read_only_rootfs && spec.auto_remove);
        assert!(spec.mounts.contains(&MountSpec::Tmpfs {
            target: "/guest".into()
        }));
        assert_eq!(ActiveSession::list(&*fx.db).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_guest_without_port_is_stopped() {
        let fx = Fixture::new().await;
        fx.fake.skip_ports(true);

        let err = fx.sessions().create_guest_session().await.unwrap_err();
        assert!(matches!(err, SessionError::PortUnavailable(_)));
        assert_eq!(fx.fake.stops().len(), 1);
        // Auto-removed on stop.
        assert!(!fx.fake.contains(&fx.fake.stops()[0]));
        assert!(ActiveSession::list(&*fx.db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_guest_rollback_names_the_container() {
        let fx = Fixture::new().await;
        fx.fake.skip_ports(true);
        fx.fake.fail_every_stop(StopFailure::Timeout);

        let err = fx.sessions().create_guest_session().await.unwrap_err();
        let SessionError::RollbackIncomplete { container, cause } = &err else {
            panic!("expected an incomplete rollback, got {err}");
        };
        assert!(matches!(**cause, SessionError::PortUnavailable(_)));
        assert!(fx.fake.contains(container));
        assert!(err.to_string().contains(container.as_str()));
        assert!(ActiveSession::list(&*fx.db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat() {
        let fx = Fixture::new().await;
        let sessions = fx.sessions();
        let handle = sessions.ensure_owner_session("alice").await.unwrap();

        assert!(sessions.heartbeat(&handle.container_name).await.unwrap());
        assert!(!sessions.heartbeat("session_nobody").await.unwrap());
    }
}
