//! Workspace services: directory claims, owner/guest/contributor sessions,
//! contribution merge/discard and the idle-session collector.
//!
//! Every service is a cheap clone around the shared [`Database`], the
//! container runtime and the immutable [`Settings`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::sandbox::is_within;
use time::OffsetDateTime;

use crate::database::models::ActiveSession;
use crate::database::Database;
use crate::runtime::{ContainerInfo, ContainerRuntime, RuntimeError};

pub mod claim;
pub mod contributions;
pub mod contributor;
pub mod gc;
pub mod sessions;

#[cfg(test)]
pub(crate) mod test_utils;

pub use claim::{ClaimError, ClaimService};
pub use contributions::ContributionService;
pub use contributor::{ContributionError, ContributionHandle, ContributorSessions};
pub use gc::{GarbageCollector, GcError, SweepReport};
pub use sessions::{SessionError, SessionHandle, SessionManager};

/// Mount point of the sandbox root inside owner and guest containers.
pub const GLOBAL_MOUNT: &str = "/global";
/// Mount point of the sandbox root inside contributor containers.
pub const PLAYGROUND_MOUNT: &str = "/playground";

pub type SharedRuntime = Arc<dyn ContainerRuntime>;

/// Immutable configuration shared by the workspace services.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Every user and project directory lives below this root.
    pub sandbox_root: PathBuf,
    /// Per-contribution upper/work layers live below this root.
    pub contributions_root: PathBuf,
    pub image: String,
    /// Port the interactive shell listens on inside every container.
    pub shell_port: u16,
    /// Host name used when building session urls.
    pub public_host: String,
    pub session_ttl: Duration,
    pub gc_stop_grace: Duration,
    pub rollback_stop_grace: Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("{role} root {path} must be an absolute path")]
    NotAbsolute { role: &'static str, path: PathBuf },
    #[error("contributions root {contributions} must not lie inside sandbox root {sandbox}")]
    NestedStorage {
        sandbox: PathBuf,
        contributions: PathBuf,
    },
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Settings {
    pub fn new(sandbox_root: impl Into<PathBuf>, contributions_root: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_root: sandbox_root.into(),
            contributions_root: contributions_root.into(),
            image: "chaospine:1.0.0".to_string(),
            shell_port: 7681,
            public_host: "127.0.0.1".to_string(),
            session_ttl: Duration::from_secs(300),
            gc_stop_grace: Duration::from_secs(30),
            rollback_stop_grace: Duration::from_secs(1),
        }
    }

    /// Create both roots and return settings holding their canonical form.
    ///
    /// Fails when the contributions root is the sandbox root or lies
    /// inside it, since contributors can see the whole sandbox.
    pub fn prepare(mut self) -> Result<Self, SettingsError> {
        for (role, root) in [
            ("sandbox", &mut self.sandbox_root),
            ("contributions", &mut self.contributions_root),
        ] {
            if !root.is_absolute() {
                return Err(SettingsError::NotAbsolute {
                    role,
                    path: root.clone(),
                });
            }
            std::fs::create_dir_all(&*root).map_err(|source| SettingsError::Io {
                path: root.clone(),
                source,
            })?;
            *root = root.canonicalize().map_err(|source| SettingsError::Io {
                path: root.clone(),
                source,
            })?;
        }

        if is_within(&self.sandbox_root, &self.contributions_root) {
            return Err(SettingsError::NestedStorage {
                sandbox: self.sandbox_root,
                contributions: self.contributions_root,
            });
        }
        Ok(self)
    }

    pub fn user_root(&self, username: &str) -> PathBuf {
        self.sandbox_root.join(username)
    }

    pub fn session_url(&self, host_port: u16) -> String {
        format!("http://{}:{}", self.public_host, host_port)
    }

    pub fn contribution_dir(&self, contribution_id: &str) -> PathBuf {
        self.contributions_root.join(contribution_id)
    }
}

/// Register (or re-confirm) a started container in the session registry.
pub(crate) async fn register_session(
    db: &Database,
    info: &ContainerInfo,
) -> Result<ActiveSession, sqlx::Error> {
    ActiveSession::track(&info.id, &info.name, OffsetDateTime::now_utc(), db).await
}

/// Stop a container as part of a rollback. A container that is already
/// gone counts as stopped.
pub(crate) async fn stop_for_rollback(
    runtime: &SharedRuntime,
    name: &str,
    grace: Duration,
) -> Result<(), RuntimeError> {
    match runtime.stop(name, grace).await {
        Ok(()) => {
            tracing::info!(container = %name, "stopped container during rollback");
            Ok(())
        }
        Err(RuntimeError::NotFound(_)) => Ok(()),
        Err(e) => {
            tracing::error!(container = %name, error = %e, "rollback stop failed");
            Err(e)
        }
    }
}

/// Keep container names within `[A-Za-z0-9_.-]`.
pub(crate) fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
