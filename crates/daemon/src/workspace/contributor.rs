use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::layers::{remove_layer_tree, LayerError};
use common::overlay::{OverlayError, OverlayMount};
use common::sandbox::{confine_existing, resolve_strict, SandboxError};
use serde::{Deserialize, Serialize};

use crate::database::models::{Contribution, Directory, NewContribution};
use crate::database::{Database, InsertOutcome};
use crate::runtime::{MountSpec, RunSpec, RuntimeError};

use super::{
    register_session, sanitize_name, stop_for_rollback, Settings, SharedRuntime, GLOBAL_MOUNT,
    PLAYGROUND_MOUNT,
};

/// Hex characters in a contribution id.
const CONTRIBUTION_ID_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum ContributionError {
    #[error("{0} cannot contribute to their own project")]
    SelfContribution(String),
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("contribution {0} not found")]
    NotFound(String),
    #[error("invalid project path: {0}")]
    Path(#[from] SandboxError),
    #[error("project directory {0} does not exist")]
    ProjectMissing(PathBuf),
    #[error("contribution storage {0} is already in use")]
    Conflict(PathBuf),
    #[error("contribution storage {0} is missing")]
    StorageMissing(PathBuf),
    #[error("invalid overlay: {0}")]
    Overlay(#[from] OverlayError),
    #[error("failed to create contributor session: {0}")]
    Creation(#[source] RuntimeError),
    #[error("container runtime error: {0}")]
    Runtime(#[source] RuntimeError),
    #[error("container {0} has no published shell port")]
    PortUnavailable(String),
    #[error("failed to apply contribution: {0}")]
    Layer(#[from] LayerError),
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{cause}; rollback incomplete for contribution {id} (container {container})")]
    RollbackIncomplete {
        id: String,
        container: String,
        #[source]
        cause: Box<ContributionError>,
    },
}

/// Returned to a contributor once their overlay container is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionHandle {
    pub session_url: String,
    pub contribution_id: String,
    pub container_name: String,
}

/// Starts overlay-backed containers on top of another user's project.
#[derive(Clone)]
pub struct ContributorSessions {
    db: Database,
    runtime: SharedRuntime,
    settings: Arc<Settings>,
}

impl ContributorSessions {
    pub fn new(db: Database, runtime: SharedRuntime, settings: Arc<Settings>) -> Self {
        Self {
            db,
            runtime,
            settings,
        }
    }

    /// Open a contribution against `directory`, owned by `owner`.
    ///
    /// The contribution row is committed before the container is created so
    /// a failed start always has a row to compensate. The layers of a failed
    /// start stay on disk for inspection.
    #[tracing::instrument(skip(self, directory), fields(directory = %directory.path))]
    pub async fn create_contributor_session(
        &self,
        owner: &str,
        contributor: &str,
        project_name: &str,
        directory: &Directory,
    ) -> Result<ContributionHandle, ContributionError> {
        if owner == contributor {
            return Err(ContributionError::SelfContribution(contributor.to_string()));
        }

        let owner_root = resolve_strict(&self.settings.sandbox_root, owner)?;
        let lower = resolve_strict(&owner_root, project_name)?;
        confine_existing(&self.settings.sandbox_root, &lower)?;
        if !lower.is_dir() {
            return Err(ContributionError::ProjectMissing(lower));
        }
        let project = lower
            .strip_prefix(&owner_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(project_name));

        let id = uuid::Uuid::new_v4().simple().to_string()[..CONTRIBUTION_ID_LEN].to_string();
        let storage = self.settings.contribution_dir(&id);
        let upper = storage.join("upper");
        let work = storage.join("work");
        let destination = PathBuf::from(GLOBAL_MOUNT).join(owner).join(&project);
        let overlay = OverlayMount::new(&lower, &upper, &work, destination)?;
        let container_name = sanitize_name(&format!(
            "contrib_{contributor}_for_{owner}_{}_{id}",
            project.display()
        ));

        match std::fs::create_dir(&storage) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(ContributionError::Conflict(upper));
            }
            Err(source) => {
                return Err(ContributionError::Filesystem {
                    path: storage,
                    source,
                })
            }
        }

        let new = NewContribution {
            id: &id,
            owner_directory_path: &lower,
            upperdir_path: &upper,
            directory_id: directory.id,
            contributor_username: contributor,
            container_name: &container_name,
        };
        let recorded = match create_layers(&upper, &work) {
            Ok(()) => Contribution::create(&new, &*self.db)
                .await
                .map_err(ContributionError::from)
                .and_then(|outcome| match outcome {
                    InsertOutcome::Created(_) => Ok(()),
                    InsertOutcome::Conflict => Err(ContributionError::Conflict(upper.clone())),
                }),
            Err(e) => Err(e),
        };
        if let Err(e) = recorded {
            self.drop_storage(&storage);
            return Err(e);
        }

        let spec = RunSpec::new(&self.settings.image, &container_name)
            .mount(MountSpec::Overlay(overlay))
            .mount(MountSpec::Bind {
                source: self.settings.sandbox_root.clone(),
                target: PathBuf::from(PLAYGROUND_MOUNT),
                read_only: true,
            })
            .publish(self.settings.shell_port)
            .interactive()
            .auto_remove();

        let info = match self.runtime.run(&spec).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(
                    contribution = %id,
                    storage = %storage.display(),
                    error = %e,
                    "contributor container failed to start; layers kept"
                );
                let forgotten = self.forget(&id).await;
                return Err(incomplete_unless(
                    forgotten,
                    &id,
                    &container_name,
                    ContributionError::Creation(e),
                ));
            }
        };

        let session_url = match info.host_port(self.settings.shell_port) {
            Some(port) => Ok(self.settings.session_url(port)),
            None => Err(ContributionError::PortUnavailable(container_name.clone())),
        };
        let registered = match session_url {
            Ok(url) => register_session(&self.db, &info)
                .await
                .map(|_| url)
                .map_err(ContributionError::from),
            Err(e) => Err(e),
        };

        match registered {
            Ok(session_url) => {
                tracing::info!(contribution = %id, container = %container_name, "contributor session ready");
                Ok(ContributionHandle {
                    session_url,
                    contribution_id: id,
                    container_name,
                })
            }
            Err(e) => {
                let stopped = stop_for_rollback(
                    &self.runtime,
                    &container_name,
                    self.settings.rollback_stop_grace,
                )
                .await
                .is_ok();
                let forgotten = self.forget(&id).await;
                Err(incomplete_unless(stopped && forgotten, &id, &container_name, e))
            }
        }
    }

    /// Delete the row of a failed start. Returns whether it is gone.
    async fn forget(&self, id: &str) -> bool {
        match Contribution::delete(id, &*self.db).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(contribution = %id, error = %e, "failed to remove contribution row");
                false
            }
        }
    }

    fn drop_storage(&self, storage: &Path) {
        if let Err(e) = remove_layer_tree(&self.settings.contributions_root, storage) {
            tracing::error!(storage = %storage.display(), error = %e, "failed to remove contribution storage");
        }
    }
}

fn create_layers(upper: &Path, work: &Path) -> Result<(), ContributionError> {
    for layer in [upper, work] {
        std::fs::create_dir(layer).map_err(|source| ContributionError::Filesystem {
            path: layer.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn incomplete_unless(
    complete: bool,
    id: &str,
    container: &str,
    cause: ContributionError,
) -> ContributionError {
    if complete {
        cause
    } else {
        ContributionError::RollbackIncomplete {
            id: id.to_string(),
            container: container.to_string(),
            cause: Box::new(cause),
        }
    }
}
