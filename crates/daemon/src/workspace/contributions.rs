use std::path::PathBuf;
use std::sync::Arc;

use common::layers::{apply_upper_layer, remove_layer_tree, LayerError, MergeStats};
use common::sandbox::{is_within, SandboxError};

use crate::database::models::{Contribution, ContributionSummary, User};
use crate::database::Database;
use crate::runtime::RuntimeError;

use super::{ContributionError, Settings, SharedRuntime};

/// Applies or throws away the upper layer of a finished contribution.
#[derive(Clone)]
pub struct ContributionService {
    db: Database,
    runtime: SharedRuntime,
    settings: Arc<Settings>,
}

impl ContributionService {
    pub fn new(db: Database, runtime: SharedRuntime, settings: Arc<Settings>) -> Self {
        Self {
            db,
            runtime,
            settings,
        }
    }

    /// Copy the contribution's upper layer onto the owner's project, then
    /// drop its storage and its row. Upper layer entries win every conflict.
    #[tracing::instrument(skip(self))]
    pub async fn merge(&self, contribution_id: &str) -> Result<MergeStats, ContributionError> {
        let contribution = self.find(contribution_id).await?;
        self.quiesce(&contribution).await?;

        let upper = PathBuf::from(&contribution.upperdir_path);
        let target = PathBuf::from(&contribution.owner_directory_path);
        if !is_within(&self.settings.sandbox_root, &target) {
            return Err(ContributionError::Path(SandboxError::Traversal {
                root: self.settings.sandbox_root.clone(),
                path: target.display().to_string(),
            }));
        }

        let stats = apply_upper_layer(&upper, &target).map_err(|e| match e {
            LayerError::UpperMissing(path) => ContributionError::StorageMissing(path),
            LayerError::TargetMissing(path) => ContributionError::ProjectMissing(path),
            other => ContributionError::Layer(other),
        })?;

        self.remove_storage(&contribution)?;
        Contribution::delete(contribution_id, &*self.db).await?;
        tracing::info!(
            contribution = %contribution_id,
            project = %target.display(),
            files = stats.files,
            removed = stats.removed,
            "contribution merged"
        );
        Ok(stats)
    }

    /// Drop a contribution without touching the owner's project.
    #[tracing::instrument(skip(self))]
    pub async fn discard(&self, contribution_id: &str) -> Result<(), ContributionError> {
        let contribution = self.find(contribution_id).await?;
        self.quiesce(&contribution).await?;
        self.remove_storage(&contribution)?;
        Contribution::delete(contribution_id, &*self.db).await?;
        tracing::info!(contribution = %contribution_id, "contribution discarded");
        Ok(())
    }

    pub async fn list_for_owner(
        &self,
        username: &str,
    ) -> Result<Vec<ContributionSummary>, ContributionError> {
        let owner = User::by_username(username, &*self.db)
            .await?
            .ok_or_else(|| ContributionError::UserNotFound(username.to_string()))?;
        Ok(Contribution::for_owner(owner.id, &*self.db).await?)
    }

    async fn find(&self, contribution_id: &str) -> Result<Contribution, ContributionError> {
        Contribution::get(contribution_id, &*self.db)
            .await?
            .ok_or_else(|| ContributionError::NotFound(contribution_id.to_string()))
    }

    /// Stop the contributor's container so the upper layer stops changing.
    async fn quiesce(&self, contribution: &Contribution) -> Result<(), ContributionError> {
        match self
            .runtime
            .stop(&contribution.container_name, self.settings.rollback_stop_grace)
            .await
        {
            Ok(()) | Err(RuntimeError::NotFound(_)) => Ok(()),
            Err(e) => Err(ContributionError::Runtime(e)),
        }
    }

    fn remove_storage(&self, contribution: &Contribution) -> Result<(), ContributionError> {
        let root = &self.settings.contributions_root;
        let storage = contribution
            .storage_dir()
            .unwrap_or_else(|| PathBuf::from(&contribution.upperdir_path));
        if !remove_layer_tree(root, &storage)? {
            tracing::debug!(storage = %storage.display(), "contribution storage already gone");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::workspace::test_utils::Fixture;
    use crate::workspace::ContributionHandle;

    async fn open(fx: &Fixture) -> (ContributionHandle, PathBuf) {
        let dir = fx.claimed_project().await;
        let handle = fx
            .contributors()
            .create_contributor_session("alice", "bob", "web", &dir)
            .await
            .unwrap();
        (handle, dir.path_buf())
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    out.push((path.clone(), std::fs::read(&path).unwrap()));
                }
            }
        }
        out.sort();
        out
    }

    #[tokio::test]
    async fn test_discard_leaves_owner_untouched() {
        let fx = Fixture::new().await;
        let (handle, project) = open(&fx).await;
        let before = snapshot(&project);
        let storage = fx.settings.contribution_dir(&handle.contribution_id);
        std::fs::write(storage.join("upper/index.html"), "contributor edit").unwrap();

        fx.contributions().discard(&handle.contribution_id).await.unwrap();

        assert_eq!(snapshot(&project), before);
        assert!(!storage.exists());
        assert!(Contribution::get(&handle.contribution_id, &*fx.db)
            .await
            .unwrap()
            .is_none());
        assert!(fx.fake.stops().contains(&handle.container_name));

        let err = fx.contributions().discard(&handle.contribution_id).await.unwrap_err();
        assert!(matches!(err, ContributionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_merge_applies_upper_layer() {
        let fx = Fixture::new().await;
        let (handle, project) = open(&fx).await;
        std::fs::write(project.join("README"), "owner").unwrap();
        let upper = fx.settings.contribution_dir(&handle.contribution_id).join("upper");
        std::fs::write(upper.join("index.html"), "v2").unwrap();
        std::fs::create_dir_all(upper.join("assets")).unwrap();
        std::fs::write(upper.join("assets/app.css"), "body {}").unwrap();

        let stats = fx.contributions().merge(&handle.contribution_id).await.unwrap();
        assert_eq!(stats.files, 2);

        assert_eq!(std::fs::read_to_string(project.join("index.html")).unwrap(), "v2");
        assert_eq!(std::fs::read_to_string(project.join("README")).unwrap(), "owner");
        assert_eq!(
            std::fs::read_to_string(project.join("assets/app.css")).unwrap(),
            "body {}"
        );
        assert!(!fx.settings.contribution_dir(&handle.contribution_id).exists());

        let err = fx.contributions().merge(&handle.contribution_id).await.unwrap_err();
        assert!(matches!(err, ContributionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_merge_without_storage_keeps_row() {
        let fx = Fixture::new().await;
        let (handle, _) = open(&fx).await;
        let storage = fx.settings.contribution_dir(&handle.contribution_id);
        std::fs::remove_dir_all(&storage).unwrap();

        let err = fx.contributions().merge(&handle.contribution_id).await.unwrap_err();
        assert!(matches!(err, ContributionError::StorageMissing(_)));
        assert!(Contribution::get(&handle.contribution_id, &*fx.db)
            .await
            .unwrap()
            .is_some());

        // Discard still cleans up.
        fx.contributions().discard(&handle.contribution_id).await.unwrap();
        assert!(Contribution::get(&handle.contribution_id, &*fx.db)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_for_owner() {
        let fx = Fixture::new().await;
        let (handle, project) = open(&fx).await;

        let listed = fx.contributions().list_for_owner("alice").await.unwrap();
        assert_eq!(
            listed,
            vec![ContributionSummary {
                contribution_id: handle.contribution_id,
                project_path: project.display().to_string(),
            }]
        );
        assert!(fx.contributions().list_for_owner("bob").await.unwrap().is_empty());
        assert!(matches!(
            fx.contributions().list_for_owner("carol").await,
            Err(ContributionError::UserNotFound(_))
        ));
    }
}
