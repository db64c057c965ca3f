use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::sandbox::{confine_existing, resolve_strict, SandboxError};

use crate::database::models::{Directory, User};
use crate::database::{Database, InsertOutcome};

use super::Settings;

#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("path {0:?} escapes the user's directory")]
    Traversal(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("{0} is already claimed")]
    AlreadyClaimed(PathBuf),
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<SandboxError> for ClaimError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Traversal { path, .. } => ClaimError::Traversal(path),
            SandboxError::Invalid(reason) => ClaimError::InvalidPath(reason),
            SandboxError::Io { path, source } => ClaimError::Filesystem { path, source },
        }
    }
}

/// Reserves directories under a user's subtree of the sandbox.
#[derive(Clone)]
pub struct ClaimService {
    db: Database,
    settings: Arc<Settings>,
}

impl ClaimService {
    pub fn new(db: Database, settings: Arc<Settings>) -> Self {
        Self { db, settings }
    }

    /// Claim `relative_path` inside `username`'s subtree.
    ///
    /// Rejected paths leave the filesystem untouched. A path that already
    /// has a row is refused before anything is created. Otherwise the
    /// directory (and any missing ancestor) is created first and the unique
    /// `path` column decides between concurrent claimants. The loser of
    /// that race keeps its hands off the directory, which now belongs to
    /// the winner; a store error removes whatever this call created while
    /// it is still empty.
    #[tracing::instrument(skip(self))]
    pub async fn claim(&self, username: &str, relative_path: &str) -> Result<Directory, ClaimError> {
        let user = User::by_username(username, &*self.db)
            .await?
            .ok_or_else(|| ClaimError::UserNotFound(username.to_string()))?;

        let sandbox = &self.settings.sandbox_root;
        let home = resolve_strict(sandbox, username)?;
        let target = resolve_strict(&home, relative_path)?;
        // Nothing below a missing home can be a symlink.
        let base = if home.symlink_metadata().is_ok() { &home } else { sandbox };
        confine_existing(base, &target)?;

        if Directory::by_path(&target, &*self.db).await?.is_some() {
            return Err(ClaimError::AlreadyClaimed(target));
        }

        let created = create_missing(sandbox, &target)?;
        match self.insert(&target, user.id).await {
            Ok(InsertOutcome::Created(directory)) => {
                restrict_to_account(&target, username);
                tracing::info!(path = %target.display(), owner = %username, "directory claimed");
                Ok(directory)
            }
            Ok(InsertOutcome::Conflict) => {
                tracing::debug!(path = %target.display(), "lost claim race");
                Err(ClaimError::AlreadyClaimed(target))
            }
            Err(e) => {
                remove_created(&created);
                Err(ClaimError::Database(e))
            }
        }
    }

    async fn insert(&self, path: &Path, owner_id: i64) -> Result<InsertOutcome<Directory>, sqlx::Error> {
        let mut tx = self.db.begin().await?;
        let outcome = Directory::create(path, owner_id, &mut *tx).await?;
        match outcome {
            InsertOutcome::Created(_) => tx.commit().await?,
            InsertOutcome::Conflict => tx.rollback().await?,
        }
        Ok(outcome)
    }
}

fn io_at(path: &Path) -> impl FnOnce(io::Error) -> ClaimError + '_ {
    move |source| ClaimError::Filesystem {
        path: path.to_path_buf(),
        source,
    }
}

/// Create `target` and its missing ancestors below `root` one level at a
/// time. Returns the directories this call created, outermost first.
fn create_missing(root: &Path, target: &Path) -> Result<Vec<PathBuf>, ClaimError> {
    let mut missing: Vec<&Path> = target
        .ancestors()
        .take_while(|dir| *dir != root && dir.symlink_metadata().is_err())
        .collect();
    missing.reverse();

    let mut created = Vec::with_capacity(missing.len());
    for dir in missing {
        match std::fs::create_dir(dir) {
            Ok(()) => created.push(dir.to_path_buf()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => {}
            Err(e) => {
                remove_created(&created);
                return Err(io_at(dir)(e));
            }
        }
    }

    if !target.is_dir() {
        return Err(ClaimError::InvalidPath(format!(
            "{} exists and is not a directory",
            target.display()
        )));
    }
    Ok(created)
}

/// Undo [`create_missing`], innermost first. `remove_dir` refuses
/// non-empty directories, and everything above one of those stays too.
fn remove_created(created: &[PathBuf]) {
    for dir in created.iter().rev() {
        if let Err(e) = std::fs::remove_dir(dir) {
            tracing::warn!(path = %dir.display(), error = %e, "left claimed directory in place");
            return;
        }
    }
}

/// Hand the directory to the system account and group of the same name,
/// if both exist.
#[cfg(unix)]
fn restrict_to_account(path: &Path, username: &str) {
    use nix::unistd::{chown, Group, User as Account};
    use std::os::unix::fs::PermissionsExt;

    let Some(account) = Account::from_name(username).ok().flatten() else {
        return;
    };
    let Some(group) = Group::from_name(username).ok().flatten() else {
        return;
    };
    if let Err(e) = chown(path, Some(account.uid), Some(group.gid)) {
        tracing::warn!(path = %path.display(), error = %e, "chown failed");
        return;
    }
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)) {
        tracing::warn!(path = %path.display(), error = %e, "chmod failed");
    }
}

#[cfg(not(unix))]
fn restrict_to_account(_path: &Path, _username: &str) {}
