use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};

use crate::database::InsertOutcome;

/// A claimed project directory. `path` is absolute and lies inside the
/// owner's subtree of the sandbox root.
#[derive(FromRow, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directory {
    pub id: i64,
    pub path: String,
    pub owner_id: i64,
}

impl Directory {
    pub fn path_buf(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }

    pub async fn create<'e, E>(
        path: &Path,
        owner_id: i64,
        executor: E,
    ) -> Result<InsertOutcome<Directory>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query_as::<_, Directory>(
            r#"
            INSERT INTO directories (path, owner_id)
            VALUES (?1, ?2)
            RETURNING id, path, owner_id
            "#,
        )
        .bind(path.to_string_lossy().into_owned())
        .bind(owner_id)
        .fetch_one(executor)
        .await;

        InsertOutcome::from_query(result)
    }

    pub async fn by_path<'e, E>(path: &Path, executor: E) -> Result<Option<Directory>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Directory>("SELECT id, path, owner_id FROM directories WHERE path = ?1")
            .bind(path.to_string_lossy().into_owned())
            .fetch_optional(executor)
            .await
    }

    pub async fn owned_by<'e, E>(owner_id: i64, executor: E) -> Result<Vec<Directory>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Directory>(
            "SELECT id, path, owner_id FROM directories WHERE owner_id = ?1 ORDER BY path",
        )
        .bind(owner_id)
        .fetch_all(executor)
        .await
    }
}
