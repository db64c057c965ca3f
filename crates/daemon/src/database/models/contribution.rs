use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteExecutor};
use time::OffsetDateTime;

use crate::database::{from_unix_millis, unix_millis, InsertOutcome};

/// An in-flight copy-on-write edit of someone else's project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contribution {
    pub id: String,
    pub owner_directory_path: String,
    pub upperdir_path: String,
    pub directory_id: i64,
    pub contributor_username: String,
    pub container_name: String,
    pub created_at: OffsetDateTime,
}

/// Fields needed to record a new contribution.
#[derive(Debug, Clone)]
pub struct NewContribution<'a> {
    pub id: &'a str,
    pub owner_directory_path: &'a Path,
    pub upperdir_path: &'a Path,
    pub directory_id: i64,
    pub contributor_username: &'a str,
    pub container_name: &'a str,
}

/// Listing entry shown to a project owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionSummary {
    pub contribution_id: String,
    pub project_path: String,
}

const COLUMNS: &str = "id, owner_directory_path, upperdir_path, directory_id, \
                       contributor_username, container_name, created_at";

impl Contribution {
    /// Directory holding this contribution's upper and work layers.
    pub fn storage_dir(&self) -> Option<PathBuf> {
        Path::new(&self.upperdir_path).parent().map(Path::to_path_buf)
    }

    pub async fn create<'e, E>(
        new: &NewContribution<'_>,
        executor: E,
    ) -> Result<InsertOutcome<Contribution>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let created_at = OffsetDateTime::now_utc();
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO contributions ({COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(new.id)
        .bind(new.owner_directory_path.to_string_lossy().into_owned())
        .bind(new.upperdir_path.to_string_lossy().into_owned())
        .bind(new.directory_id)
        .bind(new.contributor_username)
        .bind(new.container_name)
        .bind(unix_millis(created_at))
        .fetch_one(executor)
        .await
        .map(|row| row_to_contribution(&row));

        InsertOutcome::from_query(result)
    }

    pub async fn get<'e, E>(id: &str, executor: E) -> Result<Option<Contribution>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM contributions WHERE id = ?1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row.map(|r| row_to_contribution(&r)))
    }

    pub async fn delete<'e, E>(id: &str, executor: E) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM contributions WHERE id = ?1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Contributions made against any directory owned by `owner_id`.
    pub async fn for_owner<'e, E>(
        owner_id: i64,
        executor: E,
    ) -> Result<Vec<ContributionSummary>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query(
            r#"
            SELECT c.id AS contribution_id, d.path AS project_path
            FROM contributions c
            JOIN directories d ON d.id = c.directory_id
            WHERE d.owner_id = ?1
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(owner_id)
        .fetch_all(executor)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ContributionSummary {
                contribution_id: row.get("contribution_id"),
                project_path: row.get("project_path"),
            })
            .collect())
    }
}

fn row_to_contribution(row: &sqlx::sqlite::SqliteRow) -> Contribution {
    Contribution {
        id: row.get("id"),
        owner_directory_path: row.get("owner_directory_path"),
        upperdir_path: row.get("upperdir_path"),
        directory_id: row.get("directory_id"),
        contributor_username: row.get("contributor_username"),
        container_name: row.get("container_name"),
        created_at: from_unix_millis(row.get("created_at")),
    }
}
