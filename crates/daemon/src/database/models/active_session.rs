use serde::Serialize;
use sqlx::{Row, SqliteExecutor};
use time::OffsetDateTime;

use crate::database::{from_unix_millis, unix_millis, Database};

/// Registry entry for a container the service started or confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSession {
    pub id: i64,
    pub container_id: String,
    pub container_name: String,
    pub last_active: OffsetDateTime,
}

impl ActiveSession {
    /// Register a container, or mark an existing registration active.
    ///
    /// At most one row exists per container id. A row that still carries
    /// this container name for a different (since replaced) container is
    /// dropped first.
    pub async fn track(
        container_id: &str,
        container_name: &str,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<ActiveSession, sqlx::Error> {
        let mut tx = db.begin().await?;

        sqlx::query("DELETE FROM active_sessions WHERE container_name = ?1 AND container_id != ?2")
            .bind(container_name)
            .bind(container_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query(
            r#"
            INSERT INTO active_sessions (container_id, container_name, last_active)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(container_id) DO UPDATE SET
                container_name = excluded.container_name,
                last_active = excluded.last_active
            RETURNING id, container_id, container_name, last_active
            "#,
        )
        .bind(container_id)
        .bind(container_name)
        .bind(unix_millis(now))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row_to_session(&row))
    }

    /// Advance `last_active` for a session. Returns `false` for unknown names.
    pub async fn touch<'e, E>(
        container_name: &str,
        now: OffsetDateTime,
        executor: E,
    ) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("UPDATE active_sessions SET last_active = ?1 WHERE container_name = ?2")
            .bind(unix_millis(now))
            .bind(container_name)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn by_name<'e, E>(
        container_name: &str,
        executor: E,
    ) -> Result<Option<ActiveSession>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let row = sqlx::query(
            "SELECT id, container_id, container_name, last_active FROM active_sessions WHERE container_name = ?1",
        )
        .bind(container_name)
        .fetch_optional(executor)
        .await?;

        Ok(row.map(|r| row_to_session(&r)))
    }

    /// Sessions whose last activity is strictly before `cutoff`.
    pub async fn idle_since<'e, E>(
        cutoff: OffsetDateTime,
        executor: E,
    ) -> Result<Vec<ActiveSession>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query(
            r#"
            SELECT id, container_id, container_name, last_active
            FROM active_sessions
            WHERE last_active < ?1
            ORDER BY last_active ASC
            "#,
        )
        .bind(unix_millis(cutoff))
        .fetch_all(executor)
        .await?;

        Ok(rows.iter().map(row_to_session).collect())
    }

    pub async fn list<'e, E>(executor: E) -> Result<Vec<ActiveSession>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let rows = sqlx::query(
            "SELECT id, container_id, container_name, last_active FROM active_sessions ORDER BY id",
        )
        .fetch_all(executor)
        .await?;

        Ok(rows.iter().map(row_to_session).collect())
    }

    pub async fn delete<'e, E>(id: i64, executor: E) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query("DELETE FROM active_sessions WHERE id = ?1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> ActiveSession {
    ActiveSession {
        id: row.get("id"),
        container_id: row.get("container_id"),
        container_name: row.get("container_name"),
        last_active: from_unix_millis(row.get("last_active")),
    }
}
