use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};

use crate::database::InsertOutcome;

const MAX_USERNAME_LEN: usize = 64;

#[derive(FromRow, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

impl User {
    pub async fn create<'e, E>(username: &str, executor: E) -> Result<InsertOutcome<User>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username)
            VALUES (?1)
            RETURNING id, username
            "#,
        )
        .bind(username)
        .fetch_one(executor)
        .await;

        InsertOutcome::from_query(result)
    }

    pub async fn by_username<'e, E>(username: &str, executor: E) -> Result<Option<User>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, User>("SELECT id, username FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(executor)
            .await
    }

    pub async fn by_id<'e, E>(id: i64, executor: E) -> Result<Option<User>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, User>("SELECT id, username FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(executor)
            .await
    }
}

/// Usernames end up in host paths, volume names and container names.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.len() <= MAX_USERNAME_LEN
        && !username.starts_with(['.', '-'])
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
