//! SQLite store for users, claimed directories, contributions and the
//! session registry.
//!
//! Uniqueness constraints in this schema are the only race arbiter the
//! service relies on: `users.username`, `directories.path`,
//! `contributions.upperdir_path`, `active_sessions.container_id` and
//! `active_sessions.container_name`.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use time::OffsetDateTime;
use url::Url;

pub mod models;
pub mod types;

pub use types::InsertOutcome;

/// Database connection pool shared by every component.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl std::ops::Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("invalid database url {0}")]
    InvalidUrl(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),
}

impl Database {
    /// Connect to the database at `url` and create the schema if needed.
    ///
    /// `sqlite::memory:` urls get a single long-lived connection so every
    /// caller sees the same in-memory database.
    pub async fn connect(url: &Url) -> Result<Self, DatabaseSetupError> {
        let options = SqliteConnectOptions::from_str(url.as_str())
            .map_err(|_| DatabaseSetupError::InvalidUrl(url.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = url.as_str().contains(":memory:");
        let pool = if in_memory {
            single_connection_pool()
        } else {
            SqlitePoolOptions::new().max_connections(5)
        }
        .connect_with(options)
        .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        tracing::info!(url = %url, "database ready");
        Ok(db)
    }

    /// A fresh private in-memory database.
    pub async fn in_memory() -> Result<Self, DatabaseSetupError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);
        let pool = single_connection_pool().connect_with(options).await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS directories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL UNIQUE,
                owner_id INTEGER NOT NULL REFERENCES users(id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_directories_owner ON directories(owner_id)",
            r#"
            CREATE TABLE IF NOT EXISTS contributions (
                id TEXT PRIMARY KEY,
                owner_directory_path TEXT NOT NULL,
                upperdir_path TEXT NOT NULL UNIQUE,
                directory_id INTEGER NOT NULL REFERENCES directories(id) ON DELETE CASCADE,
                contributor_username TEXT NOT NULL,
                container_name TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_contributions_directory ON contributions(directory_id)",
            r#"
            CREATE TABLE IF NOT EXISTS active_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                container_id TEXT NOT NULL UNIQUE,
                container_name TEXT NOT NULL UNIQUE,
                last_active INTEGER NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_active_sessions_last_active ON active_sessions(last_active)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn single_connection_pool() -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
}

/// Timestamps are stored as integer unix milliseconds so range queries
/// compare numerically.
pub(crate) fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_unix_millis(millis: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
