//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for users and photo metadata; image bytes
//! live in the media store.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Schema version written by the newest migration below.
pub const SCHEMA_VERSION: i64 = 2;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
///
/// Each step is applied once, in order, and bumps `meta.schema_version`.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 0
        );

        INSERT OR IGNORE INTO meta (id, schema_version) VALUES (1, 0);
        "#,
    )
    .execute(pool)
    .await?;

    let current: i64 = sqlx::query_scalar("SELECT schema_version FROM meta WHERE id = 1")
        .fetch_one(pool)
        .await?;

    if current < 1 {
        tracing::info!("Applying migration 1: users");
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                avatar TEXT,
                refresh_token TEXT,
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE meta SET schema_version = 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    if current < 2 {
        tracing::info!("Applying migration 2: photos");
        let mut tx = pool.begin().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS photos (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                url TEXT NOT NULL,
                public_id TEXT NOT NULL,
                description TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_photos_owner_id ON photos(owner_id);
            CREATE INDEX IF NOT EXISTS idx_photos_created_at ON photos(created_at);
            "#,
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE meta SET schema_version = 2 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    tracing::debug!(schema_version = SCHEMA_VERSION, "Database schema up to date");
    Ok(())
}
