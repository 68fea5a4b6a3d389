/// Database layer for MTD synchronization
///
/// Manages the SQLite connection pool and migrations, and provides typed
/// access to the metadata, organism, role and nomenclature tables.

pub mod metadata;
pub mod models;
pub mod nomenclature;
pub mod organism;
pub mod role;

use crate::error::{SyncError, SyncResult};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

/// Database connection options
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub enable_wal: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            enable_wal: true,
        }
    }
}

/// Create a SQLite connection pool
pub async fn create_pool(path: &Path, options: DatabaseOptions) -> SyncResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(options.max_connections)
        .connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(if options.enable_wal {
                    sqlx::sqlite::SqliteJournalMode::Wal
                } else {
                    sqlx::sqlite::SqliteJournalMode::Delete
                })
                .foreign_keys(true)
                .busy_timeout(std::time::Duration::from_secs(5)),
        )
        .await
        .map_err(SyncError::Database)?;

    Ok(pool)
}

/// Run migrations
/// Migrations are embedded at compile time from ./migrations directory
pub async fn run_migrations(pool: &SqlitePool) -> SyncResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;

    Ok(())
}

/// Test database connection
pub async fn test_connection(pool: &SqlitePool) -> SyncResult<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(SyncError::Database)?;

    Ok(())
}
