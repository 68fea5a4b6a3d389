/// Application context and dependency wiring
use crate::{config::SyncConfig, db, error::SyncResult, sync::SyncService};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared services of the CLI and the trigger server
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<SyncConfig>,
    pub db: SqlitePool,
    pub sync: Arc<SyncService>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;

        let db = db::create_pool(&config.storage.database_path, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        Self::with_pool(config, db)
    }

    /// Build the context around an existing, migrated pool
    pub fn with_pool(config: SyncConfig, db: SqlitePool) -> SyncResult<Self> {
        let sync = Arc::new(SyncService::from_config(&config, db.clone())?);

        Ok(Self {
            config: Arc::new(config),
            db,
            sync,
        })
    }
}
