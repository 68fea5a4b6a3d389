/// MTD synchronization
///
/// Entry points fetching records from the metadata service and applying
/// them to the local store through the [`SyncEngine`].

pub mod actors;
pub mod engine;
pub mod report;

pub use actors::{ActorResolution, ActorResolver, AssociationTarget};
pub use engine::SyncEngine;
pub use report::{EntityKind, SyncReport};

use crate::{
    client::MetadataClient,
    config::SyncConfig,
    db::metadata,
    error::{SyncError, SyncResult},
};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

/// Instance-wide and user-scoped synchronization
#[derive(Clone)]
pub struct SyncService {
    pool: SqlitePool,
    client: MetadataClient,
    engine: SyncEngine,
    id_instance: Option<u32>,
}

impl SyncService {
    pub fn new(pool: SqlitePool, client: MetadataClient, engine: SyncEngine, id_instance: Option<u32>) -> Self {
        Self {
            pool,
            client,
            engine,
            id_instance,
        }
    }

    pub fn from_config(config: &SyncConfig, pool: SqlitePool) -> SyncResult<Self> {
        Ok(Self::new(
            pool,
            MetadataClient::new(&config.metadata)?,
            SyncEngine::from_config(config)?,
            config.metadata.id_instance_filter,
        ))
    }

    /// Synchronize every framework and dataset of the configured instance
    pub async fn sync_all(&self) -> SyncResult<SyncReport> {
        let id_instance = self.id_instance.ok_or_else(|| {
            SyncError::Validation(
                "MTD_ID_INSTANCE_FILTER must be set for an instance-wide sync".to_string(),
            )
        })?;

        info!("MTD sync of instance {}: start", id_instance);
        let af_list = self.client.get_af_list(id_instance).await?;
        let ds_list = self.client.get_ds_list(id_instance).await?;

        let report = self.engine.process(&self.pool, &af_list, &ds_list, None).await?;
        info!("MTD sync of instance {}: finished", id_instance);

        Ok(report)
    }

    /// Synchronize the metadata of one user
    ///
    /// With `id_af`, only that (locally known) framework and its datasets
    /// are synchronized.
    pub async fn sync_for_user(&self, id_role: i64, id_af: Option<i64>) -> SyncResult<SyncReport> {
        info!("MTD sync of user {}: start", id_role);
        let ds_list = self.client.get_ds_user_list(id_role).await?;

        let (af_list, ds_list) = match id_af {
            None => (self.client.get_af_user_list(id_role).await?, ds_list),
            Some(id_af) => {
                let uuid = self.framework_uuid(id_af).await?;
                let af_list = self.client.get_single_af(uuid).await?.into_iter().collect();
                let ds_list = ds_list
                    .into_iter()
                    .filter(|ds| ds.framework_uuid == Some(uuid))
                    .collect();
                (af_list, ds_list)
            }
        };

        let report = self
            .engine
            .process(&self.pool, &af_list, &ds_list, Some(id_role))
            .await?;
        info!("MTD sync of user {}: finished", id_role);

        Ok(report)
    }

    async fn framework_uuid(&self, id_af: i64) -> SyncResult<Uuid> {
        let mut conn = self.pool.acquire().await?;
        let framework = metadata::get_framework(&mut conn, id_af)
            .await?
            .ok_or_else(|| {
                SyncError::NotFound(format!("Acquisition framework {} not found", id_af))
            })?;

        let raw = framework.unique_acquisition_framework_id;
        Uuid::parse_str(&raw).map_err(|e| {
            SyncError::Inconsistency(format!(
                "Acquisition framework {} has an invalid UUID {:?}: {}",
                id_af, raw, e
            ))
        })
    }
}
