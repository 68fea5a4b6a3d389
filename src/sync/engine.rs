/// Synchronization engine
///
/// Upserts frameworks then datasets by UUID, provisions unknown digitizers,
/// associates actors and links new datasets to the default modules.
use crate::{
    client::{IdentityClient, RemoteUser},
    config::SyncConfig,
    db::{
        metadata::{dataset_id, framework_id},
        nomenclature::{self, NomenclatureType, UNKNOWN_DATA_ORIGIN_CODE},
    },
    error::SyncResult,
    identity::{IdentityProvider, LocalIdentityProvider, UserProvisioner},
    sync::{
        actors::{ActorResolver, AssociationTarget},
        report::{EntityKind, ProvisioningFailure, SyncReport},
    },
    xml::{DatasetRecord, FrameworkRecord},
};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Applies parsed records to the local store
#[derive(Clone)]
pub struct SyncEngine {
    provisioner: UserProvisioner,
    resolver: ActorResolver,
    module_codes: Vec<String>,
}

impl SyncEngine {
    pub fn new(
        config: &SyncConfig,
        provisioner: UserProvisioner,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            provisioner,
            resolver: ActorResolver::new(config.provisioning.orphan_actor_id, provider),
            module_codes: config.dataset_module_codes.clone(),
        }
    }

    /// Engine provisioning users through the local role tables
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        let identity_client =
            IdentityClient::new(&config.identity, config.metadata.request_timeout_secs)?;
        let provider: Arc<dyn IdentityProvider> =
            Arc::new(LocalIdentityProvider::new(config.provisioning.id_provider.clone()));
        let provisioner =
            UserProvisioner::new(config.provisioning.clone(), identity_client, provider.clone());

        Ok(Self::new(config, provisioner, provider))
    }

    /// Synchronize frameworks, commit, then synchronize datasets and commit
    ///
    /// `id_role` replaces the records' digitizer for provisioning.
    pub async fn process(
        &self,
        pool: &SqlitePool,
        af_list: &[FrameworkRecord],
        ds_list: &[DatasetRecord],
        id_role: Option<i64>,
    ) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        info!(
            "Processing {} frameworks and {} datasets",
            af_list.len(),
            ds_list.len()
        );

        // Identity lookups happen before any write transaction is opened
        let digitizers = af_list
            .iter()
            .map(|af| id_role.or(af.id_digitizer))
            .chain(ds_list.iter().map(|ds| id_role.or(ds.id_digitizer)))
            .collect::<Vec<Option<i64>>>();
        let remote_users = self
            .fetch_unknown_digitizers(pool, digitizers.into_iter(), &mut report)
            .await?;

        let mut tx = pool.begin().await?;
        for af in af_list {
            self.provision_digitizer(&mut tx, id_role.or(af.id_digitizer), &remote_users, &mut report)
                .await?;
            self.sync_af(&mut tx, af, &mut report).await?;
        }
        tx.commit().await?;

        let mut tx = pool.begin().await?;
        let origin_codes = nomenclature::list_codes(&mut tx, NomenclatureType::DataOrigin).await?;
        for ds in ds_list {
            self.provision_digitizer(&mut tx, id_role.or(ds.id_digitizer), &remote_users, &mut report)
                .await?;
            self.sync_ds(&mut tx, ds, &origin_codes, &mut report).await?;
        }
        tx.commit().await?;

        info!(
            "Frameworks: {} inserted, {} updated; datasets: {} inserted, {} updated; {} skipped",
            report.frameworks_inserted,
            report.frameworks_updated,
            report.datasets_inserted,
            report.datasets_updated,
            report.skipped.len()
        );

        Ok(report)
    }

    /// Insert or update one framework and associate its actors
    ///
    /// Returns the local id, or `None` when the framework was skipped.
    pub async fn sync_af(
        &self,
        conn: &mut SqliteConnection,
        af: &FrameworkRecord,
        report: &mut SyncReport,
    ) -> SyncResult<Option<i64>> {
        let Some(uuid) = af.uuid else {
            report.skip_entity(EntityKind::Framework, None, "missing UUID");
            return Ok(None);
        };
        let uuid = uuid.to_string();

        let existing = framework_id(conn, &uuid).await?;
        match existing {
            Some(id) => {
                debug!("Updating framework {} ({})", uuid, id);
                sqlx::query(
                    r#"
                    UPDATE t_acquisition_frameworks
                    SET acquisition_framework_name = ?1,
                        acquisition_framework_desc = ?2,
                        acquisition_framework_start_date = ?3,
                        acquisition_framework_end_date = ?4,
                        meta_create_date = ?5,
                        meta_update_date = ?6,
                        id_digitizer = ?7
                    WHERE id_acquisition_framework = ?8
                    "#,
                )
                .bind(&af.name)
                .bind(&af.description)
                .bind(af.start_date)
                .bind(af.end_date)
                .bind(af.create_date)
                .bind(af.update_date)
                .bind(af.id_digitizer)
                .bind(id)
                .execute(&mut *conn)
                .await?;
                report.frameworks_updated += 1;
            }
            None => {
                debug!("Inserting framework {}", uuid);
                sqlx::query(
                    r#"
                    INSERT INTO t_acquisition_frameworks
                        (unique_acquisition_framework_id, acquisition_framework_name,
                         acquisition_framework_desc, acquisition_framework_start_date,
                         acquisition_framework_end_date, meta_create_date, meta_update_date,
                         id_digitizer)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ON CONFLICT (unique_acquisition_framework_id) DO NOTHING
                    "#,
                )
                .bind(&uuid)
                .bind(&af.name)
                .bind(&af.description)
                .bind(af.start_date)
                .bind(af.end_date)
                .bind(af.create_date)
                .bind(af.update_date)
                .bind(af.id_digitizer)
                .execute(&mut *conn)
                .await?;
                report.frameworks_inserted += 1;
            }
        }

        let Some(id) = framework_id(conn, &uuid).await? else {
            report.skip_entity(EntityKind::Framework, af.uuid, "framework not found after upsert");
            return Ok(None);
        };

        self.resolver
            .associate_actors(conn, &af.actors, AssociationTarget::Framework(id), report)
            .await?;

        Ok(Some(id))
    }

    /// Insert or update one dataset, associate its actors and, when new,
    /// link it to the default modules
    ///
    /// Returns the local id, or `None` when the dataset was skipped.
    pub async fn sync_ds(
        &self,
        conn: &mut SqliteConnection,
        ds: &DatasetRecord,
        origin_codes: &HashSet<String>,
        report: &mut SyncReport,
    ) -> SyncResult<Option<i64>> {
        let Some(uuid) = ds.uuid else {
            report.skip_entity(EntityKind::Dataset, None, "missing UUID");
            return Ok(None);
        };

        let origin_code = ds
            .data_origin_code
            .as_deref()
            .unwrap_or(UNKNOWN_DATA_ORIGIN_CODE);
        if !origin_codes.contains(origin_code) {
            report.skip_entity(
                EntityKind::Dataset,
                ds.uuid,
                format!("unknown data origin code {:?}", origin_code),
            );
            return Ok(None);
        }

        let Some(framework_uuid) = ds.framework_uuid else {
            report.skip_entity(EntityKind::Dataset, ds.uuid, "no framework reference");
            return Ok(None);
        };
        let Some(id_af) = framework_id(conn, &framework_uuid.to_string()).await? else {
            report.skip_entity(
                EntityKind::Dataset,
                ds.uuid,
                format!("framework {} not found in database", framework_uuid),
            );
            return Ok(None);
        };

        let id_data_type = match ds.data_type_code.as_deref() {
            Some(code) => {
                nomenclature::get_id_nomenclature(conn, NomenclatureType::DataType, code).await?
            }
            None => None,
        };
        let id_data_origin =
            nomenclature::get_id_nomenclature(conn, NomenclatureType::DataOrigin, origin_code)
                .await?;

        let uuid = uuid.to_string();
        let existing = dataset_id(conn, &uuid).await?;
        match existing {
            Some(id) => {
                debug!("Updating dataset {} ({})", uuid, id);
                sqlx::query(
                    r#"
                    UPDATE t_datasets
                    SET id_acquisition_framework = ?1,
                        dataset_name = ?2,
                        dataset_shortname = COALESCE(?3, dataset_shortname),
                        dataset_desc = COALESCE(?4, dataset_desc),
                        terrestrial_domain = ?5,
                        marine_domain = ?6,
                        id_nomenclature_data_type = COALESCE(?7, id_nomenclature_data_type),
                        id_nomenclature_data_origin = COALESCE(?8, id_nomenclature_data_origin),
                        id_digitizer = COALESCE(?9, id_digitizer),
                        meta_create_date = ?10,
                        meta_update_date = COALESCE(?11, meta_update_date)
                    WHERE id_dataset = ?12
                    "#,
                )
                .bind(id_af)
                .bind(&ds.name)
                .bind(&ds.shortname)
                .bind(&ds.description)
                .bind(ds.terrestrial_domain)
                .bind(ds.marine_domain)
                .bind(id_data_type)
                .bind(id_data_origin)
                .bind(ds.id_digitizer)
                .bind(ds.create_date)
                .bind(ds.update_date)
                .bind(id)
                .execute(&mut *conn)
                .await?;
                report.datasets_updated += 1;
            }
            None => {
                debug!("Inserting dataset {}", uuid);
                sqlx::query(
                    r#"
                    INSERT INTO t_datasets
                        (unique_dataset_id, id_acquisition_framework, dataset_name,
                         dataset_shortname, dataset_desc, terrestrial_domain, marine_domain,
                         id_nomenclature_data_type, id_nomenclature_data_origin, id_digitizer,
                         meta_create_date, meta_update_date)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    ON CONFLICT (unique_dataset_id) DO NOTHING
                    "#,
                )
                .bind(&uuid)
                .bind(id_af)
                .bind(&ds.name)
                .bind(ds.shortname.as_deref().unwrap_or_default())
                .bind(ds.description.as_deref().unwrap_or_default())
                .bind(ds.terrestrial_domain)
                .bind(ds.marine_domain)
                .bind(id_data_type)
                .bind(id_data_origin)
                .bind(ds.id_digitizer)
                .bind(ds.create_date)
                .bind(ds.update_date)
                .execute(&mut *conn)
                .await?;
                report.datasets_inserted += 1;
            }
        }

        let Some(id) = dataset_id(conn, &uuid).await? else {
            report.skip_entity(EntityKind::Dataset, ds.uuid, "dataset not found after upsert");
            return Ok(None);
        };

        if existing.is_none() {
            report.module_links_created += self.associate_dataset_modules(conn, id).await?;
        }

        self.resolver
            .associate_actors(conn, &ds.actors, AssociationTarget::Dataset(id), report)
            .await?;

        Ok(Some(id))
    }

    /// Link a dataset to every installed module of the configured codes
    pub async fn associate_dataset_modules(
        &self,
        conn: &mut SqliteConnection,
        id_dataset: i64,
    ) -> SyncResult<usize> {
        let mut created = 0;
        for id_module in nomenclature::module_ids(conn, &self.module_codes).await? {
            let result = sqlx::query(
                r#"
                INSERT INTO cor_module_dataset (id_module, id_dataset)
                VALUES (?1, ?2)
                ON CONFLICT (id_module, id_dataset) DO NOTHING
                "#,
            )
            .bind(id_module)
            .bind(id_dataset)
            .execute(&mut *conn)
            .await?;
            created += result.rows_affected() as usize;
        }

        Ok(created)
    }

    /// Fetch the identity records of the digitizers unknown locally
    ///
    /// Lookup failures are reported, never propagated.
    async fn fetch_unknown_digitizers(
        &self,
        pool: &SqlitePool,
        digitizers: impl Iterator<Item = Option<i64>>,
        report: &mut SyncReport,
    ) -> SyncResult<HashMap<i64, RemoteUser>> {
        let mut conn = pool.acquire().await?;
        let mut seen = HashSet::new();
        let mut remote_users = HashMap::new();

        for id_digitizer in digitizers.flatten() {
            if !seen.insert(id_digitizer) {
                continue;
            }
            match self
                .provisioner
                .lookup_unexisting_digitizer(&mut conn, id_digitizer)
                .await
            {
                Ok(Some(remote)) => {
                    remote_users.insert(id_digitizer, remote);
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to look up digitizer {}: {}", id_digitizer, e);
                    report.provisioning_failures.push(ProvisioningFailure {
                        id_role: id_digitizer,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(remote_users)
    }

    /// Provision a fetched digitizer in its own savepoint; failures are
    /// reported, never propagated
    async fn provision_digitizer(
        &self,
        conn: &mut SqliteConnection,
        id_digitizer: Option<i64>,
        remote_users: &HashMap<i64, RemoteUser>,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let Some(id_digitizer) = id_digitizer else {
            return Ok(());
        };
        let Some(remote) = remote_users.get(&id_digitizer) else {
            return Ok(());
        };

        let mut savepoint = conn.begin().await?;
        match self
            .provisioner
            .provision_digitizer(&mut savepoint, remote.clone())
            .await
        {
            Ok(provisioned) => {
                savepoint.commit().await?;
                if provisioned.is_some() {
                    report.digitizers_provisioned += 1;
                }
            }
            Err(e) => {
                savepoint.rollback().await?;
                error!("Failed to provision digitizer {}: {}", id_digitizer, e);
                report.provisioning_failures.push(ProvisioningFailure {
                    id_role: id_digitizer,
                    error: e.to_string(),
                });
            }
        }

        Ok(())
    }
}
