/// Acquisition framework and dataset queries
use crate::{
    db::models::{AcquisitionFramework, Dataset},
    error::SyncResult,
};
use sqlx::SqliteConnection;

const FRAMEWORK_COLUMNS: &str = "id_acquisition_framework, unique_acquisition_framework_id, \
     acquisition_framework_name, acquisition_framework_desc, acquisition_framework_start_date, \
     acquisition_framework_end_date, meta_create_date, meta_update_date, id_digitizer";

const DATASET_COLUMNS: &str = "id_dataset, unique_dataset_id, id_acquisition_framework, \
     dataset_name, dataset_shortname, dataset_desc, terrestrial_domain, marine_domain, \
     id_nomenclature_data_type, id_nomenclature_data_origin, id_digitizer, meta_create_date, \
     meta_update_date";

/// Get a framework by local id
pub async fn get_framework(
    conn: &mut SqliteConnection,
    id: i64,
) -> SyncResult<Option<AcquisitionFramework>> {
    let framework = sqlx::query_as::<_, AcquisitionFramework>(&format!(
        "SELECT {} FROM t_acquisition_frameworks WHERE id_acquisition_framework = ?1",
        FRAMEWORK_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(framework)
}

/// Get a framework by its stored (lowercase) UUID
pub async fn find_framework(
    conn: &mut SqliteConnection,
    uuid: &str,
) -> SyncResult<Option<AcquisitionFramework>> {
    let framework = sqlx::query_as::<_, AcquisitionFramework>(&format!(
        "SELECT {} FROM t_acquisition_frameworks WHERE unique_acquisition_framework_id = ?1",
        FRAMEWORK_COLUMNS
    ))
    .bind(uuid)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(framework)
}

/// Get a dataset by its stored (lowercase) UUID
pub async fn find_dataset(conn: &mut SqliteConnection, uuid: &str) -> SyncResult<Option<Dataset>> {
    let dataset = sqlx::query_as::<_, Dataset>(&format!(
        "SELECT {} FROM t_datasets WHERE unique_dataset_id = ?1",
        DATASET_COLUMNS
    ))
    .bind(uuid)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(dataset)
}

pub async fn framework_id(conn: &mut SqliteConnection, uuid: &str) -> SyncResult<Option<i64>> {
    let id = sqlx::query_scalar(
        "SELECT id_acquisition_framework FROM t_acquisition_frameworks WHERE unique_acquisition_framework_id = ?1",
    )
    .bind(uuid)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(id)
}

pub async fn dataset_id(conn: &mut SqliteConnection, uuid: &str) -> SyncResult<Option<i64>> {
    let id = sqlx::query_scalar("SELECT id_dataset FROM t_datasets WHERE unique_dataset_id = ?1")
        .bind(uuid)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(id)
}
