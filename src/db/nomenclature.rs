/// Nomenclature and module lookups
use crate::error::SyncResult;
use sqlx::SqliteConnection;
use std::collections::HashSet;

/// Code used when a dataset does not state its data origin ("not known")
pub const UNKNOWN_DATA_ORIGIN_CODE: &str = "NSP";

/// Actor role code of the framework main contact
pub const CONTACT_PRINCIPAL_ROLE_CODE: &str = "1";

/// Nomenclature types referenced by synchronized records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NomenclatureType {
    /// Dataset data type
    DataType,
    /// Dataset data origin (public / private ...)
    DataOrigin,
    /// Actor role on a framework or dataset
    ActorRole,
}

impl NomenclatureType {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            NomenclatureType::DataType => "DATA_TYP",
            NomenclatureType::DataOrigin => "DS_PUBLIQUE",
            NomenclatureType::ActorRole => "ROLE_ACTEUR",
        }
    }
}

/// Resolve a nomenclature code to its local id
pub async fn get_id_nomenclature(
    conn: &mut SqliteConnection,
    nomenclature_type: NomenclatureType,
    code: &str,
) -> SyncResult<Option<i64>> {
    let id = sqlx::query_scalar(
        "SELECT id_nomenclature FROM t_nomenclatures WHERE mnemonique = ?1 AND cd_nomenclature = ?2",
    )
    .bind(nomenclature_type.mnemonic())
    .bind(code)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(id)
}

/// All codes locally known for a nomenclature type
pub async fn list_codes(
    conn: &mut SqliteConnection,
    nomenclature_type: NomenclatureType,
) -> SyncResult<HashSet<String>> {
    let codes: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT cd_nomenclature FROM t_nomenclatures WHERE mnemonique = ?1",
    )
    .bind(nomenclature_type.mnemonic())
    .fetch_all(&mut *conn)
    .await?;

    Ok(codes.into_iter().collect())
}

/// Register a nomenclature code, returning its id
pub async fn insert_nomenclature(
    conn: &mut SqliteConnection,
    nomenclature_type: NomenclatureType,
    code: &str,
    label: &str,
) -> SyncResult<i64> {
    sqlx::query(
        r#"
        INSERT INTO t_nomenclatures (mnemonique, cd_nomenclature, label_default)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (mnemonique, cd_nomenclature) DO NOTHING
        "#,
    )
    .bind(nomenclature_type.mnemonic())
    .bind(code)
    .bind(label)
    .execute(&mut *conn)
    .await?;

    let id = sqlx::query_scalar(
        "SELECT id_nomenclature FROM t_nomenclatures WHERE mnemonique = ?1 AND cd_nomenclature = ?2",
    )
    .bind(nomenclature_type.mnemonic())
    .bind(code)
    .fetch_one(&mut *conn)
    .await?;

    Ok(id)
}

/// Ids of the modules matching the given codes; unknown codes are ignored
pub async fn module_ids(conn: &mut SqliteConnection, codes: &[String]) -> SyncResult<Vec<i64>> {
    let mut ids = Vec::with_capacity(codes.len());
    for code in codes {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id_module FROM t_modules WHERE module_code = ?1")
                .bind(code)
                .fetch_optional(&mut *conn)
                .await?;
        match id {
            Some(id) => ids.push(id),
            None => tracing::debug!("Module {} not installed, not associating it", code),
        }
    }

    Ok(ids)
}
