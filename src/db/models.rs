/// Row models of the synchronized tables
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Acquisition framework row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AcquisitionFramework {
    pub id_acquisition_framework: i64,
    pub unique_acquisition_framework_id: String,
    pub acquisition_framework_name: String,
    pub acquisition_framework_desc: String,
    pub acquisition_framework_start_date: Option<NaiveDateTime>,
    pub acquisition_framework_end_date: Option<NaiveDateTime>,
    pub meta_create_date: Option<NaiveDateTime>,
    pub meta_update_date: Option<NaiveDateTime>,
    pub id_digitizer: Option<i64>,
}

/// Dataset row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Dataset {
    pub id_dataset: i64,
    pub unique_dataset_id: String,
    pub id_acquisition_framework: i64,
    pub dataset_name: String,
    pub dataset_shortname: String,
    pub dataset_desc: String,
    pub terrestrial_domain: bool,
    pub marine_domain: bool,
    pub id_nomenclature_data_type: Option<i64>,
    pub id_nomenclature_data_origin: Option<i64>,
    pub id_digitizer: Option<i64>,
    pub meta_create_date: Option<NaiveDateTime>,
    pub meta_update_date: Option<NaiveDateTime>,
}

/// Organism row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Organism {
    pub id_organisme: i64,
    pub uuid_organisme: String,
    pub nom_organisme: String,
    pub email_organisme: Option<String>,
}

/// Role row: a user, or a group when `groupe` is set
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id_role: i64,
    pub groupe: bool,
    pub identifiant: Option<String>,
    pub nom_role: Option<String>,
    pub prenom_role: Option<String>,
    pub desc_role: Option<String>,
    pub email: Option<String>,
    pub id_organisme: Option<i64>,
    pub id_provider: Option<String>,
    pub active: bool,
}
