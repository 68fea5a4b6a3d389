/// Canonical records extracted from MTD XML exports
use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

/// A contact attached to a framework or dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActorRecord {
    pub name: Option<String>,
    pub role_code: Option<String>,
    pub uuid_organism: Option<Uuid>,
    pub organism: Option<String>,
    pub email: Option<String>,
}

impl ActorRecord {
    /// Whether the actor names an organism, by UUID or by name
    pub fn has_organism(&self) -> bool {
        self.uuid_organism.is_some() || self.organism.is_some()
    }
}

/// Acquisition framework ("cadre d'acquisition")
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameworkRecord {
    pub uuid: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub start_date: NaiveDateTime,
    pub end_date: Option<NaiveDateTime>,
    pub create_date: NaiveDateTime,
    pub update_date: Option<NaiveDateTime>,
    pub id_digitizer: Option<i64>,
    pub id_instance: Option<String>,
    pub actors: Vec<ActorRecord>,
}

/// Dataset ("jeu de données")
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetRecord {
    pub uuid: Option<Uuid>,
    pub framework_uuid: Option<Uuid>,
    pub name: String,
    pub shortname: Option<String>,
    pub description: Option<String>,
    pub terrestrial_domain: bool,
    pub marine_domain: bool,
    pub data_type_code: Option<String>,
    pub data_origin_code: Option<String>,
    pub id_digitizer: Option<i64>,
    pub create_date: NaiveDateTime,
    pub update_date: Option<NaiveDateTime>,
    pub id_instance: Option<String>,
    pub actors: Vec<ActorRecord>,
}
