/// Actor and organism resolution
///
/// Every actor attached to a framework or dataset is resolved to an
/// organism or a user before its association row is written:
/// 1. organism UUID: upsert the organism (a name is required)
/// 2. organism name only: reuse the first organism with that name, or create it
/// 3. email: the first user (not group) with that email
/// 4. framework main contact: the orphan contact placeholder
///
/// Anything else is skipped. Each actor runs in its own savepoint.
use crate::{
    db::{
        nomenclature::{self, NomenclatureType, CONTACT_PRINCIPAL_ROLE_CODE},
        organism, role,
    },
    error::{SyncError, SyncResult},
    identity::{IdentityProvider, ReconcileKey, RoleInfo},
    sync::report::{EntityKind, SyncReport},
    xml::ActorRecord,
};
use sqlx::{Connection, SqliteConnection};
use std::sync::Arc;

/// Description identifying the orphan contact placeholder role
pub const ORPHAN_CONTACT_DESCRIPTION: &str =
    "Main contact placeholder for acquisition frameworks without a resolvable main contact";

/// Record an actor association is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationTarget {
    Framework(i64),
    Dataset(i64),
}

impl AssociationTarget {
    pub fn table(&self) -> &'static str {
        match self {
            AssociationTarget::Framework(_) => "cor_acquisition_framework_actor",
            AssociationTarget::Dataset(_) => "cor_dataset_actor",
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            AssociationTarget::Framework(_) => "id_acquisition_framework",
            AssociationTarget::Dataset(_) => "id_dataset",
        }
    }

    pub fn owner_id(&self) -> i64 {
        match self {
            AssociationTarget::Framework(id) | AssociationTarget::Dataset(id) => *id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            AssociationTarget::Framework(_) => EntityKind::Framework,
            AssociationTarget::Dataset(_) => EntityKind::Dataset,
        }
    }
}

/// What an actor resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorResolution {
    Organism(i64),
    Role(i64),
    Unresolved(&'static str),
}

enum AssociationOutcome {
    Created,
    Existing,
    Unresolved(&'static str),
}

/// Resolves actors and writes their association rows
#[derive(Clone)]
pub struct ActorResolver {
    orphan_actor_id: i64,
    provider: Arc<dyn IdentityProvider>,
}

impl ActorResolver {
    pub fn new(orphan_actor_id: i64, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            orphan_actor_id,
            provider,
        }
    }

    /// Resolve one actor to an organism or a user
    pub async fn resolve_actor(
        &self,
        conn: &mut SqliteConnection,
        actor: &ActorRecord,
        target: AssociationTarget,
    ) -> SyncResult<ActorResolution> {
        if let Some(uuid) = actor.uuid_organism {
            let Some(name) = actor.organism.as_deref() else {
                return Ok(ActorResolution::Unresolved("organism UUID without organism name"));
            };
            let id = organism::upsert_by_uuid(conn, uuid, name, actor.email.as_deref()).await?;
            return Ok(ActorResolution::Organism(id));
        }

        if let Some(name) = actor.organism.as_deref() {
            let id = match organism::find_by_name(conn, name).await? {
                Some(id) => id,
                None => {
                    tracing::debug!("Creating organism {:?} with a generated UUID", name);
                    organism::insert_with_generated_uuid(conn, name).await?
                }
            };
            return Ok(ActorResolution::Organism(id));
        }

        if let Some(email) = actor.email.as_deref() {
            if let Some(user) = role::find_user_by_email(conn, email).await? {
                return Ok(ActorResolution::Role(user.id_role));
            }
        }

        if actor.role_code.as_deref() == Some(CONTACT_PRINCIPAL_ROLE_CODE)
            && matches!(target, AssociationTarget::Framework(_))
        {
            let id = self.orphan_placeholder(conn).await?;
            return Ok(ActorResolution::Role(id));
        }

        Ok(ActorResolution::Unresolved("no matching organism or user"))
    }

    /// Associate every actor with the target record
    ///
    /// Integrity violations are contained to the failing actor; any other
    /// error aborts.
    pub async fn associate_actors(
        &self,
        conn: &mut SqliteConnection,
        actors: &[ActorRecord],
        target: AssociationTarget,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        for actor in actors {
            let mut savepoint = conn.begin().await?;

            match self.associate_actor(&mut savepoint, actor, target).await {
                Ok(AssociationOutcome::Created) => {
                    savepoint.commit().await?;
                    report.actor_links_created += 1;
                }
                Ok(AssociationOutcome::Existing) => {
                    savepoint.commit().await?;
                }
                Ok(AssociationOutcome::Unresolved(reason)) => {
                    savepoint.rollback().await?;
                    report.skip_actor(target.kind(), target.owner_id(), actor, reason);
                }
                Err(e) if e.is_integrity_violation() => {
                    savepoint.rollback().await?;
                    tracing::warn!(
                        "Integrity error on INSERT INTO {} ({}, id_role, id_organism, id_nomenclature_actor_role) with actor {:?}: {}",
                        target.table(),
                        target.key_column(),
                        actor,
                        e
                    );
                    report.skip_actor(target.kind(), target.owner_id(), actor, e.to_string());
                }
                Err(e) => {
                    savepoint.rollback().await?;
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    async fn associate_actor(
        &self,
        conn: &mut SqliteConnection,
        actor: &ActorRecord,
        target: AssociationTarget,
    ) -> SyncResult<AssociationOutcome> {
        let (id_role, id_organism) = match self.resolve_actor(conn, actor, target).await? {
            ActorResolution::Organism(id) => (None, Some(id)),
            ActorResolution::Role(id) => (Some(id), None),
            ActorResolution::Unresolved(reason) => return Ok(AssociationOutcome::Unresolved(reason)),
        };

        // An unknown role code leaves the role NULL and the insert fails
        let id_nomenclature_actor_role = match actor.role_code.as_deref() {
            Some(code) => {
                nomenclature::get_id_nomenclature(conn, NomenclatureType::ActorRole, code).await?
            }
            None => None,
        };

        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {} ({}, id_role, id_organism, id_nomenclature_actor_role)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT DO NOTHING
            "#,
            target.table(),
            target.key_column()
        ))
        .bind(target.owner_id())
        .bind(id_role)
        .bind(id_organism)
        .bind(id_nomenclature_actor_role)
        .execute(&mut *conn)
        .await?;

        Ok(if result.rows_affected() > 0 {
            AssociationOutcome::Created
        } else {
            AssociationOutcome::Existing
        })
    }

    /// Id of the orphan contact placeholder, created on first use
    async fn orphan_placeholder(&self, conn: &mut SqliteConnection) -> SyncResult<i64> {
        if let Some(existing) = role::get_role(conn, self.orphan_actor_id).await? {
            if existing.desc_role.as_deref() != Some(ORPHAN_CONTACT_DESCRIPTION) {
                return Err(SyncError::Inconsistency(format!(
                    "role {} is reserved for the orphan contact placeholder but is described as {:?}",
                    self.orphan_actor_id, existing.desc_role
                )));
            }
            return Ok(existing.id_role);
        }

        tracing::info!(
            "Creating orphan contact placeholder role {}",
            self.orphan_actor_id
        );
        let info = RoleInfo {
            id_role: self.orphan_actor_id,
            identifiant: Some("orphan_contact".to_string()),
            nom_role: Some("ORPHAN".to_string()),
            prenom_role: Some("Contact".to_string()),
            desc_role: Some(ORPHAN_CONTACT_DESCRIPTION.to_string()),
            email: None,
            id_organisme: None,
            active: false,
        };
        let provisioned = self
            .provider
            .insert_or_update_role(conn, &info, ReconcileKey::Description)
            .await?;

        // Reconciling by description may land on another role
        if provisioned.role.id_role != self.orphan_actor_id {
            return Err(SyncError::Inconsistency(format!(
                "orphan contact placeholder is role {}, expected role {}",
                provisioned.role.id_role, self.orphan_actor_id
            )));
        }

        Ok(provisioned.role.id_role)
    }
}
