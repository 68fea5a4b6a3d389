/// Outcome of a synchronization run
use crate::xml::ActorRecord;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Framework,
    Dataset,
}

/// A framework or dataset left out of the run
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntity {
    pub kind: EntityKind,
    pub uuid: Option<Uuid>,
    pub reason: String,
}

/// An actor that could not be associated
#[derive(Debug, Clone, Serialize)]
pub struct SkippedActor {
    pub kind: EntityKind,
    pub owner_id: i64,
    pub actor: ActorRecord,
    pub reason: String,
}

/// A digitizer that could not be provisioned
#[derive(Debug, Clone, Serialize)]
pub struct ProvisioningFailure {
    pub id_role: i64,
    pub error: String,
}

/// Counters and skips of a synchronization run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub frameworks_inserted: usize,
    pub frameworks_updated: usize,
    pub datasets_inserted: usize,
    pub datasets_updated: usize,
    pub actor_links_created: usize,
    pub module_links_created: usize,
    pub digitizers_provisioned: usize,
    pub skipped: Vec<SkippedEntity>,
    pub skipped_actors: Vec<SkippedActor>,
    pub provisioning_failures: Vec<ProvisioningFailure>,
}

impl SyncReport {
    /// Record a skipped framework or dataset, logging it at warn level
    pub fn skip_entity(&mut self, kind: EntityKind, uuid: Option<Uuid>, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Skipping {:?} {:?}: {}", kind, uuid, reason);
        self.skipped.push(SkippedEntity { kind, uuid, reason });
    }

    /// Record a skipped actor, logging the full actor payload at warn level
    pub fn skip_actor(
        &mut self,
        kind: EntityKind,
        owner_id: i64,
        actor: &ActorRecord,
        reason: impl Into<String>,
    ) {
        let reason = reason.into();
        tracing::warn!(
            "Actor of {:?} {} not associated ({}): {:?}",
            kind,
            owner_id,
            reason,
            actor
        );
        self.skipped_actors.push(SkippedActor {
            kind,
            owner_id,
            actor: actor.clone(),
            reason,
        });
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty()
            && self.skipped_actors.is_empty()
            && self.provisioning_failures.is_empty()
    }
}
