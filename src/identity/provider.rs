/// Local identity provider: reconciles remote identities with t_roles
use crate::{
    db::{models::Role, role},
    error::{SyncError, SyncResult},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;

/// Attribute used to find an existing role when the id is unknown locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileKey {
    Email,
    Description,
}

/// Role attributes coming from an identity source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id_role: i64,
    pub identifiant: Option<String>,
    pub nom_role: Option<String>,
    pub prenom_role: Option<String>,
    pub desc_role: Option<String>,
    pub email: Option<String>,
    pub id_organisme: Option<i64>,
    pub active: bool,
}

/// A role as stored after provisioning, with its group memberships
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedRole {
    pub role: Role,
    pub group_ids: Vec<i64>,
}

/// Narrow provisioning interface used by the synchronization
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Name recorded on the roles this provider creates
    fn id_provider(&self) -> &str;

    /// Reconcile `info` with an existing role (by id, then by `reconcile_by`)
    /// and update it, or insert a new role.
    async fn insert_or_update_role(
        &self,
        conn: &mut SqliteConnection,
        info: &RoleInfo,
        reconcile_by: ReconcileKey,
    ) -> SyncResult<ProvisionedRole>;
}

/// Identity provider writing straight to the local role tables
#[derive(Debug, Clone)]
pub struct LocalIdentityProvider {
    id_provider: String,
}

impl LocalIdentityProvider {
    pub fn new(id_provider: impl Into<String>) -> Self {
        Self {
            id_provider: id_provider.into(),
        }
    }

    async fn find_existing(
        &self,
        conn: &mut SqliteConnection,
        info: &RoleInfo,
        reconcile_by: ReconcileKey,
    ) -> SyncResult<Option<Role>> {
        if let Some(role) = role::get_role(conn, info.id_role).await? {
            return Ok(Some(role));
        }

        match reconcile_by {
            ReconcileKey::Email => match info.email.as_deref() {
                Some(email) => role::find_user_by_email(conn, email).await,
                None => Ok(None),
            },
            ReconcileKey::Description => match info.desc_role.as_deref() {
                Some(desc) => role::find_role_by_description(conn, desc).await,
                None => Ok(None),
            },
        }
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    fn id_provider(&self) -> &str {
        &self.id_provider
    }

    async fn insert_or_update_role(
        &self,
        conn: &mut SqliteConnection,
        info: &RoleInfo,
        reconcile_by: ReconcileKey,
    ) -> SyncResult<ProvisionedRole> {
        let id_role = match self.find_existing(conn, info, reconcile_by).await? {
            Some(existing) => {
                tracing::debug!(
                    "Updating role {} from identity {}",
                    existing.id_role,
                    info.id_role
                );
                sqlx::query(
                    r#"
                    UPDATE t_roles
                    SET identifiant = ?1,
                        nom_role = ?2,
                        prenom_role = ?3,
                        desc_role = COALESCE(?4, desc_role),
                        email = ?5,
                        id_organisme = ?6,
                        id_provider = ?7,
                        active = ?8
                    WHERE id_role = ?9
                    "#,
                )
                .bind(&info.identifiant)
                .bind(&info.nom_role)
                .bind(&info.prenom_role)
                .bind(&info.desc_role)
                .bind(&info.email)
                .bind(info.id_organisme)
                .bind(&self.id_provider)
                .bind(info.active)
                .bind(existing.id_role)
                .execute(&mut *conn)
                .await?;
                existing.id_role
            }
            None => {
                tracing::debug!("Creating role {}", info.id_role);
                sqlx::query(
                    r#"
                    INSERT INTO t_roles
                        (id_role, groupe, identifiant, nom_role, prenom_role, desc_role,
                         email, id_organisme, id_provider, active)
                    VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                )
                .bind(info.id_role)
                .bind(&info.identifiant)
                .bind(&info.nom_role)
                .bind(&info.prenom_role)
                .bind(&info.desc_role)
                .bind(&info.email)
                .bind(info.id_organisme)
                .bind(&self.id_provider)
                .bind(info.active)
                .execute(&mut *conn)
                .await?;
                info.id_role
            }
        };

        let stored = role::get_role(conn, id_role)
            .await?
            .ok_or_else(|| SyncError::Internal(format!("Role {} vanished after upsert", id_role)))?;
        let group_ids = role::group_ids(conn, id_role).await?;

        Ok(ProvisionedRole {
            role: stored,
            group_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, DatabaseOptions};

    #[tokio::test]
    async fn test_insert_then_update_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("p.sqlite"), DatabaseOptions::default())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let provider = LocalIdentityProvider::new("cas_inpn");

        let mut info = RoleInfo {
            id_role: 1001,
            identifiant: Some("mdupont".into()),
            nom_role: Some("DUPONT".into()),
            email: Some("marie.dupont@example.org".into()),
            active: true,
            ..Default::default()
        };
        let created = provider
            .insert_or_update_role(&mut conn, &info, ReconcileKey::Email)
            .await
            .unwrap();
        assert_eq!(created.role.id_role, 1001);
        assert_eq!(created.role.id_provider.as_deref(), Some("cas_inpn"));
        assert!(created.group_ids.is_empty());

        info.nom_role = Some("DUPONT-MARTIN".into());
        let updated = provider
            .insert_or_update_role(&mut conn, &info, ReconcileKey::Email)
            .await
            .unwrap();
        assert_eq!(updated.role.nom_role.as_deref(), Some("DUPONT-MARTIN"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t_roles")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_reconcile_by_email_keeps_existing_id() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("p.sqlite"), DatabaseOptions::default())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        let provider = LocalIdentityProvider::new("cas_inpn");

        sqlx::query(
            "INSERT INTO t_roles (id_role, identifiant, email, desc_role) VALUES (7, 'legacy', 'luc.bernard@example.org', 'Local account')",
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        let info = RoleInfo {
            id_role: 2002,
            identifiant: Some("lbernard".into()),
            email: Some("luc.bernard@example.org".into()),
            active: true,
            ..Default::default()
        };
        let provisioned = provider
            .insert_or_update_role(&mut conn, &info, ReconcileKey::Email)
            .await
            .unwrap();
        assert_eq!(provisioned.role.id_role, 7);
        assert_eq!(provisioned.role.identifiant.as_deref(), Some("lbernard"));
        // Absent description leaves the stored one alone
        assert_eq!(provisioned.role.desc_role.as_deref(), Some("Local account"));
    }
}
