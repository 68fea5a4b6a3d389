/// User provisioning from remote identity records
///
/// Creates or refreshes local users (and their organism) from the identity
/// lookup service, and attaches newly provisioned users to a default group.
use crate::{
    client::{IdentityClient, RemoteUser},
    config::ProvisioningConfig,
    db::{organism, role},
    error::{SyncError, SyncResult},
    identity::provider::{IdentityProvider, ProvisionedRole, ReconcileKey, RoleInfo},
};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Organism name used when the identity record has none
const DEFAULT_ORGANISM_NAME: &str = "Autre";

/// Provisions users referenced by synchronized metadata
#[derive(Clone)]
pub struct UserProvisioner {
    config: ProvisioningConfig,
    identity_client: IdentityClient,
    provider: Arc<dyn IdentityProvider>,
}

impl UserProvisioner {
    pub fn new(
        config: ProvisioningConfig,
        identity_client: IdentityClient,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            config,
            identity_client,
            provider,
        }
    }

    /// Create or update a user and its organism from a remote identity record
    ///
    /// When `update_user_organism` is false, an already known user keeps its
    /// current organism.
    pub async fn insert_user_and_org(
        &self,
        conn: &mut SqliteConnection,
        remote: &RemoteUser,
        update_user_organism: bool,
    ) -> SyncResult<ProvisionedRole> {
        let (Some(id_role), Some(login)) = (remote.id, remote.login.as_ref()) else {
            error!("Identity record without id or login: {:?}", remote);
            return Err(SyncError::Authentication(
                "no ID or LOGIN provided".to_string(),
            ));
        };

        let organism_id = remote.organism_id();
        if let Some(id) = organism_id {
            let name = remote
                .libelle_long_organisme
                .as_deref()
                .unwrap_or(DEFAULT_ORGANISM_NAME);
            organism::upsert_by_id(conn, id, name).await?;
        }

        let existing = role::get_role(conn, id_role).await?;
        let id_organisme = match existing {
            Some(ref user) if !update_user_organism => user.id_organisme,
            _ => organism_id,
        };

        let info = RoleInfo {
            id_role,
            identifiant: Some(login.clone()),
            nom_role: remote.nom.clone(),
            prenom_role: remote.prenom.clone(),
            desc_role: None,
            email: remote.email.clone(),
            id_organisme,
            active: true,
        };

        let mut provisioned = self
            .provider
            .insert_or_update_role(conn, &info, ReconcileKey::Email)
            .await?;

        if provisioned.group_ids.is_empty() {
            let id_group =
                if self.config.users_can_see_organism_data && organism_id.is_some() {
                    self.config.id_user_socle_2
                } else {
                    self.config.id_user_socle_1
                };

            match role::get_role(conn, id_group).await? {
                Some(group) if group.groupe => {
                    role::add_to_group(conn, id_group, provisioned.role.id_role).await?;
                    provisioned.group_ids.push(id_group);
                    debug!(
                        "User {} added to default group {}",
                        provisioned.role.id_role, id_group
                    );
                }
                _ => warn!(
                    "Default group {} does not exist, user {} left without group",
                    id_group, provisioned.role.id_role
                ),
            }
        }

        Ok(provisioned)
    }

    /// Provision a digitizer unknown locally from the identity service
    ///
    /// Returns `None` when the user already exists or the identity service
    /// does not know it. No organism is created for digitizers.
    pub async fn add_unexisting_digitizer(
        &self,
        conn: &mut SqliteConnection,
        id_digitizer: i64,
    ) -> SyncResult<Option<ProvisionedRole>> {
        match self.lookup_unexisting_digitizer(conn, id_digitizer).await? {
            Some(remote) => self.provision_digitizer(conn, remote).await,
            None => Ok(None),
        }
    }

    /// Identity record of a digitizer unknown locally, `None` when the user
    /// already exists or the identity service does not know it
    ///
    /// Only reads from `conn`: call it outside any write transaction.
    pub async fn lookup_unexisting_digitizer(
        &self,
        conn: &mut SqliteConnection,
        id_digitizer: i64,
    ) -> SyncResult<Option<RemoteUser>> {
        if role::role_exists(conn, id_digitizer).await? {
            return Ok(None);
        }

        self.identity_client.get_user(id_digitizer).await
    }

    /// Provision a digitizer from an already fetched identity record
    ///
    /// Returns `None` when the user was created in the meantime.
    pub async fn provision_digitizer(
        &self,
        conn: &mut SqliteConnection,
        mut remote: RemoteUser,
    ) -> SyncResult<Option<ProvisionedRole>> {
        if let Some(id) = remote.id {
            if role::role_exists(conn, id).await? {
                return Ok(None);
            }
        }
        remote.code_organisme = None;

        let provisioned = self.insert_user_and_org(conn, &remote, true).await?;
        info!(
            "Provisioned digitizer {} from {}",
            provisioned.role.id_role,
            self.provider.id_provider()
        );

        Ok(Some(provisioned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{IdentityServiceConfig, SyncConfig},
        db::{create_pool, run_migrations, DatabaseOptions},
        identity::provider::LocalIdentityProvider,
    };
    use sqlx::SqlitePool;

    async fn setup() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("u.sqlite"), DatabaseOptions::default())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO t_roles (id_role, groupe, nom_role) VALUES (1, 1, 'Grp_socle 1'), (2, 1, 'Grp_socle 2')",
        )
        .execute(&pool)
        .await
        .unwrap();
        (dir, pool)
    }

    fn provisioner(users_can_see_organism_data: bool) -> UserProvisioner {
        let mut config = SyncConfig::default().provisioning;
        config.users_can_see_organism_data = users_can_see_organism_data;
        let client = IdentityClient::new(
            &IdentityServiceConfig {
                base_url: String::new(),
                user: String::new(),
                password: String::new(),
            },
            5,
        )
        .unwrap();
        UserProvisioner::new(config, client, Arc::new(LocalIdentityProvider::new("cas_inpn")))
    }

    fn remote_user(id: i64, organism: Option<i64>) -> RemoteUser {
        RemoteUser {
            id: Some(id),
            login: Some(format!("user{}", id)),
            nom: Some("DUPONT".into()),
            prenom: Some("Marie".into()),
            email: Some(format!("user{}@example.org", id)),
            code_organisme: organism.map(serde_json::Value::from),
            libelle_long_organisme: Some("Muséum".into()),
        }
    }

    #[tokio::test]
    async fn test_missing_login_is_rejected() {
        let (_dir, pool) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let mut remote = remote_user(10, None);
        remote.login = None;
        let err = provisioner(false)
            .insert_user_and_org(&mut conn, &remote, true)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_default_group_without_organism_visibility() {
        let (_dir, pool) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        let provisioned = provisioner(false)
            .insert_user_and_org(&mut conn, &remote_user(10, Some(12)), true)
            .await
            .unwrap();
        assert_eq!(provisioned.group_ids, vec![1]);
        assert_eq!(provisioned.role.id_organisme, Some(12));
    }

    #[tokio::test]
    async fn test_default_group_with_organism_visibility() {
        let (_dir, pool) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let provisioner = provisioner(true);

        let with_org = provisioner
            .insert_user_and_org(&mut conn, &remote_user(10, Some(12)), true)
            .await
            .unwrap();
        assert_eq!(with_org.group_ids, vec![2]);

        let without_org = provisioner
            .insert_user_and_org(&mut conn, &remote_user(11, None), true)
            .await
            .unwrap();
        assert_eq!(without_org.group_ids, vec![1]);

        // Already grouped users are left alone
        let again = provisioner
            .insert_user_and_org(&mut conn, &remote_user(11, Some(12)), true)
            .await
            .unwrap();
        assert_eq!(again.group_ids, vec![1]);
    }

    #[tokio::test]
    async fn test_keep_existing_organism() {
        let (_dir, pool) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let provisioner = provisioner(false);

        provisioner
            .insert_user_and_org(&mut conn, &remote_user(10, Some(12)), true)
            .await
            .unwrap();
        let kept = provisioner
            .insert_user_and_org(&mut conn, &remote_user(10, Some(13)), false)
            .await
            .unwrap();
        assert_eq!(kept.role.id_organisme, Some(12));

        let moved = provisioner
            .insert_user_and_org(&mut conn, &remote_user(10, Some(13)), true)
            .await
            .unwrap();
        assert_eq!(moved.role.id_organisme, Some(13));
    }

    #[tokio::test]
    async fn test_existing_digitizer_is_not_fetched() {
        let (_dir, pool) = setup().await;
        let mut conn = pool.acquire().await.unwrap();

        // Role 1 exists; the identity service is not even configured
        let result = provisioner(false)
            .add_unexisting_digitizer(&mut conn, 1)
            .await
            .unwrap();
        assert!(result.is_none());

        let unknown = provisioner(false)
            .add_unexisting_digitizer(&mut conn, 4242)
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_provision_fetched_digitizer() {
        let (_dir, pool) = setup().await;
        let mut conn = pool.acquire().await.unwrap();
        let provisioner = provisioner(false);

        let provisioned = provisioner
            .provision_digitizer(&mut conn, remote_user(20, Some(12)))
            .await
            .unwrap()
            .unwrap();
        // The organism code of a digitizer is ignored
        assert_eq!(provisioned.role.id_organisme, None);
        assert_eq!(provisioned.group_ids, vec![1]);

        // Created in the meantime: left alone
        assert!(provisioner
            .provision_digitizer(&mut conn, remote_user(20, None))
            .await
            .unwrap()
            .is_none());
    }
}
