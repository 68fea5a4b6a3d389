/// User and group (t_roles / cor_roles) queries
use crate::{db::models::Role, error::SyncResult};
use sqlx::SqliteConnection;

const ROLE_COLUMNS: &str = "id_role, groupe, identifiant, nom_role, prenom_role, desc_role, email, id_organisme, id_provider, active";

/// Get a role (user or group) by id
pub async fn get_role(conn: &mut SqliteConnection, id_role: i64) -> SyncResult<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(&format!(
        "SELECT {} FROM t_roles WHERE id_role = ?1",
        ROLE_COLUMNS
    ))
    .bind(id_role)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(role)
}

pub async fn role_exists(conn: &mut SqliteConnection, id_role: i64) -> SyncResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t_roles WHERE id_role = ?1")
        .bind(id_role)
        .fetch_one(&mut *conn)
        .await?;

    Ok(count > 0)
}

/// First user (never a group) with exactly this email
pub async fn find_user_by_email(
    conn: &mut SqliteConnection,
    email: &str,
) -> SyncResult<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(&format!(
        "SELECT {} FROM t_roles WHERE email = ?1 AND groupe = 0 ORDER BY id_role LIMIT 1",
        ROLE_COLUMNS
    ))
    .bind(email)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(role)
}

/// First role with exactly this description
pub async fn find_role_by_description(
    conn: &mut SqliteConnection,
    desc_role: &str,
) -> SyncResult<Option<Role>> {
    let role = sqlx::query_as::<_, Role>(&format!(
        "SELECT {} FROM t_roles WHERE desc_role = ?1 ORDER BY id_role LIMIT 1",
        ROLE_COLUMNS
    ))
    .bind(desc_role)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(role)
}

/// Groups a user belongs to
pub async fn group_ids(conn: &mut SqliteConnection, id_role: i64) -> SyncResult<Vec<i64>> {
    let ids = sqlx::query_scalar(
        "SELECT id_role_groupe FROM cor_roles WHERE id_role_utilisateur = ?1 ORDER BY id_role_groupe",
    )
    .bind(id_role)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ids)
}

pub async fn add_to_group(
    conn: &mut SqliteConnection,
    id_group: i64,
    id_role: i64,
) -> SyncResult<()> {
    sqlx::query(
        r#"
        INSERT INTO cor_roles (id_role_groupe, id_role_utilisateur)
        VALUES (?1, ?2)
        ON CONFLICT (id_role_groupe, id_role_utilisateur) DO NOTHING
        "#,
    )
    .bind(id_group)
    .bind(id_role)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, run_migrations, DatabaseOptions};

    #[tokio::test]
    async fn test_email_lookup_skips_groups() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("r.sqlite"), DatabaseOptions::default())
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO t_roles (id_role, groupe, nom_role, email) VALUES
                (1, 1, 'Grp_socle 1', 'shared@example.org'),
                (5, 0, 'DUPONT', 'shared@example.org')
            "#,
        )
        .execute(&mut *conn)
        .await
        .unwrap();

        let user = find_user_by_email(&mut conn, "shared@example.org")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.id_role, 5);
        assert!(!user.groupe);
        assert!(find_user_by_email(&mut conn, "nobody@example.org")
            .await
            .unwrap()
            .is_none());

        assert!(role_exists(&mut conn, 1).await.unwrap());
        assert!(!role_exists(&mut conn, 2).await.unwrap());

        add_to_group(&mut conn, 1, 5).await.unwrap();
        add_to_group(&mut conn, 1, 5).await.unwrap();
        assert_eq!(group_ids(&mut conn, 5).await.unwrap(), vec![1]);
    }
}
