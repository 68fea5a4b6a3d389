/// Organism (bib_organismes) queries
use crate::{db::models::Organism, error::SyncResult};
use sqlx::SqliteConnection;
use uuid::Uuid;

/// Get an organism by id
pub async fn get_organism(conn: &mut SqliteConnection, id: i64) -> SyncResult<Option<Organism>> {
    let organism = sqlx::query_as::<_, Organism>(
        "SELECT id_organisme, uuid_organisme, nom_organisme, email_organisme FROM bib_organismes WHERE id_organisme = ?1",
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(organism)
}

/// Create or update the organism with this upstream UUID, returning its id
///
/// The UUID is stored lowercase and hyphenated, whatever its upstream spelling.
pub async fn upsert_by_uuid(
    conn: &mut SqliteConnection,
    uuid: Uuid,
    name: &str,
    email: Option<&str>,
) -> SyncResult<i64> {
    let uuid = uuid.to_string();
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id_organisme FROM bib_organismes WHERE uuid_organisme = ?1")
            .bind(&uuid)
            .fetch_optional(&mut *conn)
            .await?;

    if let Some(id) = existing {
        sqlx::query(
            "UPDATE bib_organismes SET nom_organisme = ?1, email_organisme = ?2 WHERE id_organisme = ?3",
        )
        .bind(name)
        .bind(email)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        return Ok(id);
    }

    sqlx::query(
        r#"
        INSERT INTO bib_organismes (uuid_organisme, nom_organisme, email_organisme)
        VALUES (?1, ?2, ?3)
        ON CONFLICT (uuid_organisme) DO NOTHING
        "#,
    )
    .bind(&uuid)
    .bind(name)
    .bind(email)
    .execute(&mut *conn)
    .await?;

    let id = sqlx::query_scalar("SELECT id_organisme FROM bib_organismes WHERE uuid_organisme = ?1")
        .bind(&uuid)
        .fetch_one(&mut *conn)
        .await?;

    Ok(id)
}

/// First organism carrying exactly this name
pub async fn find_by_name(conn: &mut SqliteConnection, name: &str) -> SyncResult<Option<i64>> {
    let id = sqlx::query_scalar(
        "SELECT id_organisme FROM bib_organismes WHERE nom_organisme = ?1 ORDER BY id_organisme LIMIT 1",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(id)
}

/// Create an organism known only by name; it gets a random UUID and no email
pub async fn insert_with_generated_uuid(conn: &mut SqliteConnection, name: &str) -> SyncResult<i64> {
    let result = sqlx::query(
        "INSERT INTO bib_organismes (uuid_organisme, nom_organisme, email_organisme) VALUES (?1, ?2, NULL)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Create or rename the organism with a given local id
pub async fn upsert_by_id(conn: &mut SqliteConnection, id: i64, name: &str) -> SyncResult<i64> {
    let updated = sqlx::query("UPDATE bib_organismes SET nom_organisme = ?1 WHERE id_organisme = ?2")
        .bind(name)
        .bind(id)
        .execute(&mut *conn)
        .await?;

    if updated.rows_affected() == 0 {
        sqlx::query(
            "INSERT INTO bib_organismes (id_organisme, uuid_organisme, nom_organisme) VALUES (?1, ?2, ?3)",
        )
        .bind(id)
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .execute(&mut *conn)
        .await?;
    }

    Ok(id)
}
