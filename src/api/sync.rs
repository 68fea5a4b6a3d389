/// Synchronization trigger endpoints
use crate::{context::AppContext, error::SyncResult, sync::SyncReport};
use axum::{
    extract::{Path, Query, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

/// Build sync routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/mtd/sync", post(sync_all))
        .route("/mtd/sync/users/:id_role", post(sync_user))
}

#[derive(Debug, Deserialize)]
pub struct SyncUserParams {
    pub id_af: Option<i64>,
}

/// Synchronize the whole configured instance
async fn sync_all(State(ctx): State<AppContext>) -> SyncResult<Json<SyncReport>> {
    let report = ctx.sync.sync_all().await?;
    Ok(Json(report))
}

/// Synchronize the metadata of one user, optionally restricted to one
/// framework
async fn sync_user(
    State(ctx): State<AppContext>,
    Path(id_role): Path<i64>,
    Query(params): Query<SyncUserParams>,
) -> SyncResult<Json<SyncReport>> {
    let report = ctx.sync.sync_for_user(id_role, params.id_af).await?;
    Ok(Json(report))
}
