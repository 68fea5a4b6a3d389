/// HTTP trigger server setup and routing
use crate::{
    context::AppContext,
    error::{SyncError, SyncResult},
};
use axum::{http::StatusCode, response::Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the main application router
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        .merge(crate::api::routes())
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .fallback(not_found)
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> SyncResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("MTD sync trigger listening on {}", addr);
    info!("   Metadata service: {}", ctx.config.metadata.api_endpoint);

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SyncError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| SyncError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
