/// Health check endpoint
use crate::{context::AppContext, db};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// "healthy" or "unhealthy"
    pub status: String,

    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new().route("/health", get(health))
}

/// Reports the service as healthy when the database answers
pub async fn health(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    match db::test_connection(&ctx.db).await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthStatus {
                status: "healthy".to_string(),
                version,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthStatus {
                status: "unhealthy".to_string(),
                version,
                error: Some(e.to_string()),
            }),
        ),
    }
}
