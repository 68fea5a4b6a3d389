/// API routes and handlers
pub mod health;
pub mod sync;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(sync::routes())
}
