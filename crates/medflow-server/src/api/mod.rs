pub mod workflows;

use axum::Router;

use crate::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new().nest("/workflows", workflows::router())
}
