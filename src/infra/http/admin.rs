use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::info;

use crate::cache::ListingCache;

use super::{
    HealthProbe, db_health_response,
    middleware::{log_responses, set_request_context},
};

/// State for the operator-only listener.
#[derive(Clone)]
pub struct AdminState {
    pub listing_cache: Arc<ListingCache>,
    pub health: Arc<dyn HealthProbe>,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/cache/invalidate", post(invalidate_cache))
        .route("/_health/db", get(admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn invalidate_cache(State(state): State<AdminState>) -> Response {
    let dropped = state.listing_cache.clear();
    info!(
        target = "scrivo::http::admin",
        dropped, "listing cache invalidated"
    );
    StatusCode::NO_CONTENT.into_response()
}

async fn admin_health(State(state): State<AdminState>) -> Response {
    db_health_response(state.health.ping().await)
}
