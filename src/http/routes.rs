//! Axum router configuration

use axum::{extract::DefaultBodyLimit, routing::post, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

use super::handlers::convert_audio;

/// Create the Axum router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    // The stager enforces the payload ceiling itself; this only stops bodies
    // that could not fit even with multipart framing.
    let body_limit = state.config.limits.max_body_bytes();

    Router::new()
        .route("/convert/{to_format}", post(convert_audio))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}
