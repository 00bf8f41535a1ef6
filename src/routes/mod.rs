pub mod ws;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::handlers::api;
use crate::state::AppState;

/// Full application router: health check, voice socket and a JSON 404 fallback
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api::health_check))
        .merge(ws::create_ws_router())
        .fallback(api::not_found)
        .with_state(state)
}
