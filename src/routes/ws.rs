use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router
///
/// The voice endpoint is unauthenticated; protect it at the network or proxy layer
/// when exposing the server publicly.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/voice", get(ws::ws_voice_handler))
        .layer(TraceLayer::new_for_http())
}
