use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/chat/send", post(api::chat_send))
        .route(
            "/api/chat/history",
            get(api::chat_history).delete(api::chat_clear_history),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
