use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use conflict_cell::router::conflict_routes;
use conflict_cell::services::engine::ConflictEngine;
use notification_cell::router::notification_routes;
use notification_cell::NotificationQueue;

pub fn create_router(engine: Arc<ConflictEngine>, queue: Arc<NotificationQueue>) -> Router {
    Router::new()
        .route("/", get(|| async { "MedSync scheduling API is running!" }))
        .route("/health", get(|| async { "ok" }))
        .nest("/api/conflicts", conflict_routes(engine))
        .nest("/api/notifications", notification_routes(queue))
}
