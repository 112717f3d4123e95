use std::sync::Arc;

use axum::{routing::get, Router};

use crate::handlers;
use crate::services::dispatcher::NotificationQueue;

pub fn notification_routes(queue: Arc<NotificationQueue>) -> Router {
    Router::new()
        .route("/stats", get(handlers::get_dispatcher_stats))
        .route("/pending", get(handlers::get_pending_notifications))
        .with_state(queue)
}
