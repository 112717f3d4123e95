use std::sync::Arc;

use axum::{extract::State, Json};

use shared_models::AppError;

use crate::models::{DispatcherStats, QueuedNotification};
use crate::services::dispatcher::NotificationQueue;

pub async fn get_dispatcher_stats(
    State(queue): State<Arc<NotificationQueue>>,
) -> Result<Json<DispatcherStats>, AppError> {
    Ok(Json(queue.stats().await))
}

pub async fn get_pending_notifications(
    State(queue): State<Arc<NotificationQueue>>,
) -> Result<Json<Vec<QueuedNotification>>, AppError> {
    Ok(Json(queue.pending().await))
}
