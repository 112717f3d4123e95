use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

use conflict_cell::handlers;
use conflict_cell::models::{
    AutoRescheduleSettings, NotificationSettings, PriorityRules,
};
use conflict_cell::services::engine::ConflictEngine;
use notification_cell::NotificationQueue;
use shared_models::AppError;
use shared_store::{MemoryAppointmentStore, MemoryAvailabilitySource, MemoryPatientHistory};

fn engine() -> Arc<ConflictEngine> {
    Arc::new(ConflictEngine::new(
        Arc::new(MemoryAppointmentStore::new()),
        Arc::new(MemoryAvailabilitySource::new()),
        Arc::new(MemoryPatientHistory::new()),
        Arc::new(NotificationQueue::new()),
        AutoRescheduleSettings::default(),
    ))
}

fn settings(
    max_attempts: u32,
    time_window_hours: i64,
    advance_notice_hours: i64,
) -> AutoRescheduleSettings {
    AutoRescheduleSettings {
        enabled: true,
        max_attempts,
        time_window_hours,
        priority_rules: PriorityRules::default(),
        notification_settings: NotificationSettings {
            advance_notice_hours,
            ..NotificationSettings::default()
        },
    }
}

#[tokio::test]
async fn test_update_settings_rejects_non_positive_window() {
    let engine = engine();
    let result = handlers::update_settings(State(engine), Json(settings(48, 0, 24))).await;
    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_update_settings_rejects_zero_attempts() {
    let engine = engine();
    let result = handlers::update_settings(State(engine), Json(settings(0, 72, 24))).await;
    assert_matches!(result, Err(AppError::ValidationError(_)));
}

#[tokio::test]
async fn test_update_settings_rejects_negative_advance_notice() {
    let engine = engine();
    let result =
        handlers::update_settings(State(engine.clone()), Json(settings(48, 72, -1))).await;
    assert_matches!(result, Err(AppError::ValidationError(_)));

    // The rejected update never reached the engine.
    assert_eq!(engine.settings().await.version, 1);
}

#[tokio::test]
async fn test_update_settings_accepts_valid_payload() {
    let engine = engine();
    let result = handlers::update_settings(State(engine.clone()), Json(settings(24, 48, 12))).await;
    assert!(result.is_ok());
    assert_eq!(engine.settings().await.version, 2);
}

#[tokio::test]
async fn test_get_unknown_conflict_is_not_found() {
    let engine = engine();
    let result = handlers::get_conflict(State(engine), Path(Uuid::new_v4())).await;
    assert_matches!(result, Err(AppError::NotFound(_)));
}
