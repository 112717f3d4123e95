// libs/conflict-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AutoRescheduleSettings, CreateRescheduleRequest, ManualResolutionRequest, SchedulingError,
};
use crate::services::engine::ConflictEngine;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SuggestedSlotsQuery {
    pub duration_minutes: i32,
    pub limit: Option<usize>,
}

// ==============================================================================
// DETECTION AND SCAN HANDLERS
// ==============================================================================

pub async fn scan_doctor_schedule(
    State(engine): State<Arc<ConflictEngine>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let report = engine.run_scan(doctor_id).await.map_err(map_error)?;
    Ok(Json(json!({
        "doctor_id": doctor_id,
        "open_conflicts": report.conflicts,
        "auto_resolve_outcomes": report.outcomes,
    })))
}

pub async fn detect_doctor_conflicts(
    State(engine): State<Arc<ConflictEngine>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let conflicts = engine.run_detection(doctor_id).await.map_err(map_error)?;
    Ok(Json(json!({
        "doctor_id": doctor_id,
        "conflicts": conflicts,
    })))
}

pub async fn get_suggested_slots(
    State(engine): State<Arc<ConflictEngine>>,
    Path(doctor_id): Path<Uuid>,
    Query(params): Query<SuggestedSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = params.limit.unwrap_or(5).min(50);
    let slots = engine
        .suggest_slots(doctor_id, params.duration_minutes, limit)
        .await
        .map_err(map_error)?;
    Ok(Json(json!({
        "doctor_id": doctor_id,
        "slots": slots,
    })))
}

// ==============================================================================
// CONFLICT QUERY AND RESOLUTION HANDLERS
// ==============================================================================

pub async fn list_open_conflicts(
    State(engine): State<Arc<ConflictEngine>>,
) -> Result<Json<Value>, AppError> {
    let conflicts = engine.open_conflicts().await;
    Ok(Json(json!({ "conflicts": conflicts })))
}

pub async fn get_conflict(
    State(engine): State<Arc<ConflictEngine>>,
    Path(conflict_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let conflict = engine
        .conflict(conflict_id)
        .await
        .ok_or_else(|| AppError::NotFound("Conflict not found".to_string()))?;
    Ok(Json(json!(conflict)))
}

pub async fn auto_resolve_conflict(
    State(engine): State<Arc<ConflictEngine>>,
    Path(conflict_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let outcome = engine
        .auto_resolve_conflict(conflict_id)
        .await
        .map_err(map_error)?;
    Ok(Json(json!(outcome)))
}

pub async fn resolve_conflict_manually(
    State(engine): State<Arc<ConflictEngine>>,
    Path(conflict_id): Path<Uuid>,
    Json(request): Json<ManualResolutionRequest>,
) -> Result<Json<Value>, AppError> {
    let resolution = engine
        .resolve_manually(conflict_id, request)
        .await
        .map_err(map_error)?;
    Ok(Json(json!(resolution)))
}

pub async fn list_resolutions(
    State(engine): State<Arc<ConflictEngine>>,
) -> Result<Json<Value>, AppError> {
    let resolutions = engine.resolutions().await;
    Ok(Json(json!({ "resolutions": resolutions })))
}

// ==============================================================================
// RESCHEDULE REQUEST HANDLERS
// ==============================================================================

pub async fn create_reschedule_request(
    State(engine): State<Arc<ConflictEngine>>,
    Json(request): Json<CreateRescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let created = engine
        .create_reschedule_request(request)
        .await
        .map_err(map_error)?;
    Ok(Json(json!(created)))
}

pub async fn get_reschedule_request(
    State(engine): State<Arc<ConflictEngine>>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let request = engine
        .request(request_id)
        .await
        .ok_or_else(|| AppError::NotFound("Reschedule request not found".to_string()))?;
    Ok(Json(json!(request)))
}

pub async fn approve_reschedule_request(
    State(engine): State<Arc<ConflictEngine>>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let (approved, conflicts) = engine
        .approve_reschedule_request(request_id)
        .await
        .map_err(map_error)?;
    Ok(Json(json!({
        "request": approved,
        "open_conflicts": conflicts,
    })))
}

pub async fn reject_reschedule_request(
    State(engine): State<Arc<ConflictEngine>>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let rejected = engine
        .reject_reschedule_request(request_id)
        .await
        .map_err(map_error)?;
    Ok(Json(json!(rejected)))
}

// ==============================================================================
// SETTINGS HANDLERS
// ==============================================================================

pub async fn get_settings(
    State(engine): State<Arc<ConflictEngine>>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(json!(engine.settings().await)))
}

pub async fn update_settings(
    State(engine): State<Arc<ConflictEngine>>,
    Json(settings): Json<AutoRescheduleSettings>,
) -> Result<Json<Value>, AppError> {
    if settings.time_window_hours <= 0 {
        return Err(AppError::ValidationError(
            "time_window_hours must be positive".to_string(),
        ));
    }
    if settings.max_attempts == 0 {
        return Err(AppError::ValidationError(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    if settings.notification_settings.advance_notice_hours < 0 {
        return Err(AppError::ValidationError(
            "advance_notice_hours must not be negative".to_string(),
        ));
    }
    Ok(Json(json!(engine.update_settings(settings).await)))
}

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

fn map_error(e: SchedulingError) -> AppError {
    match e {
        SchedulingError::ConflictNotFound
        | SchedulingError::AppointmentNotFound
        | SchedulingError::RequestNotFound => AppError::NotFound(e.to_string()),
        SchedulingError::InvalidResolution(_)
        | SchedulingError::InvalidState(_)
        | SchedulingError::ConcurrentModification => AppError::Conflict(e.to_string()),
        SchedulingError::ValidationError(msg) => AppError::ValidationError(msg),
        SchedulingError::StoreError(msg) => AppError::Internal(msg),
    }
}
