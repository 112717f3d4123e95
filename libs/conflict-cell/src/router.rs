// libs/conflict-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers;
use crate::services::engine::ConflictEngine;

pub fn conflict_routes(engine: Arc<ConflictEngine>) -> Router {
    Router::new()
        // Detection and scanning
        .route("/doctors/{doctor_id}/scan", post(handlers::scan_doctor_schedule))
        .route("/doctors/{doctor_id}/detect", post(handlers::detect_doctor_conflicts))
        .route("/doctors/{doctor_id}/suggested-slots", get(handlers::get_suggested_slots))
        // Conflict queries and resolution
        .route("/", get(handlers::list_open_conflicts))
        .route("/resolutions", get(handlers::list_resolutions))
        .route("/settings", get(handlers::get_settings))
        .route("/settings", put(handlers::update_settings))
        .route("/{conflict_id}", get(handlers::get_conflict))
        .route("/{conflict_id}/auto-resolve", post(handlers::auto_resolve_conflict))
        .route("/{conflict_id}/resolve", post(handlers::resolve_conflict_manually))
        // Reschedule request workflow
        .route("/reschedule-requests", post(handlers::create_reschedule_request))
        .route("/reschedule-requests/{request_id}", get(handlers::get_reschedule_request))
        .route("/reschedule-requests/{request_id}/approve", post(handlers::approve_reschedule_request))
        .route("/reschedule-requests/{request_id}/reject", post(handlers::reject_reschedule_request))
        .with_state(engine)
}
