use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use conflict_cell::models::{
    AutoRescheduleSettings, AutoResolveOutcome, ConflictType, CreateRescheduleRequest,
    ManualResolutionRequest, RequestedBy, RescheduleRequestStatus, ResolutionType, SchedulingError,
    UnresolvedReason,
};
use conflict_cell::services::engine::ConflictEngine;
use notification_cell::NotificationQueue;
use shared_models::{
    Appointment, AppointmentPatch, AppointmentStatus, AppointmentType, AvailabilityWindow,
    TimeWindow,
};
use shared_store::{
    AppointmentStore, MemoryAppointmentStore, MemoryAvailabilitySource, MemoryPatientHistory,
    StoreError,
};

struct Fixture {
    store: Arc<MemoryAppointmentStore>,
    availability: Arc<MemoryAvailabilitySource>,
    engine: ConflictEngine,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryAppointmentStore::new());
    let availability = Arc::new(MemoryAvailabilitySource::new());
    let history = Arc::new(MemoryPatientHistory::new());
    let queue = Arc::new(NotificationQueue::new());
    let engine = ConflictEngine::new(
        store.clone(),
        availability.clone(),
        history,
        queue,
        AutoRescheduleSettings::default(),
    );
    Fixture {
        store,
        availability,
        engine,
    }
}

fn appointment(
    doctor_id: Uuid,
    start_time: DateTime<Utc>,
    duration_minutes: i32,
    appointment_type: AppointmentType,
) -> Appointment {
    let now = Utc::now();
    Appointment {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        doctor_id,
        start_time,
        duration_minutes,
        status: AppointmentStatus::Scheduled,
        appointment_type,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_scan_detects_and_auto_resolves_double_booking() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let emergency = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::Emergency);
    let general = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    f.store.seed(vec![emergency.clone(), general.clone()]).await;
    f.availability
        .set_availability(
            doctor_id,
            vec![AvailabilityWindow::new(now, now + Duration::hours(12))],
        )
        .await;

    let report = f.engine.run_scan(doctor_id).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_matches!(report.outcomes[0], AutoResolveOutcome::Resolved(_));
    assert!(report.conflicts.is_empty());
    assert!(f.engine.open_conflicts().await.is_empty());
    assert_eq!(f.engine.resolutions().await.len(), 1);

    let kept = f.store.get_appointment(emergency.id).await.unwrap();
    assert_eq!(kept.start_time, emergency.start_time);
    let moved = f.store.get_appointment(general.id).await.unwrap();
    assert_ne!(moved.start_time, general.start_time);
}

#[tokio::test]
async fn test_redetection_preserves_conflict_identity() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let a = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    let b = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::FollowUp);
    f.store.seed(vec![a, b]).await;

    let first = f.engine.run_detection(doctor_id).await.unwrap();
    let second = f.engine.run_detection(doctor_id).await.unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(first[0].detected_at, second[0].detected_at);
}

#[tokio::test]
async fn test_unresolvable_conflict_stays_open() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    // No availability on file: there is nowhere to move anything.
    let a = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    let b = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::FollowUp);
    f.store.seed(vec![a, b]).await;

    let report = f.engine.run_scan(doctor_id).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    assert_matches!(
        report.outcomes[0],
        AutoResolveOutcome::Unresolved {
            reason: UnresolvedReason::NoSlotInWindow
        }
    );
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(f.engine.open_conflicts().await.len(), 1);
}

#[tokio::test]
async fn test_disabling_auto_reschedule_keeps_conflicts_for_manual_handling() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let a = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    let b = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::FollowUp);
    f.store.seed(vec![a, b]).await;

    let disabled = AutoRescheduleSettings {
        enabled: false,
        ..AutoRescheduleSettings::default()
    };
    let versioned = f.engine.update_settings(disabled).await;
    assert_eq!(versioned.version, 2);

    let report = f.engine.run_scan(doctor_id).await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.conflicts.len(), 1);

    let outcome = f
        .engine
        .auto_resolve_conflict(report.conflicts[0].id)
        .await
        .unwrap();
    assert_matches!(
        outcome,
        AutoResolveOutcome::Unresolved {
            reason: UnresolvedReason::Disabled
        }
    );
    assert_eq!(f.engine.open_conflicts().await.len(), 1);
}

#[tokio::test]
async fn test_manual_cancel_closes_the_conflict() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let a = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    let b = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::FollowUp);
    f.store.seed(vec![a.clone(), b.clone()]).await;

    let open = f.engine.run_detection(doctor_id).await.unwrap();
    assert_eq!(open.len(), 1);

    let resolution = f
        .engine
        .resolve_manually(
            open[0].id,
            ManualResolutionRequest {
                resolution_type: ResolutionType::Cancel,
                target_appointment_id: Some(b.id),
                new_start_time: None,
                reason: "duplicate booking".to_string(),
                resolved_by: "front-desk".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(resolution.resolution_type, ResolutionType::Cancel);
    assert!(f.engine.open_conflicts().await.is_empty());

    let cancelled = f.store.get_appointment(b.id).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn test_dissolved_conflict_is_closed_with_a_synthetic_resolution() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let a = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    let b = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::FollowUp);
    f.store.seed(vec![a.clone(), b.clone()]).await;

    let open = f.engine.run_detection(doctor_id).await.unwrap();
    assert_eq!(open.len(), 1);

    // The booking is cancelled out of band; the next pass must close the
    // conflict rather than leave it dangling.
    f.store
        .update_appointment(
            b.id,
            shared_models::AppointmentPatch::with_version(1).status(AppointmentStatus::Cancelled),
        )
        .await
        .unwrap();

    let open = f.engine.run_detection(doctor_id).await.unwrap();
    assert!(open.is_empty());

    let resolutions = f.engine.resolutions().await;
    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].resolved_by, "detector");
    assert_eq!(resolutions[0].resolution_type, ResolutionType::Cancel);
    assert!(resolutions[0].auto_resolved);
}

#[tokio::test]
async fn test_approved_reschedule_queues_any_new_conflict() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let a = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    let b = appointment(doctor_id, now + Duration::hours(3), 60, AppointmentType::FollowUp);
    f.store.seed(vec![a.clone(), b.clone()]).await;

    let request = f
        .engine
        .create_reschedule_request(CreateRescheduleRequest {
            appointment_id: b.id,
            requested_by: RequestedBy::Patient,
            requested_start_time: a.start_time,
            reason: "earlier works better".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(request.status, RescheduleRequestStatus::Pending);

    let (approved, conflicts) = f.engine.approve_reschedule_request(request.id).await.unwrap();
    assert_eq!(approved.status, RescheduleRequestStatus::Approved);

    // The approved move collides with the existing booking; the conflict is
    // surfaced immediately instead of being dropped.
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].conflict_type, ConflictType::DoubleBooking);
    assert_eq!(f.engine.open_conflicts().await.len(), 1);
}

#[tokio::test]
async fn test_rejected_request_is_terminal() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let a = appointment(doctor_id, now + Duration::hours(2), 30, AppointmentType::GeneralConsultation);
    f.store.seed(vec![a.clone()]).await;

    let request = f
        .engine
        .create_reschedule_request(CreateRescheduleRequest {
            appointment_id: a.id,
            requested_by: RequestedBy::Doctor,
            requested_start_time: now + Duration::hours(6),
            reason: "clinic closure".to_string(),
        })
        .await
        .unwrap();

    let rejected = f.engine.reject_reschedule_request(request.id).await.unwrap();
    assert_eq!(rejected.status, RescheduleRequestStatus::Rejected);

    let result = f.engine.approve_reschedule_request(request.id).await;
    assert_matches!(
        result,
        Err(SchedulingError::InvalidState(RescheduleRequestStatus::Rejected))
    );

    let untouched = f.store.get_appointment(a.id).await.unwrap();
    assert_eq!(untouched.start_time, a.start_time);
}

/// Store whose patches commit slowly, widening the window between two
/// decisions racing on the same request.
struct SlowPatchStore {
    inner: MemoryAppointmentStore,
}

#[async_trait]
impl AppointmentStore for SlowPatchStore {
    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
        window: TimeWindow,
    ) -> Result<Vec<Appointment>, StoreError> {
        self.inner.appointments_for_doctor(doctor_id, window).await
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, StoreError> {
        self.inner.get_appointment(id).await
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<Appointment, StoreError> {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        self.inner.update_appointment(id, patch).await
    }
}

#[tokio::test]
async fn test_request_is_decided_exactly_once_when_approve_and_reject_race() {
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();
    let apt = appointment(doctor_id, now + Duration::hours(2), 30, AppointmentType::GeneralConsultation);

    let store = Arc::new(SlowPatchStore {
        inner: MemoryAppointmentStore::new(),
    });
    store.inner.seed(vec![apt.clone()]).await;

    let engine = Arc::new(ConflictEngine::new(
        store.clone(),
        Arc::new(MemoryAvailabilitySource::new()),
        Arc::new(MemoryPatientHistory::new()),
        Arc::new(NotificationQueue::new()),
        AutoRescheduleSettings::default(),
    ));

    let request = engine
        .create_reschedule_request(CreateRescheduleRequest {
            appointment_id: apt.id,
            requested_by: RequestedBy::Patient,
            requested_start_time: now + Duration::hours(6),
            reason: "afternoon works better".to_string(),
        })
        .await
        .unwrap();

    let approve = {
        let engine = engine.clone();
        let request_id = request.id;
        tokio::spawn(async move { engine.approve_reschedule_request(request_id).await })
    };
    // Let the approval pass its pending check and stall in the store write
    // before the rejection arrives.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let reject = engine.reject_reschedule_request(request.id).await;
    let approve = approve.await.unwrap();

    // Exactly one transition wins: the rejection observes the approved
    // request instead of flipping it back.
    assert!(approve.is_ok());
    assert_matches!(
        reject,
        Err(SchedulingError::InvalidState(RescheduleRequestStatus::Approved))
    );

    let decided = engine.request(request.id).await.unwrap();
    assert_eq!(decided.status, RescheduleRequestStatus::Approved);

    let moved = store.inner.get_appointment(apt.id).await.unwrap();
    assert_eq!(moved.start_time, now + Duration::hours(6));
}

#[tokio::test]
async fn test_concurrent_auto_resolution_has_a_single_winner() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let emergency = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::Emergency);
    let general = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    f.store.seed(vec![emergency, general.clone()]).await;
    f.availability
        .set_availability(
            doctor_id,
            vec![AvailabilityWindow::new(now, now + Duration::hours(12))],
        )
        .await;

    let open = f.engine.run_detection(doctor_id).await.unwrap();
    assert_eq!(open.len(), 1);
    let conflict_id = open[0].id;

    let (first, second) = tokio::join!(
        f.engine.auto_resolve_conflict(conflict_id),
        f.engine.auto_resolve_conflict(conflict_id),
    );

    let resolved = [&first, &second]
        .iter()
        .filter(|r| matches!(r, Ok(AutoResolveOutcome::Resolved(_))))
        .count();
    assert_eq!(resolved, 1);

    // The loser observes the conflict already closed.
    let lost = [first, second]
        .into_iter()
        .find(|r| !matches!(r, Ok(AutoResolveOutcome::Resolved(_))))
        .unwrap();
    assert_matches!(lost, Err(SchedulingError::InvalidResolution(_)));

    // Only one resolution and one move were committed.
    assert_eq!(f.engine.resolutions().await.len(), 1);
    let moved = f.store.get_appointment(general.id).await.unwrap();
    assert_eq!(moved.version, 2);
}

#[tokio::test]
async fn test_suggested_slots_skip_busy_increments() {
    let f = fixture();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let busy = appointment(doctor_id, now + Duration::hours(1), 60, AppointmentType::GeneralConsultation);
    f.store.seed(vec![busy]).await;
    f.availability
        .set_availability(
            doctor_id,
            vec![AvailabilityWindow::new(
                now + Duration::hours(1),
                now + Duration::hours(4),
            )],
        )
        .await;

    let slots = f.engine.suggest_slots(doctor_id, 60, 5).await.unwrap();

    assert_eq!(slots.len(), 2);
    assert_eq!(slots[0].start_time, now + Duration::hours(2));
    assert_eq!(slots[1].start_time, now + Duration::hours(3));
    assert_eq!(slots[0].end_time, now + Duration::hours(3));
}

#[tokio::test]
async fn test_settings_updates_bump_the_version() {
    let f = fixture();

    let initial = f.engine.settings().await;
    assert_eq!(initial.version, 1);

    let updated = f
        .engine
        .update_settings(AutoRescheduleSettings {
            time_window_hours: 24,
            ..AutoRescheduleSettings::default()
        })
        .await;
    assert_eq!(updated.version, 2);
    assert_eq!(updated.settings.time_window_hours, 24);

    assert_eq!(f.engine.settings().await.version, 2);
}
