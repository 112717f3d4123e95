use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use shared_models::{
    Appointment, AppointmentPatch, AppointmentStatus, AppointmentType, AvailabilityWindow,
    TimeWindow,
};
use shared_store::{
    AppointmentStore, AvailabilitySource, MemoryAppointmentStore, MemoryAvailabilitySource,
    StoreError,
};

fn appointment(doctor_id: Uuid, start_time: DateTime<Utc>) -> Appointment {
    let now = Utc::now();
    Appointment {
        id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        doctor_id,
        start_time,
        duration_minutes: 30,
        status: AppointmentStatus::Scheduled,
        appointment_type: AppointmentType::GeneralConsultation,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

#[tokio::test]
async fn test_patch_bumps_the_version() {
    let store = MemoryAppointmentStore::new();
    let now = Utc::now();
    let apt = appointment(Uuid::new_v4(), now + Duration::hours(1));
    store.seed(vec![apt.clone()]).await;

    let updated = store
        .update_appointment(
            apt.id,
            AppointmentPatch::with_version(1).start_time(now + Duration::hours(2)),
        )
        .await
        .unwrap();

    assert_eq!(updated.version, 2);
    assert_eq!(updated.start_time, now + Duration::hours(2));
}

#[tokio::test]
async fn test_stale_patch_is_rejected_without_mutation() {
    let store = MemoryAppointmentStore::new();
    let now = Utc::now();
    let apt = appointment(Uuid::new_v4(), now + Duration::hours(1));
    store.seed(vec![apt.clone()]).await;

    // First writer wins and bumps the version.
    store
        .update_appointment(
            apt.id,
            AppointmentPatch::with_version(1).start_time(now + Duration::hours(2)),
        )
        .await
        .unwrap();

    // Second writer still carries the version it originally read.
    let result = store
        .update_appointment(
            apt.id,
            AppointmentPatch::with_version(1).status(AppointmentStatus::Cancelled),
        )
        .await;
    assert_matches!(
        result,
        Err(StoreError::ConcurrentModification {
            expected: 1,
            found: 2
        })
    );

    let current = store.get_appointment(apt.id).await.unwrap();
    assert_eq!(current.status, AppointmentStatus::Scheduled);
    assert_eq!(current.version, 2);
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found() {
    let store = MemoryAppointmentStore::new();
    assert_matches!(
        store.get_appointment(Uuid::new_v4()).await,
        Err(StoreError::NotFound)
    );
    assert_matches!(
        store
            .update_appointment(Uuid::new_v4(), AppointmentPatch::with_version(1))
            .await,
        Err(StoreError::NotFound)
    );
}

#[tokio::test]
async fn test_doctor_query_filters_by_window_and_doctor() {
    let store = MemoryAppointmentStore::new();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let inside = appointment(doctor_id, now + Duration::hours(1));
    let outside = appointment(doctor_id, now + Duration::hours(30));
    let other_doctor = appointment(Uuid::new_v4(), now + Duration::hours(1));
    store
        .seed(vec![inside.clone(), outside, other_doctor])
        .await;

    let matching = store
        .appointments_for_doctor(doctor_id, TimeWindow::new(now, now + Duration::hours(24)))
        .await
        .unwrap();

    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].id, inside.id);
}

#[tokio::test]
async fn test_doctor_query_is_sorted_by_start_time() {
    let store = MemoryAppointmentStore::new();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    let late = appointment(doctor_id, now + Duration::hours(3));
    let early = appointment(doctor_id, now + Duration::hours(1));
    store.seed(vec![late.clone(), early.clone()]).await;

    let matching = store
        .appointments_for_doctor(doctor_id, TimeWindow::new(now, now + Duration::hours(24)))
        .await
        .unwrap();

    assert_eq!(matching[0].id, early.id);
    assert_eq!(matching[1].id, late.id);
}

#[tokio::test]
async fn test_availability_is_clipped_to_the_query_window() {
    let source = MemoryAvailabilitySource::new();
    let now = Utc::now();
    let doctor_id = Uuid::new_v4();

    source
        .set_availability(
            doctor_id,
            vec![
                AvailabilityWindow::new(now + Duration::hours(1), now + Duration::hours(4)),
                AvailabilityWindow::new(now + Duration::hours(30), now + Duration::hours(34)),
            ],
        )
        .await;

    let windows = source
        .availability(doctor_id, TimeWindow::new(now, now + Duration::hours(24)))
        .await
        .unwrap();

    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].start, now + Duration::hours(1));
}

#[tokio::test]
async fn test_unknown_doctor_has_no_availability() {
    let source = MemoryAvailabilitySource::new();
    let now = Utc::now();

    let windows = source
        .availability(Uuid::new_v4(), TimeWindow::new(now, now + Duration::hours(24)))
        .await
        .unwrap();
    assert!(windows.is_empty());
}
