use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

use shared_models::{Appointment, AvailabilityWindow};

use crate::models::{ConflictType, ScheduleConflict};
use crate::services::classifier;

/// Half-open interval overlap between an appointment and an arbitrary
/// interval: touching endpoints never overlap.
pub fn interval_overlaps(apt: &Appointment, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    apt.start_time < end && start < apt.end_time()
}

/// Scans the given appointments for scheduling conflicts.
///
/// Appointments are grouped by doctor; within each group the scan sorts by
/// start time and sweeps forward, so the cost is O(n log n) per doctor
/// rather than a pairwise check across the whole set. Only active
/// (scheduled/confirmed) appointments participate; non-positive durations
/// are skipped. The same unordered pair of appointments never produces two
/// conflict records.
///
/// `availability_by_doctor` carries the doctors' declared working windows.
/// A doctor with no entry is treated as having unknown availability and is
/// only checked for double bookings.
///
/// Detection never fails: malformed input is skipped, not raised.
pub fn detect_conflicts(
    appointments: &[Appointment],
    availability_by_doctor: &HashMap<Uuid, Vec<AvailabilityWindow>>,
    now: DateTime<Utc>,
) -> Vec<ScheduleConflict> {
    let mut by_doctor: BTreeMap<Uuid, Vec<&Appointment>> = BTreeMap::new();
    for apt in appointments {
        if !apt.is_active() || apt.duration_minutes <= 0 {
            continue;
        }
        by_doctor.entry(apt.doctor_id).or_default().push(apt);
    }

    let mut conflicts = Vec::new();

    for (doctor_id, mut group) in by_doctor {
        group.sort_by_key(|apt| (apt.start_time, apt.id));

        // Forward sweep: once a later appointment starts at or after this
        // one's end, nothing further in the sorted group can overlap it.
        for i in 0..group.len() {
            let a = group[i];
            for b in group.iter().skip(i + 1) {
                if b.start_time >= a.end_time() {
                    break;
                }
                conflicts.push(double_booking_conflict(doctor_id, a, b, now));
            }
        }

        if let Some(windows) = availability_by_doctor.get(&doctor_id) {
            for apt in &group {
                let covered = windows
                    .iter()
                    .any(|w| w.covers(apt.start_time, apt.end_time()));
                if !covered {
                    conflicts.push(unavailable_doctor_conflict(doctor_id, apt, now));
                }
            }
        }
    }

    if !conflicts.is_empty() {
        debug!("Detected {} scheduling conflicts", conflicts.len());
    }

    conflicts
}

fn double_booking_conflict(
    doctor_id: Uuid,
    a: &Appointment,
    b: &Appointment,
    now: DateTime<Utc>,
) -> ScheduleConflict {
    let severity = classifier::classify(ConflictType::DoubleBooking, &[a, b], now);
    ScheduleConflict {
        id: Uuid::new_v4(),
        conflict_type: ConflictType::DoubleBooking,
        severity,
        doctor_id,
        appointment_ids: vec![a.id, b.id],
        description: format!(
            "Appointments {} and {} overlap between {} and {}",
            a.id,
            b.id,
            b.start_time,
            a.end_time().min(b.end_time())
        ),
        detected_at: now,
        resolved: false,
    }
}

fn unavailable_doctor_conflict(
    doctor_id: Uuid,
    apt: &Appointment,
    now: DateTime<Utc>,
) -> ScheduleConflict {
    let severity = classifier::classify(ConflictType::UnavailableDoctor, &[apt], now);
    ScheduleConflict {
        id: Uuid::new_v4(),
        conflict_type: ConflictType::UnavailableDoctor,
        severity,
        doctor_id,
        appointment_ids: vec![apt.id],
        description: format!(
            "Appointment {} ({} - {}) falls outside doctor {}'s availability",
            apt.id,
            apt.start_time,
            apt.end_time(),
            doctor_id
        ),
        detected_at: now,
        resolved: false,
    }
}
