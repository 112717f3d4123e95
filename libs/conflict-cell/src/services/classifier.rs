use chrono::{DateTime, Duration, Utc};

use shared_models::{Appointment, AppointmentType};

use crate::models::{ConflictSeverity, ConflictType};

/// Assigns conflict severity from a fixed rule table, evaluated in order;
/// the first matching rule wins:
///
/// 1. any referenced appointment is an emergency -> high
/// 2. the doctor is unavailable -> medium
/// 3. double booking with both appointments starting within the next 24h ->
///    high, otherwise medium; an appointment that has already started is at
///    least as imminent, so past start times rank high as well
/// 4. anything else -> low
///
/// Pure over its inputs; recomputed by the engine whenever a conflict's
/// appointment set changes.
pub fn classify(
    conflict_type: ConflictType,
    appointments: &[&Appointment],
    now: DateTime<Utc>,
) -> ConflictSeverity {
    if appointments
        .iter()
        .any(|apt| apt.appointment_type == AppointmentType::Emergency)
    {
        return ConflictSeverity::High;
    }

    match conflict_type {
        ConflictType::UnavailableDoctor => ConflictSeverity::Medium,
        ConflictType::DoubleBooking => {
            let horizon = now + Duration::hours(24);
            if appointments.iter().all(|apt| apt.start_time <= horizon) {
                ConflictSeverity::High
            } else {
                ConflictSeverity::Medium
            }
        }
        ConflictType::RoomConflict => ConflictSeverity::Low,
    }
}
