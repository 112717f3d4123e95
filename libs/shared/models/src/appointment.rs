use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    /// Optimistic-concurrency token, bumped by the store on every committed patch.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes as i64)
    }

    /// Active appointments are the only ones that participate in conflict
    /// detection; cancelled and completed bookings hold no slot.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        )
    }

    /// Half-open interval overlap: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Appointment) -> bool {
        self.start_time < other.end_time() && other.start_time < self.end_time()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[serde(alias = "consultation", alias = "general")]
    GeneralConsultation,
    #[serde(alias = "followup")]
    FollowUp,
    #[serde(alias = "urgent")]
    Emergency,
    #[serde(alias = "virtual", alias = "remote")]
    Telehealth,
    Procedure,
}

impl AppointmentType {
    /// Whether a booking of this type may have its duration shortened by a
    /// split resolution. Procedures and emergencies keep their full slot.
    pub fn allows_shortening(&self) -> bool {
        matches!(
            self,
            AppointmentType::GeneralConsultation
                | AppointmentType::FollowUp
                | AppointmentType::Telehealth
        )
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentType::GeneralConsultation => write!(f, "general_consultation"),
            AppointmentType::FollowUp => write!(f, "follow_up"),
            AppointmentType::Emergency => write!(f, "emergency"),
            AppointmentType::Telehealth => write!(f, "telehealth"),
            AppointmentType::Procedure => write!(f, "procedure"),
        }
    }
}

// ==============================================================================
// STORE PATCH AND WINDOW MODELS
// ==============================================================================

/// Partial update applied through the appointment store. The patch carries the
/// version the caller read; the store rejects it if the row has moved on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentPatch {
    pub start_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub status: Option<AppointmentStatus>,
    pub expected_version: u64,
}

impl AppointmentPatch {
    pub fn with_version(expected_version: u64) -> Self {
        Self {
            start_time: None,
            duration_minutes: None,
            status: None,
            expected_version,
        }
    }

    pub fn start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn duration_minutes(mut self, duration_minutes: i32) -> Self {
        self.duration_minutes = Some(duration_minutes);
        self
    }

    pub fn status(mut self, status: AppointmentStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && end <= self.end
    }
}

/// A contiguous stretch of working hours for one doctor (working hours minus
/// existing leave), as reported by the availability source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AvailabilityWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn covers(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= start && end <= self.end
    }
}
