use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_store::StoreError;

// ==============================================================================
// CONFLICT MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    DoubleBooking,
    UnavailableDoctor,
    RoomConflict,
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::DoubleBooking => write!(f, "double_booking"),
            ConflictType::UnavailableDoctor => write!(f, "unavailable_doctor"),
            ConflictType::RoomConflict => write!(f, "room_conflict"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictSeverity::Low => write!(f, "low"),
            ConflictSeverity::Medium => write!(f, "medium"),
            ConflictSeverity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConflict {
    pub id: Uuid,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub doctor_id: Uuid,
    /// Referenced appointments, ordered by start time then id. Never empty.
    pub appointment_ids: Vec<Uuid>,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
}

impl ScheduleConflict {
    /// Ledger deduplication key: the same unordered appointment set with the
    /// same conflict type is one conflict, however often it is re-detected.
    pub fn dedup_key(&self) -> (ConflictType, Vec<Uuid>) {
        let mut ids = self.appointment_ids.clone();
        ids.sort();
        (self.conflict_type, ids)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Reschedule,
    Cancel,
    Override,
    Split,
}

impl fmt::Display for ResolutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionType::Reschedule => write!(f, "reschedule"),
            ResolutionType::Cancel => write!(f, "cancel"),
            ResolutionType::Override => write!(f, "override"),
            ResolutionType::Split => write!(f, "split"),
        }
    }
}

/// Append-only record of how a conflict was closed. Created exactly once per
/// resolved conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub id: Uuid,
    pub conflict_id: Uuid,
    pub resolution_type: ResolutionType,
    pub new_start_time: Option<DateTime<Utc>>,
    pub reason: String,
    pub auto_resolved: bool,
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
}

// ==============================================================================
// RESCHEDULE REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestedBy {
    Patient,
    Doctor,
    System,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RescheduleRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for RescheduleRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RescheduleRequestStatus::Pending => write!(f, "pending"),
            RescheduleRequestStatus::Approved => write!(f, "approved"),
            RescheduleRequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub requested_by: RequestedBy,
    pub current_start_time: DateTime<Utc>,
    pub requested_start_time: DateTime<Utc>,
    pub reason: String,
    pub status: RescheduleRequestStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

// ==============================================================================
// SETTINGS MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriorityRules {
    pub emergency_first: bool,
    pub returning_patients: bool,
    pub vip_patients: bool,
}

impl Default for PriorityRules {
    fn default() -> Self {
        Self {
            emergency_first: true,
            returning_patients: true,
            vip_patients: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub notify_patient: bool,
    pub notify_doctor: bool,
    pub advance_notice_hours: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            notify_patient: true,
            notify_doctor: true,
            advance_notice_hours: 24,
        }
    }
}

/// Engine configuration. Read once per invocation, never mutated
/// mid-resolution; updates go through the settings endpoint and bump the
/// version.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutoRescheduleSettings {
    pub enabled: bool,
    pub max_attempts: u32,
    pub time_window_hours: i64,
    pub priority_rules: PriorityRules,
    pub notification_settings: NotificationSettings,
}

impl Default for AutoRescheduleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 48,
            time_window_hours: 72,
            priority_rules: PriorityRules::default(),
            notification_settings: NotificationSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedSettings {
    pub settings: AutoRescheduleSettings,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// RESOLUTION REQUEST/OUTCOME MODELS
// ==============================================================================

/// Operator-chosen resolution payload for the manual handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualResolutionRequest {
    pub resolution_type: ResolutionType,
    /// Which referenced appointment to move or cancel. Required for
    /// reschedule and cancel.
    pub target_appointment_id: Option<Uuid>,
    /// Required for reschedule.
    pub new_start_time: Option<DateTime<Utc>>,
    pub reason: String,
    pub resolved_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRescheduleRequest {
    pub appointment_id: Uuid,
    pub requested_by: RequestedBy,
    pub requested_start_time: DateTime<Utc>,
    pub reason: String,
}

/// Exhausting the search budget is a normal outcome, not an error; the
/// conflict stays open for manual handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoResolveOutcome {
    Resolved(ConflictResolution),
    Unresolved { reason: UnresolvedReason },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Auto-rescheduling is switched off for this scope.
    Disabled,
    /// Only double bookings have an automatic remedy.
    RequiresManualHandling,
    /// No free slot inside the configured time window.
    NoSlotInWindow,
    /// Probe budget exhausted before a free slot was found.
    AttemptsExhausted,
    /// The referenced appointments no longer overlap.
    NoLongerConflicting,
}

/// Free slot offered as an alternative to a conflicting booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedSlot {
    pub doctor_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Result of one detection + auto-resolution pass over a doctor's schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    /// Conflicts still open after the pass.
    pub conflicts: Vec<ScheduleConflict>,
    /// Outcome of each auto-resolution attempt made during the pass.
    pub outcomes: Vec<AutoResolveOutcome>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum SchedulingError {
    #[error("Conflict not found")]
    ConflictNotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Reschedule request not found")]
    RequestNotFound,

    #[error("Invalid resolution: {0}")]
    InvalidResolution(String),

    #[error("Reschedule request is not pending (status: {0})")]
    InvalidState(RescheduleRequestStatus),

    #[error("Appointment was modified concurrently; re-detect and retry")]
    ConcurrentModification,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StoreError(String),
}

impl From<StoreError> for SchedulingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => SchedulingError::AppointmentNotFound,
            StoreError::ConcurrentModification { .. } => SchedulingError::ConcurrentModification,
            StoreError::Backend(msg) => SchedulingError::StoreError(msg),
        }
    }
}
