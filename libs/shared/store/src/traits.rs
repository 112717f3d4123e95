use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use shared_models::{Appointment, AppointmentPatch, AvailabilityWindow, TimeWindow};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("appointment not found")]
    NotFound,

    #[error("appointment modified concurrently (expected version {expected}, found {found})")]
    ConcurrentModification { expected: u64, found: u64 },

    #[error("storage error: {0}")]
    Backend(String),
}

/// Authoritative set of appointments. Mutations go through versioned patches;
/// a patch carrying a stale version is rejected with `ConcurrentModification`.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
        window: TimeWindow,
    ) -> Result<Vec<Appointment>, StoreError>;

    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, StoreError>;

    async fn update_appointment(
        &self,
        id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<Appointment, StoreError>;
}

/// Working hours minus existing leave, per doctor.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn availability(
        &self,
        doctor_id: Uuid,
        window: TimeWindow,
    ) -> Result<Vec<AvailabilityWindow>, StoreError>;
}

/// Feeds the priority rules of the auto-resolution engine.
#[async_trait]
pub trait PatientHistorySource: Send + Sync {
    async fn is_returning_patient(&self, patient_id: Uuid) -> Result<bool, StoreError>;

    async fn is_vip(&self, patient_id: Uuid) -> Result<bool, StoreError>;
}
