use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::{Appointment, AppointmentPatch, AvailabilityWindow, TimeWindow};

use crate::traits::{AppointmentStore, AvailabilitySource, PatientHistorySource, StoreError};

/// In-memory appointment store with optimistic versioning. Every committed
/// patch bumps the row version; a patch whose `expected_version` is stale is
/// rejected without mutating anything.
#[derive(Default)]
pub struct MemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl MemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, appointments: Vec<Appointment>) {
        let mut map = self.appointments.write().await;
        for appointment in appointments {
            map.insert(appointment.id, appointment);
        }
    }
}

#[async_trait]
impl AppointmentStore for MemoryAppointmentStore {
    async fn appointments_for_doctor(
        &self,
        doctor_id: Uuid,
        window: TimeWindow,
    ) -> Result<Vec<Appointment>, StoreError> {
        let map = self.appointments.read().await;
        let mut matching: Vec<Appointment> = map
            .values()
            .filter(|apt| apt.doctor_id == doctor_id)
            .filter(|apt| apt.start_time < window.end && window.start < apt.end_time())
            .cloned()
            .collect();
        matching.sort_by_key(|apt| (apt.start_time, apt.id));
        Ok(matching)
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Appointment, StoreError> {
        let map = self.appointments.read().await;
        map.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        patch: AppointmentPatch,
    ) -> Result<Appointment, StoreError> {
        let mut map = self.appointments.write().await;
        let appointment = map.get_mut(&id).ok_or(StoreError::NotFound)?;

        if appointment.version != patch.expected_version {
            return Err(StoreError::ConcurrentModification {
                expected: patch.expected_version,
                found: appointment.version,
            });
        }

        if let Some(start_time) = patch.start_time {
            appointment.start_time = start_time;
        }
        if let Some(duration_minutes) = patch.duration_minutes {
            appointment.duration_minutes = duration_minutes;
        }
        if let Some(status) = patch.status {
            appointment.status = status;
        }
        appointment.version += 1;
        appointment.updated_at = Utc::now();

        debug!("Appointment {} patched to version {}", id, appointment.version);
        Ok(appointment.clone())
    }
}

/// In-memory availability source keyed by doctor.
#[derive(Default)]
pub struct MemoryAvailabilitySource {
    windows: RwLock<HashMap<Uuid, Vec<AvailabilityWindow>>>,
}

impl MemoryAvailabilitySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_availability(&self, doctor_id: Uuid, mut windows: Vec<AvailabilityWindow>) {
        windows.sort_by_key(|w| w.start);
        self.windows.write().await.insert(doctor_id, windows);
    }
}

#[async_trait]
impl AvailabilitySource for MemoryAvailabilitySource {
    async fn availability(
        &self,
        doctor_id: Uuid,
        window: TimeWindow,
    ) -> Result<Vec<AvailabilityWindow>, StoreError> {
        let map = self.windows.read().await;
        let windows = map
            .get(&doctor_id)
            .map(|windows| {
                windows
                    .iter()
                    .filter(|w| w.start < window.end && window.start < w.end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        Ok(windows)
    }
}

/// In-memory patient history flags.
#[derive(Default)]
pub struct MemoryPatientHistory {
    returning: RwLock<HashSet<Uuid>>,
    vip: RwLock<HashSet<Uuid>>,
}

impl MemoryPatientHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_returning(&self, patient_id: Uuid) {
        self.returning.write().await.insert(patient_id);
    }

    pub async fn mark_vip(&self, patient_id: Uuid) {
        self.vip.write().await.insert(patient_id);
    }
}

#[async_trait]
impl PatientHistorySource for MemoryPatientHistory {
    async fn is_returning_patient(&self, patient_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.returning.read().await.contains(&patient_id))
    }

    async fn is_vip(&self, patient_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.vip.read().await.contains(&patient_id))
    }
}
