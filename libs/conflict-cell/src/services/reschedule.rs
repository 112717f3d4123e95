use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use shared_models::{Appointment, AppointmentPatch};
use shared_store::AppointmentStore;

use crate::models::{
    CreateRescheduleRequest, RescheduleRequest, RescheduleRequestStatus, SchedulingError,
};

/// State machine for patient/doctor-initiated reschedule proposals.
/// `pending` is the only state with outgoing transitions; `approved` and
/// `rejected` are terminal.
pub struct RescheduleRequestService {
    store: Arc<dyn AppointmentStore>,
}

impl RescheduleRequestService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        request: &CreateRescheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<RescheduleRequest, SchedulingError> {
        let appointment = self.store.get_appointment(request.appointment_id).await?;
        if !appointment.is_active() {
            return Err(SchedulingError::ValidationError(format!(
                "appointment {} is {} and cannot be rescheduled",
                appointment.id, appointment.status
            )));
        }

        Ok(RescheduleRequest {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            requested_by: request.requested_by,
            current_start_time: appointment.start_time,
            requested_start_time: request.requested_start_time,
            reason: request.reason.clone(),
            status: RescheduleRequestStatus::Pending,
            created_at: now,
            decided_at: None,
        })
    }

    /// Applies the requested time to the appointment and marks the request
    /// approved. The caller re-runs detection afterwards; any conflict the
    /// new time creates is queued, not silently dropped.
    #[instrument(skip(self, request), fields(request_id = %request.id))]
    pub async fn approve(
        &self,
        request: &RescheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<(RescheduleRequest, Appointment), SchedulingError> {
        self.ensure_pending(request)?;

        let appointment = self.store.get_appointment(request.appointment_id).await?;
        let patch = AppointmentPatch::with_version(appointment.version)
            .start_time(request.requested_start_time);
        let updated = self.store.update_appointment(appointment.id, patch).await?;

        let mut approved = request.clone();
        approved.status = RescheduleRequestStatus::Approved;
        approved.decided_at = Some(now);

        info!(
            "Reschedule request {} approved: appointment {} moved to {}",
            request.id, updated.id, request.requested_start_time
        );

        Ok((approved, updated))
    }

    /// Records the rejection. No side effects beyond the status change.
    pub fn reject(
        &self,
        request: &RescheduleRequest,
        now: DateTime<Utc>,
    ) -> Result<RescheduleRequest, SchedulingError> {
        self.ensure_pending(request)?;

        let mut rejected = request.clone();
        rejected.status = RescheduleRequestStatus::Rejected;
        rejected.decided_at = Some(now);

        info!("Reschedule request {} rejected", request.id);
        Ok(rejected)
    }

    fn ensure_pending(&self, request: &RescheduleRequest) -> Result<(), SchedulingError> {
        if request.status != RescheduleRequestStatus::Pending {
            return Err(SchedulingError::InvalidState(request.status));
        }
        Ok(())
    }
}
