use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use notification_cell::NotificationDispatcher;
use shared_models::{Appointment, AppointmentPatch, AppointmentStatus};
use shared_store::AppointmentStore;

use crate::models::{
    ConflictResolution, ManualResolutionRequest, NotificationSettings, ResolutionType,
    ScheduleConflict, SchedulingError,
};
use crate::services::auto_resolve::AutoResolutionService;
use crate::services::notify;

/// Applies an operator-chosen resolution to a conflict. All validation
/// happens before any store write, so a rejected resolution leaves the
/// schedule untouched.
pub struct ManualResolutionService {
    store: Arc<dyn AppointmentStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl ManualResolutionService {
    pub fn new(store: Arc<dyn AppointmentStore>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    #[instrument(skip(self, conflict, request, auto_resolver, notification_settings), fields(conflict_id = %conflict.id))]
    pub async fn resolve(
        &self,
        conflict: &ScheduleConflict,
        request: &ManualResolutionRequest,
        auto_resolver: &AutoResolutionService,
        notification_settings: &NotificationSettings,
        now: DateTime<Utc>,
    ) -> Result<ConflictResolution, SchedulingError> {
        if conflict.resolved {
            return Err(SchedulingError::InvalidResolution(
                "conflict is already resolved".to_string(),
            ));
        }

        let (new_start_time, touched) = match request.resolution_type {
            ResolutionType::Reschedule => {
                let moved = self.apply_reschedule(conflict, request, auto_resolver, now).await?;
                (request.new_start_time, vec![moved])
            }
            ResolutionType::Cancel => {
                let cancelled = self.apply_cancel(conflict, request).await?;
                (None, vec![cancelled])
            }
            ResolutionType::Override => {
                // Explicit acknowledgment that both bookings proceed; nothing
                // is mutated.
                (None, Vec::new())
            }
            ResolutionType::Split => {
                let split = self.apply_split(conflict).await?;
                (None, split)
            }
        };

        let resolution = ConflictResolution {
            id: Uuid::new_v4(),
            conflict_id: conflict.id,
            resolution_type: request.resolution_type,
            new_start_time,
            reason: request.reason.clone(),
            auto_resolved: false,
            resolved_by: request.resolved_by.clone(),
            resolved_at: Utc::now(),
        };

        info!(
            "Conflict {} resolved manually ({}) by {}",
            conflict.id, request.resolution_type, request.resolved_by
        );

        for appointment in &touched {
            notify::notify_resolution(
                &self.dispatcher,
                &resolution,
                appointment,
                notification_settings,
                now,
            )
            .await;
        }

        Ok(resolution)
    }

    async fn apply_reschedule(
        &self,
        conflict: &ScheduleConflict,
        request: &ManualResolutionRequest,
        auto_resolver: &AutoResolutionService,
        now: DateTime<Utc>,
    ) -> Result<Appointment, SchedulingError> {
        let target = self.target_appointment(conflict, request).await?;
        let Some(new_start) = request.new_start_time else {
            return Err(SchedulingError::ValidationError(
                "reschedule resolution requires a new start time".to_string(),
            ));
        };

        if auto_resolver
            .would_create_double_booking(request, &target, now)
            .await?
        {
            return Err(SchedulingError::InvalidResolution(format!(
                "moving appointment {} to {} would create a new double booking",
                target.id, new_start
            )));
        }

        let patch = AppointmentPatch::with_version(target.version).start_time(new_start);
        let moved = self.store.update_appointment(target.id, patch).await?;
        Ok(moved)
    }

    async fn apply_cancel(
        &self,
        conflict: &ScheduleConflict,
        request: &ManualResolutionRequest,
    ) -> Result<Appointment, SchedulingError> {
        let target = self.target_appointment(conflict, request).await?;
        let patch =
            AppointmentPatch::with_version(target.version).status(AppointmentStatus::Cancelled);
        let cancelled = self.store.update_appointment(target.id, patch).await?;
        Ok(cancelled)
    }

    /// Shortens both appointments so their intervals become disjoint, meeting
    /// at the midpoint of the shared interval. Requires both types to permit
    /// a shortened duration.
    async fn apply_split(
        &self,
        conflict: &ScheduleConflict,
    ) -> Result<Vec<Appointment>, SchedulingError> {
        if conflict.appointment_ids.len() != 2 {
            return Err(SchedulingError::InvalidResolution(
                "split applies only to conflicts between exactly two appointments".to_string(),
            ));
        }

        let mut a = self.store.get_appointment(conflict.appointment_ids[0]).await?;
        let mut b = self.store.get_appointment(conflict.appointment_ids[1]).await?;
        if (b.start_time, b.id) < (a.start_time, a.id) {
            std::mem::swap(&mut a, &mut b);
        }

        if !a.is_active() || !b.is_active() || !a.overlaps(&b) {
            return Err(SchedulingError::InvalidResolution(
                "appointments no longer overlap; nothing to split".to_string(),
            ));
        }
        if !a.appointment_type.allows_shortening() || !b.appointment_type.allows_shortening() {
            return Err(SchedulingError::InvalidResolution(
                "one of the appointment types does not permit a shortened duration".to_string(),
            ));
        }

        let overlap_start = b.start_time;
        let overlap_end = a.end_time().min(b.end_time());
        let half = (overlap_end - overlap_start).num_minutes() / 2;
        let boundary = overlap_start + chrono::Duration::minutes(half);

        let a_duration = (boundary - a.start_time).num_minutes() as i32;
        let b_duration = (b.end_time() - boundary).num_minutes() as i32;
        if a_duration < 1 || b_duration < 1 {
            return Err(SchedulingError::InvalidResolution(
                "split would leave a zero-length appointment".to_string(),
            ));
        }

        let shortened_a = self
            .store
            .update_appointment(
                a.id,
                AppointmentPatch::with_version(a.version).duration_minutes(a_duration),
            )
            .await?;
        let shortened_b = match self
            .store
            .update_appointment(
                b.id,
                AppointmentPatch::with_version(b.version)
                    .start_time(boundary)
                    .duration_minutes(b_duration),
            )
            .await
        {
            Ok(apt) => apt,
            Err(e) => {
                // A half-applied split leaves the pair still overlapping;
                // put the first appointment back before reporting the error.
                let restore = AppointmentPatch::with_version(shortened_a.version)
                    .duration_minutes(a.duration_minutes);
                if let Err(restore_err) = self.store.update_appointment(a.id, restore).await {
                    warn!(
                        "Failed to restore appointment {} after aborted split: {}",
                        a.id, restore_err
                    );
                }
                return Err(e.into());
            }
        };

        Ok(vec![shortened_a, shortened_b])
    }

    async fn target_appointment(
        &self,
        conflict: &ScheduleConflict,
        request: &ManualResolutionRequest,
    ) -> Result<Appointment, SchedulingError> {
        let Some(target_id) = request.target_appointment_id else {
            return Err(SchedulingError::ValidationError(format!(
                "{} resolution requires a target appointment",
                request.resolution_type
            )));
        };
        if !conflict.appointment_ids.contains(&target_id) {
            return Err(SchedulingError::ValidationError(format!(
                "appointment {} is not part of conflict {}",
                target_id, conflict.id
            )));
        }
        Ok(self.store.get_appointment(target_id).await?)
    }
}
