use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use notification_cell::NotificationDispatcher;
use shared_models::{Appointment, AppointmentPatch, TimeWindow};
use shared_store::{AppointmentStore, AvailabilitySource, PatientHistorySource};

use crate::models::{
    AutoRescheduleSettings, AutoResolveOutcome, ConflictResolution, ConflictType,
    ManualResolutionRequest, PriorityRules, ResolutionType, ScheduleConflict, SchedulingError,
    UnresolvedReason,
};
use crate::services::{detector, notify};

/// Resolver identity recorded on auto-created resolutions.
const AUTO_RESOLVER: &str = "auto-resolver";

/// Searches for a replacement slot for the lower-priority side of a double
/// booking and commits the move. The search is bounded by the configured
/// probe budget and time window and performs no I/O once the schedule and
/// availability are loaded, so it always terminates.
pub struct AutoResolutionService {
    store: Arc<dyn AppointmentStore>,
    availability: Arc<dyn AvailabilitySource>,
    history: Arc<dyn PatientHistorySource>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

/// Deterministic priority of one appointment under the configured rules.
/// Higher priority keeps its slot; ties fall through to creation time, then
/// to appointment id (the higher id moves) so the ranking is total.
struct PriorityRank {
    emergency: bool,
    returning: bool,
    vip: bool,
    created_at: DateTime<Utc>,
    id: Uuid,
}

impl PriorityRank {
    fn outranks(&self, other: &PriorityRank) -> bool {
        if self.emergency != other.emergency {
            return self.emergency;
        }
        if self.returning != other.returning {
            return self.returning;
        }
        if self.vip != other.vip {
            return self.vip;
        }
        if self.created_at != other.created_at {
            return self.created_at < other.created_at;
        }
        self.id < other.id
    }
}

impl AutoResolutionService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        availability: Arc<dyn AvailabilitySource>,
        history: Arc<dyn PatientHistorySource>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            availability,
            history,
            dispatcher,
        }
    }

    /// Attempts to resolve a double-booking conflict by moving its
    /// lower-priority appointment to the earliest free slot at or after its
    /// original time. Exhausting the search budget is a normal outcome
    /// (`Unresolved`), not an error; the caller keeps the conflict open for
    /// manual handling. On success the move has already committed and the
    /// other appointment is untouched.
    #[instrument(skip(self, conflict, settings), fields(conflict_id = %conflict.id))]
    pub async fn auto_resolve(
        &self,
        conflict: &ScheduleConflict,
        settings: &AutoRescheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<AutoResolveOutcome, SchedulingError> {
        if conflict.resolved {
            return Err(SchedulingError::InvalidResolution(
                "conflict is already resolved".to_string(),
            ));
        }
        if !settings.enabled {
            return Ok(AutoResolveOutcome::Unresolved {
                reason: UnresolvedReason::Disabled,
            });
        }
        if conflict.conflict_type != ConflictType::DoubleBooking {
            return Ok(AutoResolveOutcome::Unresolved {
                reason: UnresolvedReason::RequiresManualHandling,
            });
        }
        if conflict.appointment_ids.len() < 2 {
            return Err(SchedulingError::ValidationError(
                "double booking conflict must reference two appointments".to_string(),
            ));
        }

        let first = self.store.get_appointment(conflict.appointment_ids[0]).await?;
        let second = self.store.get_appointment(conflict.appointment_ids[1]).await?;

        if !first.is_active() || !second.is_active() || !first.overlaps(&second) {
            return Ok(AutoResolveOutcome::Unresolved {
                reason: UnresolvedReason::NoLongerConflicting,
            });
        }

        let first_rank = self.rank(&first, &settings.priority_rules).await?;
        let second_rank = self.rank(&second, &settings.priority_rules).await?;
        let (kept, mover) = if first_rank.outranks(&second_rank) {
            (first, second)
        } else {
            (second, first)
        };

        debug!(
            "Keeping appointment {}, searching replacement slot for {}",
            kept.id, mover.id
        );

        let window = TimeWindow::new(now, now + Duration::hours(settings.time_window_hours));
        let lower_bound = now.max(mover.start_time);
        let (slots, exhausted) = self
            .scan_free_slots(
                mover.doctor_id,
                mover.duration_minutes,
                lower_bound,
                window,
                Some(mover.id),
                settings.max_attempts,
                1,
            )
            .await?;

        let Some(new_start) = slots.into_iter().next() else {
            let reason = if exhausted {
                UnresolvedReason::AttemptsExhausted
            } else {
                UnresolvedReason::NoSlotInWindow
            };
            info!("No replacement slot for appointment {}: {:?}", mover.id, reason);
            return Ok(AutoResolveOutcome::Unresolved { reason });
        };

        let patch = AppointmentPatch::with_version(mover.version).start_time(new_start);
        let moved = self.store.update_appointment(mover.id, patch).await?;

        let resolution = ConflictResolution {
            id: Uuid::new_v4(),
            conflict_id: conflict.id,
            resolution_type: ResolutionType::Reschedule,
            new_start_time: Some(new_start),
            reason: format!(
                "auto-rescheduled appointment {} from {} to {}",
                moved.id, mover.start_time, new_start
            ),
            auto_resolved: true,
            resolved_by: AUTO_RESOLVER.to_string(),
            resolved_at: Utc::now(),
        };

        info!(
            "Auto-resolved conflict {}: moved appointment {} to {}",
            conflict.id, moved.id, new_start
        );

        // Resolution commits before dispatch; notification problems are the
        // dispatcher's to retry.
        notify::notify_resolution(
            &self.dispatcher,
            &resolution,
            &moved,
            &settings.notification_settings,
            now,
        )
        .await;

        Ok(AutoResolveOutcome::Resolved(resolution))
    }

    /// Free-slot scan shared by auto-resolution and the suggested-slot
    /// endpoint. Walks the doctor's availability windows in fixed increments
    /// of `duration_minutes`, skipping anything that overlaps an existing
    /// active appointment, and returns up to `limit` starts at or after
    /// `lower_bound`. Also reports whether the probe budget ran out.
    pub async fn scan_free_slots(
        &self,
        doctor_id: Uuid,
        duration_minutes: i32,
        lower_bound: DateTime<Utc>,
        window: TimeWindow,
        exclude_appointment: Option<Uuid>,
        max_probes: u32,
        limit: usize,
    ) -> Result<(Vec<DateTime<Utc>>, bool), SchedulingError> {
        if duration_minutes <= 0 {
            return Err(SchedulingError::ValidationError(
                "slot duration must be positive".to_string(),
            ));
        }

        let mut windows = self.availability.availability(doctor_id, window).await?;
        windows.sort_by_key(|w| w.start);

        let busy: Vec<Appointment> = self
            .store
            .appointments_for_doctor(doctor_id, window)
            .await?
            .into_iter()
            .filter(|apt| apt.is_active() && Some(apt.id) != exclude_appointment)
            .collect();

        let duration = Duration::minutes(duration_minutes as i64);
        let mut found = Vec::new();
        let mut probes = 0u32;

        for avail in windows {
            let window_end = avail.end.min(window.end);
            let mut candidate = avail.start;

            while candidate + duration <= window_end {
                if candidate >= lower_bound {
                    if probes >= max_probes {
                        return Ok((found, true));
                    }
                    probes += 1;

                    let candidate_end = candidate + duration;
                    let blocked = busy
                        .iter()
                        .any(|apt| detector::interval_overlaps(apt, candidate, candidate_end));
                    if !blocked {
                        found.push(candidate);
                        if found.len() >= limit {
                            return Ok((found, false));
                        }
                    }
                }
                candidate += duration;
            }
        }

        Ok((found, false))
    }

    /// Checks whether a manual reschedule payload would itself create a new
    /// double booking, by re-running the detector over the doctor's schedule
    /// with the move applied.
    pub async fn would_create_double_booking(
        &self,
        request: &ManualResolutionRequest,
        target: &Appointment,
        now: DateTime<Utc>,
    ) -> Result<bool, SchedulingError> {
        let Some(new_start) = request.new_start_time else {
            return Err(SchedulingError::ValidationError(
                "reschedule resolution requires a new start time".to_string(),
            ));
        };

        let duration = Duration::minutes(target.duration_minutes as i64);
        let probe_window = TimeWindow::new(new_start - duration, new_start + duration + duration);
        let mut schedule = self
            .store
            .appointments_for_doctor(target.doctor_id, probe_window)
            .await?;
        schedule.retain(|apt| apt.id != target.id);

        let mut moved = target.clone();
        moved.start_time = new_start;
        schedule.push(moved);

        let conflicts = detector::detect_conflicts(&schedule, &HashMap::new(), now);
        Ok(conflicts
            .iter()
            .any(|c| c.conflict_type == ConflictType::DoubleBooking && c.appointment_ids.contains(&target.id)))
    }

    async fn rank(
        &self,
        apt: &Appointment,
        rules: &PriorityRules,
    ) -> Result<PriorityRank, SchedulingError> {
        let emergency = rules.emergency_first
            && apt.appointment_type == shared_models::AppointmentType::Emergency;
        let returning = rules.returning_patients
            && self.history.is_returning_patient(apt.patient_id).await?;
        let vip = rules.vip_patients && self.history.is_vip(apt.patient_id).await?;

        Ok(PriorityRank {
            emergency,
            returning,
            vip,
            created_at: apt.created_at,
            id: apt.id,
        })
    }
}
