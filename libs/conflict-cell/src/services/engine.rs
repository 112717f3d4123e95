use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use notification_cell::NotificationDispatcher;
use shared_models::{Appointment, AppointmentStatus, TimeWindow};
use shared_store::{AppointmentStore, AvailabilitySource, PatientHistorySource};

use crate::models::{
    AutoRescheduleSettings, AutoResolveOutcome, ConflictResolution, ConflictType,
    CreateRescheduleRequest, ManualResolutionRequest, RescheduleRequest, ResolutionType,
    ScanReport, ScheduleConflict, SchedulingError, SuggestedSlot, UnresolvedReason,
    VersionedSettings,
};
use crate::services::auto_resolve::AutoResolutionService;
use crate::services::resolution::ManualResolutionService;
use crate::services::reschedule::RescheduleRequestService;
use crate::services::detector;

/// How far ahead a detection pass scans a doctor's schedule.
const DETECTION_WINDOW_HOURS: i64 = 14 * 24;

/// Facade over the scheduling-conflict pipeline. Owns the conflict and
/// reschedule-request ledgers plus the append-only resolution history, and
/// serializes every mutating operation per doctor: operations against
/// different doctors proceed independently, operations against the same
/// doctor are mutually exclusive.
pub struct ConflictEngine {
    store: Arc<dyn AppointmentStore>,
    availability: Arc<dyn AvailabilitySource>,
    auto_resolver: AutoResolutionService,
    manual: ManualResolutionService,
    reschedule: RescheduleRequestService,
    settings: RwLock<VersionedSettings>,
    conflicts: RwLock<HashMap<Uuid, ScheduleConflict>>,
    resolutions: RwLock<Vec<ConflictResolution>>,
    requests: RwLock<HashMap<Uuid, RescheduleRequest>>,
    doctor_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ConflictEngine {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        availability: Arc<dyn AvailabilitySource>,
        history: Arc<dyn PatientHistorySource>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        settings: AutoRescheduleSettings,
    ) -> Self {
        let auto_resolver = AutoResolutionService::new(
            Arc::clone(&store),
            Arc::clone(&availability),
            history,
            Arc::clone(&dispatcher),
        );
        let manual = ManualResolutionService::new(Arc::clone(&store), dispatcher);
        let reschedule = RescheduleRequestService::new(Arc::clone(&store));

        Self {
            store,
            availability,
            auto_resolver,
            manual,
            reschedule,
            settings: RwLock::new(VersionedSettings {
                settings,
                version: 1,
                updated_at: Utc::now(),
            }),
            conflicts: RwLock::new(HashMap::new()),
            resolutions: RwLock::new(Vec::new()),
            requests: RwLock::new(HashMap::new()),
            doctor_locks: Mutex::new(HashMap::new()),
        }
    }

    // ==========================================================================
    // DETECTION
    // ==========================================================================

    /// Runs a detection pass for one doctor and merges the findings into the
    /// conflict ledger. Returns the doctor's open conflicts.
    pub async fn run_detection(
        &self,
        doctor_id: Uuid,
    ) -> Result<Vec<ScheduleConflict>, SchedulingError> {
        let lock = self.doctor_lock(doctor_id).await;
        let _guard = lock.lock().await;
        self.detect_and_merge_locked(doctor_id, Utc::now()).await
    }

    /// Full pipeline for one doctor: detect, classify, and auto-resolve every
    /// open double booking when auto-resolution is enabled.
    #[instrument(skip(self))]
    pub async fn run_scan(&self, doctor_id: Uuid) -> Result<ScanReport, SchedulingError> {
        let lock = self.doctor_lock(doctor_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let open = self.detect_and_merge_locked(doctor_id, now).await?;

        // Settings are read once per invocation, never mid-resolution.
        let settings = self.settings.read().await.settings;

        let mut outcomes = Vec::new();
        if settings.enabled {
            for conflict in open {
                if conflict.conflict_type != ConflictType::DoubleBooking {
                    continue;
                }
                let outcome = self.auto_resolve_locked(conflict.id, &settings, now).await?;
                outcomes.push(outcome);
            }
        }

        let conflicts = self.detect_and_merge_locked(doctor_id, now).await?;
        Ok(ScanReport { conflicts, outcomes })
    }

    async fn detect_and_merge_locked(
        &self,
        doctor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduleConflict>, SchedulingError> {
        let window = TimeWindow::new(now, now + Duration::hours(DETECTION_WINDOW_HOURS));
        let appointments = self.store.appointments_for_doctor(doctor_id, window).await?;

        let windows = self.availability.availability(doctor_id, window).await?;
        let availability_known = !windows.is_empty();
        let mut availability_map = HashMap::new();
        if availability_known {
            availability_map.insert(doctor_id, windows);
        }

        let fresh = detector::detect_conflicts(&appointments, &availability_map, now);

        let mut ledger = self.conflicts.write().await;

        let mut fresh_keys = HashSet::new();
        for conflict in &fresh {
            fresh_keys.insert(conflict.dedup_key());
        }

        let mut existing_open: HashMap<(ConflictType, Vec<Uuid>), Uuid> = HashMap::new();
        for conflict in ledger.values() {
            if conflict.doctor_id == doctor_id && !conflict.resolved {
                existing_open.insert(conflict.dedup_key(), conflict.id);
            }
        }

        for conflict in fresh {
            match existing_open.get(&conflict.dedup_key()) {
                Some(existing_id) => {
                    // Same conflict re-detected: keep its identity, refresh
                    // the recomputed severity.
                    if let Some(existing) = ledger.get_mut(existing_id) {
                        existing.severity = conflict.severity;
                        existing.description = conflict.description;
                    }
                }
                None => {
                    debug!(
                        "Queued new {} conflict {} for doctor {}",
                        conflict.conflict_type, conflict.id, doctor_id
                    );
                    ledger.insert(conflict.id, conflict);
                }
            }
        }

        // Invariant: once the referenced appointments are all cancelled or
        // disjoint, the conflict must be marked resolved. Unavailability
        // conflicts are only closed when availability data was present to
        // re-verify against.
        let mut dissolved = Vec::new();
        for conflict in ledger.values() {
            if conflict.doctor_id != doctor_id || conflict.resolved {
                continue;
            }
            if conflict.conflict_type == ConflictType::RoomConflict {
                // Room conflicts are ingested externally; detection cannot
                // re-verify them.
                continue;
            }
            if conflict.conflict_type == ConflictType::UnavailableDoctor && !availability_known {
                continue;
            }
            if !fresh_keys.contains(&conflict.dedup_key()) {
                dissolved.push(conflict.clone());
            }
        }

        for conflict in dissolved {
            let resolution = self.dissolved_resolution(&conflict, &appointments);
            if let Some(entry) = ledger.get_mut(&conflict.id) {
                entry.resolved = true;
            }
            info!(
                "Conflict {} dissolved: referenced appointments no longer conflict",
                conflict.id
            );
            self.resolutions.write().await.push(resolution);
        }

        let mut open: Vec<ScheduleConflict> = ledger
            .values()
            .filter(|c| c.doctor_id == doctor_id && !c.resolved)
            .cloned()
            .collect();
        open.sort_by_key(|c| (c.detected_at, c.id));
        Ok(open)
    }

    fn dissolved_resolution(
        &self,
        conflict: &ScheduleConflict,
        appointments: &[Appointment],
    ) -> ConflictResolution {
        let any_cancelled = conflict.appointment_ids.iter().any(|id| {
            appointments
                .iter()
                .find(|apt| apt.id == *id)
                .map(|apt| apt.status == AppointmentStatus::Cancelled)
                .unwrap_or(true)
        });
        let resolution_type = if any_cancelled {
            ResolutionType::Cancel
        } else {
            ResolutionType::Reschedule
        };

        ConflictResolution {
            id: Uuid::new_v4(),
            conflict_id: conflict.id,
            resolution_type,
            new_start_time: None,
            reason: "referenced appointments no longer conflict".to_string(),
            auto_resolved: true,
            resolved_by: "detector".to_string(),
            resolved_at: Utc::now(),
        }
    }

    // ==========================================================================
    // RESOLUTION
    // ==========================================================================

    /// Auto-resolves one conflict under its doctor's lock.
    pub async fn auto_resolve_conflict(
        &self,
        conflict_id: Uuid,
    ) -> Result<AutoResolveOutcome, SchedulingError> {
        let conflict = self
            .conflict(conflict_id)
            .await
            .ok_or(SchedulingError::ConflictNotFound)?;

        let lock = self.doctor_lock(conflict.doctor_id).await;
        let _guard = lock.lock().await;

        let settings = self.settings.read().await.settings;
        self.auto_resolve_locked(conflict_id, &settings, Utc::now()).await
    }

    async fn auto_resolve_locked(
        &self,
        conflict_id: Uuid,
        settings: &AutoRescheduleSettings,
        now: DateTime<Utc>,
    ) -> Result<AutoResolveOutcome, SchedulingError> {
        // Re-read under the lock: a racing resolution may have won.
        let conflict = self
            .conflict(conflict_id)
            .await
            .ok_or(SchedulingError::ConflictNotFound)?;
        if conflict.resolved {
            return Err(SchedulingError::InvalidResolution(
                "conflict is already resolved".to_string(),
            ));
        }

        let outcome = self.auto_resolver.auto_resolve(&conflict, settings, now).await?;

        match &outcome {
            AutoResolveOutcome::Resolved(resolution) => {
                self.mark_resolved(conflict_id, resolution.clone()).await;
            }
            AutoResolveOutcome::Unresolved {
                reason: UnresolvedReason::NoLongerConflicting,
            } => {
                // The ledger is stale; the next detection pass closes it.
                self.detect_and_merge_locked(conflict.doctor_id, now).await?;
            }
            AutoResolveOutcome::Unresolved { .. } => {}
        }

        Ok(outcome)
    }

    /// Applies an operator-chosen resolution under the doctor's lock.
    pub async fn resolve_manually(
        &self,
        conflict_id: Uuid,
        request: ManualResolutionRequest,
    ) -> Result<ConflictResolution, SchedulingError> {
        let conflict = self
            .conflict(conflict_id)
            .await
            .ok_or(SchedulingError::ConflictNotFound)?;

        let lock = self.doctor_lock(conflict.doctor_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let conflict = self
            .conflict(conflict_id)
            .await
            .ok_or(SchedulingError::ConflictNotFound)?;
        let notification_settings = self.settings.read().await.settings.notification_settings;

        let resolution = self
            .manual
            .resolve(&conflict, &request, &self.auto_resolver, &notification_settings, now)
            .await?;

        self.mark_resolved(conflict_id, resolution.clone()).await;

        // A split or cancel changes the appointment set; re-detect so the
        // remaining conflicts are reclassified.
        self.detect_and_merge_locked(conflict.doctor_id, now).await?;

        Ok(resolution)
    }

    async fn mark_resolved(&self, conflict_id: Uuid, resolution: ConflictResolution) {
        if let Some(conflict) = self.conflicts.write().await.get_mut(&conflict_id) {
            conflict.resolved = true;
        }
        self.resolutions.write().await.push(resolution);
    }

    // ==========================================================================
    // RESCHEDULE REQUESTS
    // ==========================================================================

    pub async fn create_reschedule_request(
        &self,
        request: CreateRescheduleRequest,
    ) -> Result<RescheduleRequest, SchedulingError> {
        let created = self.reschedule.create(&request, Utc::now()).await?;
        self.requests.write().await.insert(created.id, created.clone());
        Ok(created)
    }

    /// Approves a pending request: applies the requested time, then re-runs
    /// detection for the doctor. Conflicts created by the new time are
    /// queued for follow-up, not silently dropped.
    pub async fn approve_reschedule_request(
        &self,
        request_id: Uuid,
    ) -> Result<(RescheduleRequest, Vec<ScheduleConflict>), SchedulingError> {
        let request = self
            .request(request_id)
            .await
            .ok_or(SchedulingError::RequestNotFound)?;
        let appointment = self.store.get_appointment(request.appointment_id).await?;

        let lock = self.doctor_lock(appointment.doctor_id).await;
        let _guard = lock.lock().await;

        let now = Utc::now();
        let request = self
            .request(request_id)
            .await
            .ok_or(SchedulingError::RequestNotFound)?;
        let (approved, updated) = self.reschedule.approve(&request, now).await?;
        self.requests.write().await.insert(approved.id, approved.clone());

        let conflicts = self.detect_and_merge_locked(updated.doctor_id, now).await?;
        Ok((approved, conflicts))
    }

    pub async fn reject_reschedule_request(
        &self,
        request_id: Uuid,
    ) -> Result<RescheduleRequest, SchedulingError> {
        let request = self
            .request(request_id)
            .await
            .ok_or(SchedulingError::RequestNotFound)?;
        let appointment = self.store.get_appointment(request.appointment_id).await?;

        // Same doctor lock as approval: a request decides exactly once, even
        // when approve and reject race on it.
        let lock = self.doctor_lock(appointment.doctor_id).await;
        let _guard = lock.lock().await;

        let request = self
            .request(request_id)
            .await
            .ok_or(SchedulingError::RequestNotFound)?;
        let rejected = self.reschedule.reject(&request, Utc::now())?;
        self.requests.write().await.insert(rejected.id, rejected.clone());
        Ok(rejected)
    }

    // ==========================================================================
    // QUERIES AND SETTINGS
    // ==========================================================================

    pub async fn open_conflicts(&self) -> Vec<ScheduleConflict> {
        let ledger = self.conflicts.read().await;
        let mut open: Vec<ScheduleConflict> =
            ledger.values().filter(|c| !c.resolved).cloned().collect();
        open.sort_by_key(|c| (c.detected_at, c.id));
        open
    }

    pub async fn conflict(&self, conflict_id: Uuid) -> Option<ScheduleConflict> {
        self.conflicts.read().await.get(&conflict_id).cloned()
    }

    pub async fn resolutions(&self) -> Vec<ConflictResolution> {
        self.resolutions.read().await.clone()
    }

    pub async fn request(&self, request_id: Uuid) -> Option<RescheduleRequest> {
        self.requests.read().await.get(&request_id).cloned()
    }

    /// Up to `limit` free slots for a doctor, using the same availability
    /// scan the auto-resolver uses.
    pub async fn suggest_slots(
        &self,
        doctor_id: Uuid,
        duration_minutes: i32,
        limit: usize,
    ) -> Result<Vec<SuggestedSlot>, SchedulingError> {
        let now = Utc::now();
        let settings = self.settings.read().await.settings;
        let window = TimeWindow::new(now, now + Duration::hours(settings.time_window_hours));

        let (starts, _) = self
            .auto_resolver
            .scan_free_slots(doctor_id, duration_minutes, now, window, None, 10_000, limit)
            .await?;

        Ok(starts
            .into_iter()
            .map(|start_time| SuggestedSlot {
                doctor_id,
                start_time,
                end_time: start_time + Duration::minutes(duration_minutes as i64),
            })
            .collect())
    }

    pub async fn settings(&self) -> VersionedSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(
        &self,
        settings: AutoRescheduleSettings,
    ) -> VersionedSettings {
        let mut current = self.settings.write().await;
        current.settings = settings;
        current.version += 1;
        current.updated_at = Utc::now();
        info!("Auto-reschedule settings updated to version {}", current.version);
        current.clone()
    }

    async fn doctor_lock(&self, doctor_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.doctor_locks.lock().await;
        Arc::clone(locks.entry(doctor_id).or_default())
    }
}
