use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::warn;

use notification_cell::{NotificationDispatcher, NotificationMethod, NotificationRequest, Recipient};
use shared_models::Appointment;

use crate::models::{ConflictResolution, NotificationSettings};

/// Fans a resolution out to the affected patient and doctor. The resolution
/// has already committed; dispatch failures are logged and left to the
/// dispatcher's own retry, never surfaced to the caller.
pub async fn notify_resolution(
    dispatcher: &Arc<dyn NotificationDispatcher>,
    resolution: &ConflictResolution,
    appointment: &Appointment,
    settings: &NotificationSettings,
    now: DateTime<Utc>,
) {
    let reference_time = resolution.new_start_time.unwrap_or(appointment.start_time);
    let preferred_send_at = reference_time - Duration::hours(settings.advance_notice_hours);

    let mut recipients = Vec::new();
    if settings.notify_patient {
        recipients.push(Recipient::Patient(appointment.patient_id));
    }
    if settings.notify_doctor {
        recipients.push(Recipient::Doctor(appointment.doctor_id));
    }

    for recipient in recipients {
        let message = format!(
            "Appointment {} was {}: {}",
            appointment.id, resolution.resolution_type, resolution.reason
        );
        let request = NotificationRequest::for_resolution(
            resolution.id,
            recipient,
            NotificationMethod::Email,
            message,
            preferred_send_at,
            now,
        );
        if let Err(e) = dispatcher.schedule(request).await {
            warn!(
                "Failed to schedule notification for resolution {}: {}",
                resolution.id, e
            );
        }
    }
}
