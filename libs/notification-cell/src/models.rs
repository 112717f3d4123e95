use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMethod {
    Email,
    Sms,
}

impl fmt::Display for NotificationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationMethod::Email => write!(f, "email"),
            NotificationMethod::Sms => write!(f, "sms"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Patient(Uuid),
    Doctor(Uuid),
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Patient(id) => write!(f, "patient {}", id),
            Recipient::Doctor(id) => write!(f, "doctor {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct NotificationId(pub Uuid);

/// A request to inform a recipient about a resolution. Scheduling is
/// best-effort on timing: when the preferred send time has already passed the
/// request is sent immediately and flagged short-notice instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub resolution_id: Uuid,
    pub recipient: Recipient,
    pub method: NotificationMethod,
    pub message: String,
    pub send_at: DateTime<Utc>,
    pub short_notice: bool,
}

impl NotificationRequest {
    /// Builds a request aimed at `preferred_send_at`; falls back to immediate
    /// delivery with the short-notice flag when that moment has passed.
    pub fn for_resolution(
        resolution_id: Uuid,
        recipient: Recipient,
        method: NotificationMethod,
        message: String,
        preferred_send_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let short_notice = preferred_send_at <= now;
        Self {
            resolution_id,
            recipient,
            method,
            message,
            send_at: if short_notice { now } else { preferred_send_at },
            short_notice,
        }
    }

    /// Idempotency key: at-least-once delivery, deduplicated per
    /// (resolution, recipient, method).
    pub fn dedup_key(&self) -> (Uuid, Recipient, NotificationMethod) {
        (self.resolution_id, self.recipient, self.method)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Dispatched,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub id: NotificationId,
    pub request: NotificationRequest,
    pub status: NotificationStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherStats {
    pub pending: usize,
    pub dispatched: usize,
    pub failed: usize,
    pub duplicates_suppressed: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_backoff_ms: 500,
            poll_interval_ms: 200,
        }
    }
}
