use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::NotificationError;
use crate::models::{
    DispatcherStats, NotificationId, NotificationMethod, NotificationRequest, NotificationStatus,
    QueuedNotification, Recipient,
};

/// Accepts notification requests from the scheduling engine. The engine treats
/// dispatch as fire-and-forget; delivery and retry happen behind this trait.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn schedule(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationId, NotificationError>;
}

/// Actual delivery channel. Separated from the queue so the retry worker can
/// be exercised against failing transports in tests.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn deliver(&self, notification: &QueuedNotification) -> Result<(), NotificationError>;
}

/// Transport that only logs. Stands in for the email/SMS gateway.
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn deliver(&self, notification: &QueuedNotification) -> Result<(), NotificationError> {
        info!(
            "Delivering {} notification to {}: {}",
            notification.request.method, notification.request.recipient, notification.request.message
        );
        Ok(())
    }
}

/// In-process notification queue with at-least-once delivery semantics,
/// idempotent per (resolution, recipient, method).
#[derive(Default)]
pub struct NotificationQueue {
    entries: RwLock<HashMap<NotificationId, QueuedNotification>>,
    seen: RwLock<HashMap<(Uuid, Recipient, NotificationMethod), NotificationId>>,
    duplicates_suppressed: AtomicU64,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications that are due for a delivery attempt at `now`.
    pub async fn due(&self, now: DateTime<Utc>) -> Vec<QueuedNotification> {
        let entries = self.entries.read().await;
        let mut due: Vec<QueuedNotification> = entries
            .values()
            .filter(|n| n.status == NotificationStatus::Pending && n.request.send_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|n| (n.request.send_at, n.enqueued_at));
        due
    }

    /// Records the outcome of one delivery attempt. Failures keep the entry
    /// pending until `max_attempts` is reached, then mark it failed.
    pub async fn record_attempt(
        &self,
        id: NotificationId,
        outcome: Result<(), NotificationError>,
        max_attempts: u32,
    ) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };

        entry.attempts += 1;
        match outcome {
            Ok(()) => {
                entry.status = NotificationStatus::Dispatched;
                entry.dispatched_at = Some(Utc::now());
                entry.last_error = None;
            }
            Err(e) => {
                entry.last_error = Some(e.to_string());
                if entry.attempts >= max_attempts {
                    entry.status = NotificationStatus::Failed;
                    tracing::warn!(
                        "Notification {} failed after {} attempts: {}",
                        id.0,
                        entry.attempts,
                        e
                    );
                }
            }
        }
    }

    pub async fn pending(&self) -> Vec<QueuedNotification> {
        let entries = self.entries.read().await;
        let mut pending: Vec<QueuedNotification> = entries
            .values()
            .filter(|n| n.status == NotificationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|n| (n.request.send_at, n.enqueued_at));
        pending
    }

    pub async fn get(&self, id: NotificationId) -> Option<QueuedNotification> {
        self.entries.read().await.get(&id).cloned()
    }

    pub async fn stats(&self) -> DispatcherStats {
        let entries = self.entries.read().await;
        let mut stats = DispatcherStats {
            pending: 0,
            dispatched: 0,
            failed: 0,
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
        };
        for entry in entries.values() {
            match entry.status {
                NotificationStatus::Pending => stats.pending += 1,
                NotificationStatus::Dispatched => stats.dispatched += 1,
                NotificationStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[async_trait]
impl NotificationDispatcher for NotificationQueue {
    async fn schedule(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationId, NotificationError> {
        let key = request.dedup_key();

        {
            let seen = self.seen.read().await;
            if let Some(existing) = seen.get(&key) {
                self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Suppressing duplicate notification for resolution {} to {}",
                    request.resolution_id, request.recipient
                );
                return Ok(*existing);
            }
        }

        let mut seen = self.seen.write().await;
        // Re-check under the write lock; a racing schedule may have won.
        if let Some(existing) = seen.get(&key) {
            self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
            return Ok(*existing);
        }

        let id = NotificationId(Uuid::new_v4());
        let queued = QueuedNotification {
            id,
            request,
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            enqueued_at: Utc::now(),
            dispatched_at: None,
        };

        seen.insert(key, id);
        self.entries.write().await.insert(id, queued);

        debug!("Notification {} enqueued", id.0);
        Ok(id)
    }
}
