use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Duration;
use tracing::{debug, error, info};

use crate::error::NotificationError;
use crate::models::WorkerConfig;
use crate::services::dispatcher::{NotificationQueue, NotificationTransport};

/// Background delivery worker. Polls the queue for due notifications and
/// drives them to dispatched or failed, retrying with a fixed backoff.
/// Delivery failures never propagate back to the scheduling engine.
pub struct NotificationWorker {
    queue: Arc<NotificationQueue>,
    transport: Arc<dyn NotificationTransport>,
    config: WorkerConfig,
    is_shutdown: RwLock<bool>,
}

impl NotificationWorker {
    pub fn new(
        queue: Arc<NotificationQueue>,
        transport: Arc<dyn NotificationTransport>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            transport,
            config,
            is_shutdown: RwLock::new(false),
        }
    }

    pub async fn run(&self) -> Result<(), NotificationError> {
        info!("Notification worker started");

        loop {
            if *self.is_shutdown.read().await {
                debug!("Notification worker received shutdown signal");
                break;
            }

            let delivered = self.process_due_once().await;
            if delivered == 0 {
                tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            }
        }

        info!("Notification worker stopped");
        Ok(())
    }

    /// One delivery pass over everything currently due. Returns the number of
    /// successful deliveries. Exposed for deterministic tests.
    pub async fn process_due_once(&self) -> usize {
        let due = self.queue.due(Utc::now()).await;
        let mut delivered = 0;

        for notification in due {
            let outcome = self.transport.deliver(&notification).await;
            match &outcome {
                Ok(()) => delivered += 1,
                Err(e) => {
                    error!(
                        "Delivery attempt {} for notification {} failed: {}",
                        notification.attempts + 1,
                        notification.id.0,
                        e
                    );
                }
            }
            let failed = outcome.is_err();
            self.queue
                .record_attempt(notification.id, outcome, self.config.max_attempts)
                .await;

            if failed {
                tokio::time::sleep(Duration::from_millis(self.config.retry_backoff_ms)).await;
            }
        }

        delivered
    }

    pub async fn shutdown(&self) {
        let mut is_shutdown = self.is_shutdown.write().await;
        *is_shutdown = true;
    }
}
