use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("queue error: {0}")]
    Queue(String),
}
