pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::NotificationError;
pub use models::*;
pub use router::notification_routes;
pub use services::dispatcher::{LogTransport, NotificationDispatcher, NotificationQueue, NotificationTransport};
pub use services::worker::NotificationWorker;
