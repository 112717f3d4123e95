pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

// Re-export all models and services for external use
pub use models::*;
pub use services::*;

// Specifically re-export the engine and outcome types
pub use models::{
    AutoRescheduleSettings, AutoResolveOutcome, ConflictResolution, ConflictSeverity,
    ConflictType, ScheduleConflict, SchedulingError,
};
pub use services::engine::ConflictEngine;
