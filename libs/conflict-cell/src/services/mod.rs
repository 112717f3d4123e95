pub mod auto_resolve;
pub mod classifier;
pub mod detector;
pub mod engine;
pub mod notify;
pub mod reschedule;
pub mod resolution;

pub use auto_resolve::AutoResolutionService;
pub use engine::ConflictEngine;
pub use reschedule::RescheduleRequestService;
pub use resolution::ManualResolutionService;
