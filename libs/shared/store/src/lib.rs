pub mod memory;
pub mod traits;

pub use memory::{MemoryAppointmentStore, MemoryAvailabilitySource, MemoryPatientHistory};
pub use traits::{AppointmentStore, AvailabilitySource, PatientHistorySource, StoreError};
