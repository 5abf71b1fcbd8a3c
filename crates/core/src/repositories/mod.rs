//! Record repositories.
//!
//! Patient and facility profiles, appointment books, and the stores behind them.

pub mod appointments;
pub mod facilities;
mod helpers;
pub mod patients;
mod store;
mod tiered;

pub use appointments::{AppointmentService, AppointmentUpdate, NewAppointment};
pub use helpers::RecordLocks;
pub use facilities::{FacilityData, FacilityProfileUpdate, FacilityService, NewFacility, StaffMember};
pub use patients::{
    ConsultationRecord, DocumentRef, NewPatient, PatientData, PatientProfileUpdate, PatientService,
};
pub use store::{AppointmentStore, FileStore, MemoryStore};
pub use tiered::{ReconcileReport, TieredStore};
