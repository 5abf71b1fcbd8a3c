//! # Portal Core
//!
//! Core business logic for the care portal: appointment triage, dashboard filtering,
//! facility-edit notifications, the urgency backfill, and the file-backed record store.
//!
//! - [`triage`] classifies appointment urgency (stored value, memo, external evaluator,
//!   keyword fallback)
//! - [`filter`] selects and orders appointments for the dashboard tabs
//! - [`modifications`] turns recent facility edits into patient notifications
//! - [`migration`] backfills urgencies and reports progress
//! - [`refresh`] drives push/poll appointment feeds
//! - [`repositories`] holds patient, facility and appointment records
//!
//! **No API concerns**: HTTP servers and request authentication belong in `api-rest` and
//! `api-shared`.

pub mod config;
pub mod constants;
pub mod error;
pub mod filter;
pub mod logging;
pub mod migration;
pub mod model;
pub mod modifications;
pub mod notify;
pub mod refresh;
pub mod repositories;
pub mod triage;

pub use config::CoreConfig;
pub use error::{PortalError, PortalResult};
pub use filter::{filter_appointments, filter_by_tab_name, AppointmentTab};
pub use migration::{MigrationService, MigrationStatistics};
pub use model::{
    Appointment, AppointmentStatus, ClassifiedAppointment, FieldChange, ModificationEntry, Party,
    Urgency, UrgencyLevel, UrgencyResult,
};
pub use modifications::{detect_modifications, detect_modifications_within, NotificationEvent};
pub use notify::{NotificationKind, Notifier};
pub use triage::TriageService;

pub use portal_types::{EmailAddress, NonEmptyText, TextError};
pub use portal_uuid::ShardableUuid;
