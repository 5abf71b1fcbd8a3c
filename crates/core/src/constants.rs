//! Constants used throughout the portal core crate.
//!
//! Path and filename constants live here so the store layout is defined in one place.

use std::time::Duration;

/// Default directory for portal data when no explicit directory is configured.
pub const DEFAULT_PORTAL_DATA_DIR: &str = "portal_data";

/// Directory name for patient records.
pub const PATIENTS_DIR_NAME: &str = "patients";

/// Directory name for facility records.
pub const FACILITIES_DIR_NAME: &str = "facilities";

/// Filename for a patient profile.
pub const PATIENT_FILENAME: &str = "patient.yaml";

/// Filename for a facility profile.
pub const FACILITY_FILENAME: &str = "facility.yaml";

/// Filename for a patient's appointment book.
pub const APPOINTMENTS_FILENAME: &str = "appointments.yaml";

/// Facility name used in notifications when an appointment carries none.
pub const DEFAULT_FACILITY_NAME: &str = "the healthcare facility";

/// Facility edits younger than this are announced to the patient.
pub const MODIFICATION_NOTIFY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// How long a notification stays visible.
pub const NOTIFICATION_DISPLAY: Duration = Duration::from_secs(5);

/// Interval between appointment polls when no push source is connected.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Entries an urgency memo cache holds before the oldest are evicted.
pub const URGENCY_CACHE_CAPACITY: usize = 4_096;

/// Upper bound on one external urgency evaluation.
pub const DEFAULT_EVALUATOR_TIMEOUT: Duration = Duration::from_millis(5_000);
