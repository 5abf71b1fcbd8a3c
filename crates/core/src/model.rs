//! Appointment domain types.
//!
//! Field names serialise in camelCase (`modificationHistory`, `updatedBy`, `facilityName`)
//! so stored appointment books and API payloads share one shape.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Lifecycle status of an appointment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Pending,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// Statuses that still count as upcoming when the date has not passed.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed | AppointmentStatus::Pending
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "confirmed" => Ok(AppointmentStatus::Confirmed),
            "pending" => Ok(AppointmentStatus::Pending),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status '{other}'")),
        }
    }
}

/// Which side of the portal performed an action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    #[default]
    Patient,
    Facility,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Patient => f.write_str("patient"),
            Party::Facility => f.write_str("facility"),
        }
    }
}

/// Three-level triage severity. GREEN is the default.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum UrgencyLevel {
    Red,
    Orange,
    #[default]
    Green,
}

impl UrgencyLevel {
    /// Canonical label shown alongside the colour.
    pub fn label(self) -> &'static str {
        match self {
            UrgencyLevel::Red => "CRITICAL",
            UrgencyLevel::Orange => "VERY URGENT",
            UrgencyLevel::Green => "ROUTINE",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyLevel::Red => "RED",
            UrgencyLevel::Orange => "ORANGE",
            UrgencyLevel::Green => "GREEN",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UrgencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RED" => Ok(UrgencyLevel::Red),
            "ORANGE" => Ok(UrgencyLevel::Orange),
            "GREEN" => Ok(UrgencyLevel::Green),
            other => Err(format!("unknown urgency level '{other}'")),
        }
    }
}

/// Urgency annotation persisted on an appointment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Urgency {
    pub level: UrgencyLevel,
    #[serde(default)]
    pub description: String,
}

/// Outcome of classifying one appointment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UrgencyResult {
    pub level: UrgencyLevel,
    /// Human-readable label, e.g. `CRITICAL`.
    pub urgency: String,
}

impl UrgencyResult {
    pub fn from_level(level: UrgencyLevel) -> Self {
        Self {
            level,
            urgency: level.label().to_owned(),
        }
    }

    pub fn routine() -> Self {
        Self::from_level(UrgencyLevel::Green)
    }

    /// Form in which a result is written back to the appointment.
    pub fn to_urgency(&self) -> Urgency {
        Urgency {
            level: self.level,
            description: self.urgency.clone(),
        }
    }
}

/// Before/after values of one field in an audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FieldChange {
    #[schema(value_type = Object)]
    pub from: serde_json::Value,
    #[schema(value_type = Object)]
    pub to: serde_json::Value,
}

impl FieldChange {
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// One audited edit of an appointment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModificationEntry {
    pub timestamp: DateTime<Utc>,
    pub modified_by: Party,
    pub changes: BTreeMap<String, FieldChange>,
}

/// A scheduled interaction between a patient and a facility.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    #[serde(default)]
    pub patient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_name: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub doctor: String,
    #[serde(rename = "type", default)]
    pub appointment_type: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modification_history: Vec<ModificationEntry>,
    #[serde(default)]
    pub booked_by: Party,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<Party>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// Minimal appointment with the given identity, date and status.
    pub fn new(id: impl Into<String>, date: NaiveDate, status: AppointmentStatus) -> Self {
        Self {
            id: id.into(),
            patient_id: String::new(),
            facility_id: None,
            facility_name: None,
            date,
            time: String::new(),
            status,
            doctor: String::new(),
            appointment_type: String::new(),
            notes: String::new(),
            urgency: None,
            modification_history: Vec::new(),
            booked_by: Party::Patient,
            updated_by: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn last_modification(&self) -> Option<&ModificationEntry> {
        self.modification_history.last()
    }
}

/// An appointment paired with its triage result, as shown on dashboards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassifiedAppointment {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub triage: UrgencyResult,
}
