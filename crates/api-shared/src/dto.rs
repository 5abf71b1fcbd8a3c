//! Request and response bodies.
//!
//! Domain records (appointments, profiles) are sent as-is; the types here only wrap them
//! into envelopes and carry the request-only fields.

use portal_core::migration::MigrationStatistics;
use portal_core::model::{Appointment, ClassifiedAppointment, Party};
use portal_core::modifications::NotificationEvent;
use portal_core::notify::Notification;
use portal_core::repositories::{AppointmentUpdate, FacilityData, PatientData};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Structured error body; `field` names the offending input on validation failures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassifyReq {
    pub appointments: Vec<Appointment>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ClassifyRes {
    pub results: Vec<ClassifiedAppointment>,
}

/// Dashboard payload: one tab's appointments, triaged, plus any facility-edit
/// notifications raised by this fetch.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AppointmentsRes {
    pub appointments: Vec<ClassifiedAppointment>,
    pub notifications: Vec<NotificationEvent>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
pub struct TabQuery {
    /// `upcoming`, `past`, `cancelled` or `completed`; anything else returns every
    /// appointment unfiltered.
    pub tab: Option<String>,
}

#[derive(Clone, Debug, Deserialize, IntoParams)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignInReq {
    pub email: String,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentReq {
    pub changes: AppointmentUpdate,
    pub updated_by: Party,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CancelAppointmentReq {
    pub cancelled_by: Party,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListPatientsRes {
    pub patients: Vec<PatientData>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListFacilitiesRes {
    pub facilities: Vec<FacilityData>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MigrationRunRes {
    pub migrated: usize,
    pub statistics: MigrationStatistics,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationsRes {
    pub notifications: Vec<Notification>,
}
