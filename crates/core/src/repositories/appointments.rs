//! Appointment booking and lifecycle.
//!
//! Appointments are never deleted; cancelling is a status transition and a cancelled
//! appointment accepts no further changes. Every edit made after booking appends a
//! [`ModificationEntry`] listing the fields that changed, which is what drives the
//! "your appointment has been updated" notifications on the patient side.

use super::helpers::RecordLocks;
use super::store::AppointmentStore;
use crate::error::{PortalError, PortalResult};
use crate::model::{
    Appointment, AppointmentStatus, FieldChange, ModificationEntry, Party, Urgency,
};
use chrono::{NaiveDate, Utc};
use portal_types::NonEmptyText;
use portal_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

/// Booking request.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub patient_id: String,
    #[serde(default)]
    pub facility_id: Option<String>,
    #[serde(default)]
    pub facility_name: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: String,
    #[serde(rename = "type", default)]
    pub appointment_type: String,
    #[serde(default)]
    pub doctor: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub booked_by: Party,
}

/// Partial edit of an appointment's details. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdate {
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub doctor: Option<String>,
    #[serde(rename = "type")]
    pub appointment_type: Option<String>,
    pub notes: Option<String>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Clone)]
pub struct AppointmentService {
    store: Arc<dyn AppointmentStore>,
    locks: RecordLocks,
}

impl std::fmt::Debug for AppointmentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppointmentService").finish_non_exhaustive()
    }
}

impl AppointmentService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            locks: RecordLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn AppointmentStore> {
        &self.store
    }

    /// Locks held around every load-modify-save of a patient's appointment book.
    pub fn locks(&self) -> &RecordLocks {
        &self.locks
    }

    /// Books an appointment.
    ///
    /// Required fields are checked first, then the patient identifier is checked for shape
    /// and for a registered patient. Nothing is written unless every check passes.
    ///
    /// Patient bookings start as `pending` until the facility confirms; facility bookings
    /// start as `scheduled`.
    pub fn create(&self, new: NewAppointment) -> PortalResult<Appointment> {
        let date = new
            .date
            .ok_or_else(|| PortalError::validation("date", "appointment date is required"))?;
        let time = NonEmptyText::new(&new.time)
            .map_err(|_| PortalError::validation("time", "appointment time is required"))?;
        let appointment_type = NonEmptyText::new(&new.appointment_type)
            .map_err(|_| PortalError::validation("type", "appointment type is required"))?;

        if !ShardableUuid::is_canonical(new.patient_id.trim()) {
            return Err(PortalError::validation(
                "patientId",
                "invalid patient identifier",
            ));
        }
        let patient_id = new.patient_id.trim().to_owned();
        if !self.store.patient_exists(&patient_id)? {
            return Err(PortalError::validation(
                "patientId",
                "no patient is registered with this identifier",
            ));
        }

        let now = Utc::now();
        let status = match new.booked_by {
            Party::Patient => AppointmentStatus::Pending,
            Party::Facility => AppointmentStatus::Scheduled,
        };
        let mut appointment = Appointment::new(ShardableUuid::new().to_string(), date, status);
        appointment.patient_id = patient_id.clone();
        appointment.facility_id = new.facility_id.filter(|id| !id.trim().is_empty());
        appointment.facility_name = new.facility_name.filter(|name| !name.trim().is_empty());
        appointment.time = time.into_inner();
        appointment.appointment_type = appointment_type.into_inner();
        appointment.doctor = new.doctor.trim().to_owned();
        appointment.notes = new.notes;
        appointment.booked_by = new.booked_by;
        appointment.updated_by = Some(new.booked_by);
        appointment.created_at = Some(now);
        appointment.updated_at = Some(now);

        self.locks.with(&patient_id, || {
            let mut appointments = self.store.load_appointments(&patient_id)?;
            appointments.push(appointment.clone());
            self.store.save_appointments(&patient_id, &appointments)
        })?;

        tracing::info!(
            patient_id = %patient_id,
            appointment_id = %appointment.id,
            booked_by = %new.booked_by,
            "appointment booked"
        );
        Ok(appointment)
    }

    pub fn list_for_patient(&self, patient_id: &str) -> PortalResult<Vec<Appointment>> {
        self.store.load_appointments(patient_id)
    }

    /// Every appointment booked against `facility_id`, across all patients. A patient whose
    /// appointments cannot be read is logged and skipped.
    pub fn list_for_facility(&self, facility_id: &str) -> PortalResult<Vec<Appointment>> {
        let mut found = Vec::new();
        for patient_id in self.store.list_patient_ids()? {
            match self.store.load_appointments(&patient_id) {
                Ok(appointments) => found.extend(
                    appointments
                        .into_iter()
                        .filter(|a| a.facility_id.as_deref() == Some(facility_id)),
                ),
                Err(e) => tracing::warn!(patient_id = %patient_id, "skipping unreadable appointments: {e}"),
            }
        }
        Ok(found)
    }

    pub fn get(&self, patient_id: &str, appointment_id: &str) -> PortalResult<Appointment> {
        self.store
            .load_appointments(patient_id)?
            .into_iter()
            .find(|a| a.id == appointment_id)
            .ok_or_else(|| PortalError::not_found("appointment", appointment_id))
    }

    pub fn update_status(
        &self,
        patient_id: &str,
        appointment_id: &str,
        status: AppointmentStatus,
        by: Party,
    ) -> PortalResult<Appointment> {
        self.update_fields(
            patient_id,
            appointment_id,
            AppointmentUpdate {
                status: Some(status),
                ..AppointmentUpdate::default()
            },
            by,
        )
    }

    /// Applies an edit and records the changed fields in the modification history.
    ///
    /// An edit that changes nothing is not recorded. Changing the notes or type clears a
    /// stored urgency so the appointment is triaged again.
    pub fn update_fields(
        &self,
        patient_id: &str,
        appointment_id: &str,
        update: AppointmentUpdate,
        by: Party,
    ) -> PortalResult<Appointment> {
        if let Some(time) = &update.time {
            NonEmptyText::new(time)
                .map_err(|_| PortalError::validation("time", "appointment time cannot be blank"))?;
        }
        if let Some(kind) = &update.appointment_type {
            NonEmptyText::new(kind)
                .map_err(|_| PortalError::validation("type", "appointment type cannot be blank"))?;
        }

        self.modify(patient_id, appointment_id, |appointment| {
            let mut changes = BTreeMap::new();

            if let Some(date) = update.date {
                record(&mut changes, "date", &appointment.date, &date);
                appointment.date = date;
            }
            if let Some(time) = update.time {
                let time = time.trim().to_owned();
                record(&mut changes, "time", &appointment.time, &time);
                appointment.time = time;
            }
            if let Some(doctor) = update.doctor {
                record(&mut changes, "doctor", &appointment.doctor, &doctor);
                appointment.doctor = doctor;
            }
            if let Some(kind) = update.appointment_type {
                record(&mut changes, "type", &appointment.appointment_type, &kind);
                appointment.appointment_type = kind;
            }
            if let Some(notes) = update.notes {
                record(&mut changes, "notes", &appointment.notes, &notes);
                appointment.notes = notes;
            }
            if let Some(status) = update.status {
                record(&mut changes, "status", &appointment.status, &status);
                appointment.status = status;
            }

            if changes.is_empty() {
                return false;
            }
            if changes.contains_key("notes") || changes.contains_key("type") {
                appointment.urgency = None;
            }

            let now = Utc::now();
            appointment.modification_history.push(ModificationEntry {
                timestamp: now,
                modified_by: by,
                changes,
            });
            appointment.updated_by = Some(by);
            appointment.updated_at = Some(now);
            true
        })
    }

    pub fn cancel(&self, patient_id: &str, appointment_id: &str, by: Party) -> PortalResult<Appointment> {
        self.update_status(patient_id, appointment_id, AppointmentStatus::Cancelled, by)
    }

    /// Stores a triage result on the appointment. Not an audited edit.
    pub fn set_urgency(
        &self,
        patient_id: &str,
        appointment_id: &str,
        urgency: Urgency,
    ) -> PortalResult<Appointment> {
        self.modify(patient_id, appointment_id, |appointment| {
            if appointment.urgency.as_ref() == Some(&urgency) {
                return false;
            }
            appointment.urgency = Some(urgency);
            true
        })
    }

    /// Loads the patient's list, applies `edit` to one appointment and saves the list if
    /// `edit` reports a change. The patient's book is locked for the whole cycle.
    fn modify(
        &self,
        patient_id: &str,
        appointment_id: &str,
        edit: impl FnOnce(&mut Appointment) -> bool,
    ) -> PortalResult<Appointment> {
        self.locks.with(patient_id, || {
            let mut appointments = self.store.load_appointments(patient_id)?;
            let appointment = appointments
                .iter_mut()
                .find(|a| a.id == appointment_id)
                .ok_or_else(|| PortalError::not_found("appointment", appointment_id))?;

            if appointment.status == AppointmentStatus::Cancelled {
                return Err(PortalError::Conflict(format!(
                    "appointment {appointment_id} is cancelled and cannot be changed"
                )));
            }

            if !edit(appointment) {
                return Ok(appointment.clone());
            }

            let updated = appointment.clone();
            self.store.save_appointments(patient_id, &appointments)?;
            Ok(updated)
        })
    }
}

fn record<T: Serialize + PartialEq>(
    changes: &mut BTreeMap<String, FieldChange>,
    field: &str,
    from: &T,
    to: &T,
) {
    if from == to {
        return;
    }
    changes.insert(
        field.to_owned(),
        FieldChange {
            from: serde_json::to_value(from).unwrap_or(serde_json::Value::Null),
            to: serde_json::to_value(to).unwrap_or(serde_json::Value::Null),
        },
    );
}
