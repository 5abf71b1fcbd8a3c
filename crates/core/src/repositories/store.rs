//! Appointment persistence.
//!
//! Appointments are stored per patient as a single YAML list next to the patient profile:
//!
//! ```text
//! patients/<s1>/<s2>/<uuid>/
//!   patient.yaml
//!   appointments.yaml
//! ```
//!
//! Services talk to an [`AppointmentStore`] rather than to the filesystem so the backing
//! store can be swapped (see [`super::TieredStore`]).

use super::helpers::{list_sharded_ids, read_yaml, write_yaml};
use crate::config::CoreConfig;
use crate::constants::{APPOINTMENTS_FILENAME, PATIENT_FILENAME};
use crate::error::{PortalError, PortalResult};
use crate::model::Appointment;
use portal_uuid::ShardableUuid;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-patient appointment storage.
pub trait AppointmentStore: Send + Sync {
    /// Ids of every patient with a profile, sorted.
    fn list_patient_ids(&self) -> PortalResult<Vec<String>>;

    fn patient_exists(&self, patient_id: &str) -> PortalResult<bool>;

    /// All appointments for a patient, in stored order. A patient without any
    /// appointments yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::NotFound`] for an unknown patient.
    fn load_appointments(&self, patient_id: &str) -> PortalResult<Vec<Appointment>>;

    /// Replaces the stored list for a patient.
    fn save_appointments(&self, patient_id: &str, appointments: &[Appointment]) -> PortalResult<()>;
}

/// Sharded YAML files under the configured data directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    cfg: Arc<CoreConfig>,
}

impl FileStore {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self { cfg }
    }

    fn patient_dir(&self, patient_id: &str) -> PortalResult<PathBuf> {
        let id = ShardableUuid::parse(patient_id)?;
        Ok(id.sharded_dir(&self.cfg.patients_dir()))
    }

    fn existing_patient_dir(&self, patient_id: &str) -> PortalResult<PathBuf> {
        let dir = self.patient_dir(patient_id)?;
        if !dir.join(PATIENT_FILENAME).is_file() {
            return Err(PortalError::not_found("patient", patient_id));
        }
        Ok(dir)
    }
}

impl AppointmentStore for FileStore {
    fn list_patient_ids(&self) -> PortalResult<Vec<String>> {
        list_sharded_ids(&self.cfg.patients_dir(), PATIENT_FILENAME)
    }

    fn patient_exists(&self, patient_id: &str) -> PortalResult<bool> {
        Ok(self.patient_dir(patient_id)?.join(PATIENT_FILENAME).is_file())
    }

    fn load_appointments(&self, patient_id: &str) -> PortalResult<Vec<Appointment>> {
        let path = self.existing_patient_dir(patient_id)?.join(APPOINTMENTS_FILENAME);
        if !path.is_file() {
            return Ok(Vec::new());
        }
        read_yaml(&path)
    }

    fn save_appointments(&self, patient_id: &str, appointments: &[Appointment]) -> PortalResult<()> {
        let path = self.existing_patient_dir(patient_id)?.join(APPOINTMENTS_FILENAME);
        write_yaml(&path, appointments)
    }
}

/// Process-local store; the fast tier of [`super::TieredStore`] and a stand-in store for
/// tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    patients: Arc<Mutex<BTreeMap<String, Vec<Appointment>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a patient with no appointments. Existing entries are left alone.
    pub fn add_patient(&self, patient_id: impl Into<String>) {
        self.lock().entry(patient_id.into()).or_default();
    }

    pub(crate) fn get(&self, patient_id: &str) -> Option<Vec<Appointment>> {
        self.lock().get(patient_id).cloned()
    }

    /// Drops every patient for which `keep` returns false.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        self.lock().retain(|id, _| keep(id));
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<Appointment>>> {
        self.patients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AppointmentStore for MemoryStore {
    fn list_patient_ids(&self) -> PortalResult<Vec<String>> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn patient_exists(&self, patient_id: &str) -> PortalResult<bool> {
        Ok(self.lock().contains_key(patient_id))
    }

    fn load_appointments(&self, patient_id: &str) -> PortalResult<Vec<Appointment>> {
        self.get(patient_id)
            .ok_or_else(|| PortalError::not_found("patient", patient_id))
    }

    fn save_appointments(&self, patient_id: &str, appointments: &[Appointment]) -> PortalResult<()> {
        self.lock()
            .insert(patient_id.to_owned(), appointments.to_vec());
        Ok(())
    }
}

impl<T: AppointmentStore + ?Sized> AppointmentStore for Arc<T> {
    fn list_patient_ids(&self) -> PortalResult<Vec<String>> {
        (**self).list_patient_ids()
    }

    fn patient_exists(&self, patient_id: &str) -> PortalResult<bool> {
        (**self).patient_exists(patient_id)
    }

    fn load_appointments(&self, patient_id: &str) -> PortalResult<Vec<Appointment>> {
        (**self).load_appointments(patient_id)
    }

    fn save_appointments(&self, patient_id: &str, appointments: &[Appointment]) -> PortalResult<()> {
        (**self).save_appointments(patient_id, appointments)
    }
}
