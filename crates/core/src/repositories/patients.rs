//! Patient profiles and documents.
//!
//! A patient profile is created on first sign-in and afterwards only updated; records are
//! never hard-deleted. Profiles are stored as `patient.yaml` in the patient's sharded
//! directory, with uploaded documents in the content-addressed store beside it.

use super::helpers::{create_unique_shared_dir, list_sharded_ids, read_yaml, write_yaml, RecordLocks};
use crate::config::CoreConfig;
use crate::constants::PATIENT_FILENAME;
use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, NaiveDate, Utc};
use portal_files::{DocumentMetadata, DocumentsService, FilesError};
use portal_types::{EmailAddress, NonEmptyText};
use portal_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use utoipa::ToSchema;

/// Reference from a profile to a stored document blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
    pub hash: String,
    pub filename: String,
    pub size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<DocumentMetadata> for DocumentRef {
    fn from(meta: DocumentMetadata) -> Self {
        Self {
            hash: meta.hash.to_string(),
            filename: meta.original_filename.into_inner(),
            size_bytes: meta.size_bytes,
            media_type: meta.media_type.map(NonEmptyText::into_inner),
            uploaded_at: meta.stored_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub facility_name: Option<String>,
    #[serde(default)]
    pub doctor: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientData {
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Condition name to whether the patient reports it.
    #[serde(default)]
    pub medical_conditions: BTreeMap<String, bool>,
    #[serde(default)]
    pub documents: Vec<DocumentRef>,
    #[serde(default)]
    pub consultation_history: Vec<ConsultationRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientData {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_owned()
    }
}

/// Registration details for a new patient.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Partial profile update; `None` leaves a field as it is. Medical conditions are merged
/// into the existing map.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub medical_conditions: Option<BTreeMap<String, bool>>,
    pub consultation: Option<ConsultationRecord>,
}

#[derive(Clone, Debug)]
pub struct PatientService {
    cfg: Arc<CoreConfig>,
    locks: RecordLocks,
}

impl PatientService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            locks: RecordLocks::new(),
        }
    }

    /// Registers a new patient under a freshly allocated id.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Validation`] for a blank name or malformed email; nothing is
    /// written in that case.
    pub fn create(&self, new: NewPatient) -> PortalResult<PatientData> {
        let first_name = NonEmptyText::new(&new.first_name)
            .map_err(|_| PortalError::validation("firstName", "first name is required"))?;
        let last_name = NonEmptyText::new(&new.last_name)
            .map_err(|_| PortalError::validation("lastName", "last name is required"))?;
        let email = EmailAddress::parse(&new.email)
            .map_err(|e| PortalError::validation("email", e.to_string()))?;

        let (id, dir) = create_unique_shared_dir(&self.cfg.patients_dir(), ShardableUuid::new)?;
        let now = Utc::now();
        let patient = PatientData {
            id: id.to_string(),
            first_name: first_name.into_inner(),
            last_name: last_name.into_inner(),
            email: email.as_str().to_owned(),
            phone: new.phone,
            date_of_birth: new.date_of_birth,
            address: new.address,
            medical_conditions: BTreeMap::new(),
            documents: Vec::new(),
            consultation_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = write_yaml(&dir.join(PATIENT_FILENAME), &patient) {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::error!("failed to remove partial patient dir {}: {cleanup}", dir.display());
            }
            return Err(e);
        }

        tracing::info!(patient_id = %patient.id, "patient created");
        Ok(patient)
    }

    /// Returns the profile for `patient_id`, creating an empty one on first sign-in.
    pub fn ensure(&self, patient_id: &str, email: &str) -> PortalResult<PatientData> {
        self.locks
            .with(patient_id, || self.ensure_profile(patient_id, email))
    }

    fn ensure_profile(&self, patient_id: &str, email: &str) -> PortalResult<PatientData> {
        let id = ShardableUuid::parse(patient_id)?;
        let dir = id.sharded_dir(&self.cfg.patients_dir());
        let path = dir.join(PATIENT_FILENAME);
        if path.is_file() {
            return read_yaml(&path);
        }

        let email = EmailAddress::parse(email)
            .map_err(|e| PortalError::validation("email", e.to_string()))?;
        fs::create_dir_all(&dir).map_err(PortalError::StorageDirCreation)?;

        let now = Utc::now();
        let patient = PatientData {
            id: id.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: email.as_str().to_owned(),
            phone: None,
            date_of_birth: None,
            address: None,
            medical_conditions: BTreeMap::new(),
            documents: Vec::new(),
            consultation_history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        write_yaml(&path, &patient)?;
        tracing::info!(patient_id = %patient.id, "patient profile initialised on first sign-in");
        Ok(patient)
    }

    pub fn get(&self, patient_id: &str) -> PortalResult<PatientData> {
        read_yaml(&self.existing_profile_path(patient_id)?)
    }

    /// Applies a partial update and returns the stored profile.
    pub fn update_profile(
        &self,
        patient_id: &str,
        update: PatientProfileUpdate,
    ) -> PortalResult<PatientData> {
        self.locks
            .with(patient_id, || self.apply_profile_update(patient_id, update))
    }

    fn apply_profile_update(
        &self,
        patient_id: &str,
        update: PatientProfileUpdate,
    ) -> PortalResult<PatientData> {
        let path = self.existing_profile_path(patient_id)?;
        let mut patient: PatientData = read_yaml(&path)?;

        if let Some(first_name) = update.first_name {
            patient.first_name = NonEmptyText::new(&first_name)
                .map_err(|_| PortalError::validation("firstName", "first name cannot be blank"))?
                .into_inner();
        }
        if let Some(last_name) = update.last_name {
            patient.last_name = NonEmptyText::new(&last_name)
                .map_err(|_| PortalError::validation("lastName", "last name cannot be blank"))?
                .into_inner();
        }
        if let Some(phone) = update.phone {
            patient.phone = Some(phone);
        }
        if let Some(date_of_birth) = update.date_of_birth {
            patient.date_of_birth = Some(date_of_birth);
        }
        if let Some(address) = update.address {
            patient.address = Some(address);
        }
        if let Some(conditions) = update.medical_conditions {
            patient.medical_conditions.extend(conditions);
        }
        if let Some(consultation) = update.consultation {
            patient.consultation_history.push(consultation);
        }

        patient.updated_at = Utc::now();
        write_yaml(&path, &patient)?;
        Ok(patient)
    }

    /// All readable patient profiles. Profiles that fail to parse are logged and skipped.
    pub fn list(&self) -> PortalResult<Vec<PatientData>> {
        let base = self.cfg.patients_dir();
        let mut patients = Vec::new();
        for id in list_sharded_ids(&base, PATIENT_FILENAME)? {
            let path = self.profile_path(&id)?;
            match read_yaml::<PatientData>(&path) {
                Ok(patient) => patients.push(patient),
                Err(e) => tracing::warn!("failed to parse {}: {e}", path.display()),
            }
        }
        Ok(patients)
    }

    /// Stores a document for the patient and records it on the profile.
    ///
    /// A blob left behind by an upload whose profile write failed is replaced, so the retry
    /// succeeds instead of reporting a duplicate.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Conflict`] if identical content is already on the profile,
    /// [`PortalError::NotFound`] for an unknown patient.
    pub fn upload_document(
        &self,
        patient_id: &str,
        filename: &str,
        bytes: &[u8],
    ) -> PortalResult<DocumentRef> {
        self.locks
            .with(patient_id, || self.store_document(patient_id, filename, bytes))
    }

    fn store_document(&self, patient_id: &str, filename: &str, bytes: &[u8]) -> PortalResult<DocumentRef> {
        let path = self.existing_profile_path(patient_id)?;
        let mut patient: PatientData = read_yaml(&path)?;

        let documents = self.documents(patient_id)?;
        let metadata = match documents.add_bytes(filename, bytes) {
            Ok(metadata) => metadata,
            Err(FilesError::DocumentAlreadyExists(hash))
                if !patient.documents.iter().any(|doc| doc.hash == hash) =>
            {
                tracing::warn!(patient_id, hash = %hash, "replacing document missing from profile");
                documents.remove(&hash)?;
                documents.add_bytes(filename, bytes).map_err(upload_error)?
            }
            Err(e) => return Err(upload_error(e)),
        };

        let document = DocumentRef::from(metadata);
        patient.documents.push(document.clone());
        patient.updated_at = Utc::now();
        if let Err(e) = write_yaml(&path, &patient) {
            if let Err(cleanup) = documents.remove(&document.hash) {
                tracing::error!(patient_id, hash = %document.hash, "failed to remove unrecorded document: {cleanup}");
            }
            return Err(e);
        }

        tracing::info!(patient_id, hash = %document.hash, "document uploaded");
        Ok(document)
    }

    pub fn read_document(&self, patient_id: &str, hash: &str) -> PortalResult<Vec<u8>> {
        self.existing_profile_path(patient_id)?;
        self.documents(patient_id)?.read(hash).map_err(|e| match e {
            FilesError::DocumentNotFound(hash) => PortalError::not_found("document", hash),
            other => PortalError::Files(other),
        })
    }

    fn documents(&self, patient_id: &str) -> PortalResult<DocumentsService> {
        let owner = ShardableUuid::parse(patient_id)?;
        Ok(DocumentsService::new(&self.cfg.patients_dir(), owner)?)
    }

    fn profile_path(&self, patient_id: &str) -> PortalResult<PathBuf> {
        let id = ShardableUuid::parse(patient_id)?;
        Ok(id.sharded_dir(&self.cfg.patients_dir()).join(PATIENT_FILENAME))
    }

    fn existing_profile_path(&self, patient_id: &str) -> PortalResult<PathBuf> {
        let path = self.profile_path(patient_id)?;
        if !path.is_file() {
            return Err(PortalError::not_found("patient", patient_id));
        }
        Ok(path)
    }
}

fn upload_error(e: FilesError) -> PortalError {
    match e {
        FilesError::DocumentAlreadyExists(hash) => {
            PortalError::Conflict(format!("document {hash} already uploaded"))
        }
        FilesError::InvalidFilename(name) => {
            PortalError::validation("filename", format!("invalid filename '{name}'"))
        }
        other => PortalError::Files(other),
    }
}
