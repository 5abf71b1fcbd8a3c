//! Facility profiles.
//!
//! A facility is a provider organisation account with its own profile and the
//! appointments booked against it. Profiles live at
//! `facilities/<s1>/<s2>/<uuid>/facility.yaml`.

use super::helpers::{create_unique_shared_dir, list_sharded_ids, read_yaml, write_yaml, RecordLocks};
use crate::config::CoreConfig;
use crate::constants::FACILITY_FILENAME;
use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use portal_types::{EmailAddress, NonEmptyText};
use portal_uuid::ShardableUuid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FacilityData {
    pub id: String,
    pub name: String,
    /// Free text such as hospital, clinic or laboratory.
    #[serde(default)]
    pub facility_type: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    pub email: String,
    #[serde(default)]
    pub staff: Vec<StaffMember>,
    #[serde(default)]
    pub capacity: u32,
    /// Day name to opening hours, e.g. `monday: "08:00-18:00"`.
    #[serde(default)]
    pub operating_hours: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewFacility {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub facility_type: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub capacity: u32,
}

/// Partial profile update. Staff replaces the whole list; operating hours merge per day.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FacilityProfileUpdate {
    pub name: Option<String>,
    pub facility_type: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub capacity: Option<u32>,
    pub staff: Option<Vec<StaffMember>>,
    pub operating_hours: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug)]
pub struct FacilityService {
    cfg: Arc<CoreConfig>,
    locks: RecordLocks,
}

impl FacilityService {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            locks: RecordLocks::new(),
        }
    }

    pub fn create(&self, new: NewFacility) -> PortalResult<FacilityData> {
        let name = NonEmptyText::new(&new.name)
            .map_err(|_| PortalError::validation("name", "facility name is required"))?;
        let email = EmailAddress::parse(&new.email)
            .map_err(|e| PortalError::validation("email", e.to_string()))?;

        let (id, dir) = create_unique_shared_dir(&self.cfg.facilities_dir(), ShardableUuid::new)?;
        let now = Utc::now();
        let facility = FacilityData {
            id: id.to_string(),
            name: name.into_inner(),
            facility_type: new.facility_type,
            address: new.address,
            phone: new.phone,
            email: email.as_str().to_owned(),
            staff: Vec::new(),
            capacity: new.capacity,
            operating_hours: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = write_yaml(&dir.join(FACILITY_FILENAME), &facility) {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::error!("failed to remove partial facility dir {}: {cleanup}", dir.display());
            }
            return Err(e);
        }

        tracing::info!(facility_id = %facility.id, "facility created");
        Ok(facility)
    }

    pub fn get(&self, facility_id: &str) -> PortalResult<FacilityData> {
        read_yaml(&self.existing_profile_path(facility_id)?)
    }

    pub fn update_profile(
        &self,
        facility_id: &str,
        update: FacilityProfileUpdate,
    ) -> PortalResult<FacilityData> {
        self.locks
            .with(facility_id, || self.apply_profile_update(facility_id, update))
    }

    fn apply_profile_update(
        &self,
        facility_id: &str,
        update: FacilityProfileUpdate,
    ) -> PortalResult<FacilityData> {
        let path = self.existing_profile_path(facility_id)?;
        let mut facility: FacilityData = read_yaml(&path)?;

        if let Some(name) = update.name {
            facility.name = NonEmptyText::new(&name)
                .map_err(|_| PortalError::validation("name", "facility name cannot be blank"))?
                .into_inner();
        }
        if let Some(facility_type) = update.facility_type {
            facility.facility_type = facility_type;
        }
        if let Some(address) = update.address {
            facility.address = address;
        }
        if let Some(phone) = update.phone {
            facility.phone = phone;
        }
        if let Some(capacity) = update.capacity {
            facility.capacity = capacity;
        }
        if let Some(staff) = update.staff {
            facility.staff = staff;
        }
        if let Some(hours) = update.operating_hours {
            facility.operating_hours.extend(hours);
        }

        facility.updated_at = Utc::now();
        write_yaml(&path, &facility)?;
        Ok(facility)
    }

    pub fn list(&self) -> PortalResult<Vec<FacilityData>> {
        let mut facilities = Vec::new();
        for id in list_sharded_ids(&self.cfg.facilities_dir(), FACILITY_FILENAME)? {
            let path = self.profile_path(&id)?;
            match read_yaml::<FacilityData>(&path) {
                Ok(facility) => facilities.push(facility),
                Err(e) => tracing::warn!("failed to parse {}: {e}", path.display()),
            }
        }
        Ok(facilities)
    }

    fn profile_path(&self, facility_id: &str) -> PortalResult<PathBuf> {
        let id = ShardableUuid::parse(facility_id)?;
        Ok(id.sharded_dir(&self.cfg.facilities_dir()).join(FACILITY_FILENAME))
    }

    fn existing_profile_path(&self, facility_id: &str) -> PortalResult<PathBuf> {
        let path = self.profile_path(facility_id)?;
        if !path.is_file() {
            return Err(PortalError::not_found("facility", facility_id));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service(temp_dir: &TempDir) -> FacilityService {
        FacilityService::new(Arc::new(CoreConfig::with_data_dir(
            temp_dir.path().to_path_buf(),
        )))
    }

    fn new_facility() -> NewFacility {
        NewFacility {
            name: "Riverside Clinic".into(),
            email: "desk@riverside.example".into(),
            facility_type: "clinic".into(),
            capacity: 40,
            ..NewFacility::default()
        }
    }

    #[test]
    fn test_create_get_and_list() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let facilities = service(&temp_dir);

        let created = facilities.create(new_facility()).expect("create should succeed");

        assert_eq!(facilities.get(&created.id).unwrap(), created);
        assert_eq!(facilities.list().unwrap(), vec![created]);
    }

    #[test]
    fn test_create_requires_name() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let facilities = service(&temp_dir);

        let err = facilities
            .create(NewFacility {
                name: String::new(),
                ..new_facility()
            })
            .unwrap_err();

        assert!(matches!(err, PortalError::Validation { field: "name", .. }));
    }

    #[test]
    fn test_update_profile() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let facilities = service(&temp_dir);
        let created = facilities.create(new_facility()).unwrap();

        let updated = facilities
            .update_profile(
                &created.id,
                FacilityProfileUpdate {
                    capacity: Some(55),
                    staff: Some(vec![StaffMember {
                        name: "Dr. Amari".into(),
                        role: "GP".into(),
                        email: None,
                    }]),
                    operating_hours: Some(BTreeMap::from([(
                        "monday".to_string(),
                        "08:00-18:00".to_string(),
                    )])),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.capacity, 55);
        assert_eq!(updated.staff.len(), 1);
        assert_eq!(updated.name, "Riverside Clinic");
        assert_eq!(facilities.get(&created.id).unwrap(), updated);
    }

    #[test]
    fn test_unknown_facility() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let facilities = service(&temp_dir);

        assert!(matches!(
            facilities.get(&ShardableUuid::new().to_string()),
            Err(PortalError::NotFound { kind: "facility", .. })
        ));
        assert!(matches!(facilities.get("nope"), Err(PortalError::Uuid(_))));
    }

    #[test]
    fn test_concurrent_hours_updates_are_all_kept() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let facilities = service(&temp_dir);
        let created = facilities.create(new_facility()).unwrap();
        let days = ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday"];

        std::thread::scope(|scope| {
            for day in days {
                let facilities = facilities.clone();
                let id = created.id.clone();
                scope.spawn(move || {
                    facilities
                        .update_profile(
                            &id,
                            FacilityProfileUpdate {
                                operating_hours: Some(BTreeMap::from([(
                                    day.to_string(),
                                    "09:00-17:00".to_string(),
                                )])),
                                ..Default::default()
                            },
                        )
                        .unwrap();
                });
            }
        });

        assert_eq!(facilities.get(&created.id).unwrap().operating_hours.len(), days.len());
    }
}

