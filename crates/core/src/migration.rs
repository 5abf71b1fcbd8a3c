//! Urgency backfill for appointments booked before triage existed.
//!
//! The backfill is a batch job, so it uses keyword triage only and never calls the external
//! evaluator. One patient's failure never aborts the run: it is logged, skipped and left
//! out of the count.

use crate::error::PortalResult;
use crate::notify::{NotificationKind, Notifier};
use crate::repositories::{AppointmentService, AppointmentStore};
use crate::triage::classify_by_keywords;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatistics {
    pub total_patients: usize,
    pub total_appointments: usize,
    /// Appointments carrying a stored urgency.
    pub migrated_appointments: usize,
    /// Whole percent; 100 when there are no appointments.
    pub migration_progress: u8,
}

impl MigrationStatistics {
    fn from_counts(total_patients: usize, total_appointments: usize, migrated: usize) -> Self {
        Self {
            total_patients,
            total_appointments,
            migrated_appointments: migrated,
            migration_progress: progress_percent(migrated, total_appointments),
        }
    }
}

fn progress_percent(migrated: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (100.0 * migrated as f64 / total as f64).round();
    percent.clamp(0.0, 100.0) as u8
}

/// Runs against the appointment service's store and shares its per-patient locks, so a
/// backfill never overwrites a booking made while it runs.
pub struct MigrationService {
    appointments: AppointmentService,
    notifier: Arc<dyn Notifier>,
}

impl MigrationService {
    pub fn new(appointments: AppointmentService, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            appointments,
            notifier,
        }
    }

    /// Counts patients, appointments and appointments that already carry an urgency.
    /// Patients whose appointments cannot be read count towards patients only.
    pub fn get_migration_statistics(&self) -> PortalResult<MigrationStatistics> {
        let store = self.appointments.store();
        let patient_ids = store.list_patient_ids()?;

        let mut total = 0;
        let mut migrated = 0;
        for patient_id in &patient_ids {
            match store.load_appointments(patient_id) {
                Ok(appointments) => {
                    total += appointments.len();
                    migrated += appointments.iter().filter(|a| a.urgency.is_some()).count();
                }
                Err(e) => tracing::warn!(patient_id = %patient_id, "statistics skipped patient: {e}"),
            }
        }

        Ok(MigrationStatistics::from_counts(patient_ids.len(), total, migrated))
    }

    /// Classifies and stores an urgency for every appointment that lacks one.
    ///
    /// Returns how many appointments were migrated. Appointments already carrying an urgency
    /// are left untouched, so running the job twice migrates nothing the second time.
    ///
    /// # Errors
    ///
    /// Fails only if the patient list itself cannot be read.
    pub fn migrate_existing_appointments(&self) -> PortalResult<usize> {
        let store = self.appointments.store();
        let patient_ids = match store.list_patient_ids() {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("appointment migration could not list patients: {e}");
                self.notifier
                    .notify("Appointment migration failed", NotificationKind::Error);
                return Err(e);
            }
        };

        let mut migrated = 0;
        let mut skipped_patients = 0;
        for patient_id in &patient_ids {
            let outcome = self
                .appointments
                .locks()
                .with(patient_id, || backfill_patient(store.as_ref(), patient_id));
            match outcome {
                Ok(classified) => migrated += classified,
                Err(e) => {
                    tracing::warn!(patient_id = %patient_id, "migration skipped patient: {e}");
                    skipped_patients += 1;
                }
            }
        }

        tracing::info!(migrated, skipped_patients, "appointment urgency migration finished");
        self.notifier.notify(
            &format!("Migrated {migrated} appointments"),
            NotificationKind::Success,
        );
        Ok(migrated)
    }
}

/// Classifies the patient's unmigrated appointments and saves them. Returns how many were
/// classified; nothing is written when there are none.
fn backfill_patient(store: &dyn AppointmentStore, patient_id: &str) -> PortalResult<usize> {
    let mut appointments = store.load_appointments(patient_id)?;

    let mut classified = 0;
    for appointment in appointments.iter_mut().filter(|a| a.urgency.is_none()) {
        let result = classify_by_keywords(&appointment.notes, &appointment.appointment_type);
        appointment.urgency = Some(result.to_urgency());
        classified += 1;
    }
    if classified > 0 {
        store.save_appointments(patient_id, &appointments)?;
    }
    Ok(classified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;
    use crate::model::{Appointment, AppointmentStatus, Urgency, UrgencyLevel};
    use crate::notify::MemoryNotifier;
    use crate::repositories::MemoryStore;

    fn service_over(store: impl AppointmentStore + 'static, notifier: MemoryNotifier) -> MigrationService {
        MigrationService::new(AppointmentService::new(Arc::new(store)), Arc::new(notifier))
    }
    use chrono::NaiveDate;

    fn appointment(id: &str, notes: &str) -> Appointment {
        let mut appt = Appointment::new(
            id,
            NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            AppointmentStatus::Scheduled,
        );
        appt.notes = notes.into();
        appt
    }

    /// Store that refuses writes for one patient.
    struct ReadOnlyFor {
        inner: MemoryStore,
        patient_id: &'static str,
    }

    impl AppointmentStore for ReadOnlyFor {
        fn list_patient_ids(&self) -> PortalResult<Vec<String>> {
            self.inner.list_patient_ids()
        }

        fn patient_exists(&self, patient_id: &str) -> PortalResult<bool> {
            self.inner.patient_exists(patient_id)
        }

        fn load_appointments(&self, patient_id: &str) -> PortalResult<Vec<Appointment>> {
            self.inner.load_appointments(patient_id)
        }

        fn save_appointments(&self, patient_id: &str, appointments: &[Appointment]) -> PortalResult<()> {
            if patient_id == self.patient_id {
                return Err(PortalError::RemoteUnavailable("write rejected".into()));
            }
            self.inner.save_appointments(patient_id, appointments)
        }
    }

    #[test]
    fn test_empty_store_reports_complete() {
        let service = service_over(MemoryStore::new(), MemoryNotifier::new());

        let stats = service.get_migration_statistics().unwrap();

        assert_eq!(stats.total_appointments, 0);
        assert_eq!(stats.migration_progress, 100);
    }

    #[test]
    fn test_progress_rounds() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(3, 3), 100);
    }

    #[test]
    fn test_migration_classifies_unmigrated_and_counts() {
        let store = MemoryStore::new();
        let mut done = appointment("a3", "chest pain");
        done.urgency = Some(Urgency {
            level: UrgencyLevel::Green,
            description: "ROUTINE".into(),
        });
        store
            .save_appointments(
                "p1",
                &[appointment("a1", "severe chest pain"), appointment("a2", "annual checkup"), done],
            )
            .unwrap();
        let notifier = MemoryNotifier::new();
        let service = service_over(store.clone(), notifier.clone());

        assert_eq!(service.get_migration_statistics().unwrap().migration_progress, 33);

        let migrated = service.migrate_existing_appointments().unwrap();

        assert_eq!(migrated, 2);
        let stored = store.load_appointments("p1").unwrap();
        assert_eq!(stored[0].urgency.as_ref().map(|u| u.level), Some(UrgencyLevel::Red));
        assert_eq!(stored[1].urgency.as_ref().map(|u| u.description.as_str()), Some("ROUTINE"));
        assert_eq!(stored[2].urgency.as_ref().map(|u| u.level), Some(UrgencyLevel::Green));

        let stats = service.get_migration_statistics().unwrap();
        assert_eq!(stats.migrated_appointments, 3);
        assert_eq!(stats.migration_progress, 100);

        let sent = notifier.drain();
        assert_eq!(sent[0].message, "Migrated 2 appointments");
        assert_eq!(sent[0].kind, NotificationKind::Success);

        assert_eq!(service.migrate_existing_appointments().unwrap(), 0);
    }

    #[test]
    fn test_failed_write_is_skipped_not_counted() {
        let inner = MemoryStore::new();
        inner.save_appointments("p1", &[appointment("a1", "stroke")]).unwrap();
        inner
            .save_appointments("p2", &[appointment("b1", "infection"), appointment("b2", "")])
            .unwrap();
        let store = ReadOnlyFor {
            inner: inner.clone(),
            patient_id: "p1",
        };
        let service = service_over(store, MemoryNotifier::new());

        let migrated = service.migrate_existing_appointments().unwrap();

        assert_eq!(migrated, 2);
        assert!(inner.load_appointments("p1").unwrap()[0].urgency.is_none());
        assert_eq!(
            inner.load_appointments("p2").unwrap()[0].urgency.as_ref().map(|u| u.level),
            Some(UrgencyLevel::Orange)
        );
    }
}
