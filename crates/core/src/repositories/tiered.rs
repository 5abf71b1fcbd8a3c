//! Two-tier appointment store.
//!
//! Writes land in a local in-memory tier first and always succeed. The remote tier is
//! written best-effort: a failed remote write marks the patient as pending and the local
//! copy stays authoritative until [`TieredStore::reconcile`] pushes it through.
//!
//! Reads go to the remote tier unless the patient has pending writes. When the remote read
//! fails the local copy is served if there is one.
//!
//! Each reconcile pass ends by evicting local copies of patients with nothing pending, so
//! the local tier only grows with the traffic seen between two passes.

use super::store::{AppointmentStore, MemoryStore};
use crate::error::PortalResult;
use crate::model::Appointment;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of one [`TieredStore::reconcile`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub flushed: usize,
    pub still_pending: usize,
    /// Local copies dropped because the remote tier holds them.
    pub evicted: usize,
}

#[derive(Clone, Debug)]
pub struct TieredStore<R> {
    local: MemoryStore,
    remote: R,
    pending: Arc<Mutex<BTreeSet<String>>>,
}

impl<R: AppointmentStore> TieredStore<R> {
    pub fn new(remote: R) -> Self {
        Self {
            local: MemoryStore::new(),
            remote,
            pending: Arc::default(),
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Patients whose latest local write has not reached the remote tier.
    pub fn pending(&self) -> Vec<String> {
        self.lock_pending().iter().cloned().collect()
    }

    /// Retries every pending remote write. Patients that succeed leave the queue.
    pub fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for patient_id in self.pending() {
            let Some(appointments) = self.local.get(&patient_id) else {
                self.lock_pending().remove(&patient_id);
                continue;
            };

            match self.remote.save_appointments(&patient_id, &appointments) {
                Ok(()) => {
                    self.lock_pending().remove(&patient_id);
                    report.flushed += 1;
                }
                Err(e) => {
                    tracing::warn!(patient_id = %patient_id, "remote write still failing: {e}");
                    report.still_pending += 1;
                }
            }
        }

        report.evicted = self.evict_settled();

        if report.flushed > 0 || report.still_pending > 0 {
            tracing::info!(
                flushed = report.flushed,
                still_pending = report.still_pending,
                "reconciled pending appointment writes"
            );
        }
        report
    }

    /// Drops local copies of every patient without pending writes.
    ///
    /// The pending lock is held across the sweep; a failing write takes it before it
    /// touches the local tier, so a freshly queued copy is never evicted.
    fn evict_settled(&self) -> usize {
        let pending = self.lock_pending();
        let before = self.local.len();
        self.local.retain(|id| pending.contains(id));
        before - self.local.len()
    }

    fn is_pending(&self, patient_id: &str) -> bool {
        self.lock_pending().contains(patient_id)
    }

    fn lock_pending(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: AppointmentStore> AppointmentStore for TieredStore<R> {
    fn list_patient_ids(&self) -> PortalResult<Vec<String>> {
        let mut ids: BTreeSet<String> = match self.remote.list_patient_ids() {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                tracing::warn!("remote patient listing failed, serving local tier: {e}");
                BTreeSet::new()
            }
        };
        ids.extend(self.local.list_patient_ids()?);
        Ok(ids.into_iter().collect())
    }

    fn patient_exists(&self, patient_id: &str) -> PortalResult<bool> {
        if self.local.patient_exists(patient_id)? {
            return Ok(true);
        }
        self.remote.patient_exists(patient_id)
    }

    fn load_appointments(&self, patient_id: &str) -> PortalResult<Vec<Appointment>> {
        if self.is_pending(patient_id) {
            return self.local.load_appointments(patient_id);
        }

        match self.remote.load_appointments(patient_id) {
            Ok(appointments) => {
                self.local.save_appointments(patient_id, &appointments)?;
                Ok(appointments)
            }
            Err(e) => match self.local.get(patient_id) {
                Some(appointments) => {
                    tracing::warn!(patient_id = %patient_id, "remote read failed, serving local tier: {e}");
                    Ok(appointments)
                }
                None => Err(e),
            },
        }
    }

    fn save_appointments(&self, patient_id: &str, appointments: &[Appointment]) -> PortalResult<()> {
        self.local.save_appointments(patient_id, appointments)?;

        if let Err(e) = self.remote.save_appointments(patient_id, appointments) {
            tracing::warn!(patient_id = %patient_id, "remote write failed, queued for retry: {e}");
            let mut pending = self.lock_pending();
            self.local.save_appointments(patient_id, appointments)?;
            pending.insert(patient_id.to_owned());
            return Ok(());
        }

        self.lock_pending().remove(patient_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortalError;
    use crate::model::AppointmentStatus;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory store whose availability can be toggled.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        down: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> PortalResult<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(PortalError::RemoteUnavailable("connection refused".into()));
            }
            Ok(())
        }
    }

    impl AppointmentStore for FlakyStore {
        fn list_patient_ids(&self) -> PortalResult<Vec<String>> {
            self.check()?;
            self.inner.list_patient_ids()
        }

        fn patient_exists(&self, patient_id: &str) -> PortalResult<bool> {
            self.check()?;
            self.inner.patient_exists(patient_id)
        }

        fn load_appointments(&self, patient_id: &str) -> PortalResult<Vec<Appointment>> {
            self.check()?;
            self.inner.load_appointments(patient_id)
        }

        fn save_appointments(&self, patient_id: &str, appointments: &[Appointment]) -> PortalResult<()> {
            self.check()?;
            self.inner.save_appointments(patient_id, appointments)
        }
    }

    fn appointment(id: &str) -> Appointment {
        Appointment::new(
            id,
            NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            AppointmentStatus::Pending,
        )
    }

    #[test]
    fn test_write_succeeds_locally_when_remote_is_down() {
        let remote = FlakyStore::default();
        remote.inner.add_patient("p1");
        let store = TieredStore::new(remote.clone());

        remote.set_down(true);
        store
            .save_appointments("p1", &[appointment("a1")])
            .expect("local write always succeeds");

        assert_eq!(store.pending(), vec!["p1".to_string()]);
        assert_eq!(store.load_appointments("p1").unwrap()[0].id, "a1");
        assert!(remote.inner.load_appointments("p1").unwrap().is_empty());
    }

    #[test]
    fn test_reconcile_flushes_once_remote_recovers() {
        let remote = FlakyStore::default();
        remote.inner.add_patient("p1");
        let store = TieredStore::new(remote.clone());

        remote.set_down(true);
        store.save_appointments("p1", &[appointment("a1")]).unwrap();
        assert_eq!(
            store.reconcile(),
            ReconcileReport {
                flushed: 0,
                still_pending: 1,
                evicted: 0,
            }
        );

        remote.set_down(false);
        assert_eq!(store.reconcile().flushed, 1);
        assert!(store.pending().is_empty());
        assert_eq!(remote.inner.load_appointments("p1").unwrap().len(), 1);
    }

    #[test]
    fn test_reconcile_evicts_settled_local_copies() {
        let remote = FlakyStore::default();
        for id in ["p1", "p2", "p3"] {
            remote.inner.add_patient(id);
        }
        let store = TieredStore::new(remote.clone());

        store.save_appointments("p1", &[appointment("a1")]).unwrap();
        store.load_appointments("p2").unwrap();
        remote.set_down(true);
        store.save_appointments("p3", &[appointment("a3")]).unwrap();
        assert_eq!(store.local.len(), 3);

        let report = store.reconcile();
        assert_eq!(report.evicted, 2);
        assert_eq!(store.local.list_patient_ids().unwrap(), vec!["p3"]);

        remote.set_down(false);
        let report = store.reconcile();
        assert_eq!((report.flushed, report.evicted), (1, 1));
        assert!(store.local.is_empty());
        assert_eq!(store.load_appointments("p3").unwrap()[0].id, "a3");
        assert_eq!(store.load_appointments("p1").unwrap()[0].id, "a1");
    }

    #[test]
    fn test_pending_patient_reads_local_copy() {
        let remote = FlakyStore::default();
        remote.inner.add_patient("p1");
        let store = TieredStore::new(remote.clone());

        remote.set_down(true);
        store.save_appointments("p1", &[appointment("local")]).unwrap();
        remote.set_down(false);
        remote
            .inner
            .save_appointments("p1", &[appointment("stale")])
            .unwrap();

        assert_eq!(store.load_appointments("p1").unwrap()[0].id, "local");
    }

    #[test]
    fn test_remote_read_failure_without_local_copy_propagates() {
        let remote = FlakyStore::default();
        remote.inner.add_patient("p1");
        let store = TieredStore::new(remote.clone());
        remote.set_down(true);

        assert!(matches!(
            store.load_appointments("p1"),
            Err(PortalError::RemoteUnavailable(_))
        ));
    }

    #[test]
    fn test_listing_merges_tiers() {
        let remote = FlakyStore::default();
        remote.inner.add_patient("p1");
        let store = TieredStore::new(remote.clone());
        store.local.add_patient("p2");

        assert_eq!(store.list_patient_ids().unwrap(), vec!["p1", "p2"]);

        remote.set_down(true);
        assert_eq!(store.list_patient_ids().unwrap(), vec!["p2"]);
    }
}
