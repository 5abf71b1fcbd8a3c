//! Per-appointment memo of triage results.
//!
//! Entries are keyed by appointment id and carry a fingerprint of the text that was
//! classified, so an edit to notes or type invalidates the entry on the next lookup.
//! Writers are last-writer-wins.
//!
//! The cache is bounded: once it holds `capacity` entries, each insert evicts the entry
//! written longest ago.

use crate::constants::URGENCY_CACHE_CAPACITY;
use crate::model::{Appointment, UrgencyResult};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug)]
struct CacheEntry {
    fingerprint: u64,
    result: UrgencyResult,
    written: u64,
}

#[derive(Debug, Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    /// Write order as `(written, id)`; pairs whose entry was rewritten or dropped are stale.
    order: VecDeque<(u64, String)>,
    next_write: u64,
}

impl Entries {
    fn insert(&mut self, id: String, fingerprint: u64, result: UrgencyResult, capacity: usize) {
        let written = self.next_write;
        self.next_write += 1;
        self.order.push_back((written, id.clone()));
        self.map.insert(
            id,
            CacheEntry {
                fingerprint,
                result,
                written,
            },
        );

        while self.map.len() > capacity {
            let Some((written, id)) = self.order.pop_front() else {
                break;
            };
            if self.map.get(&id).is_some_and(|e| e.written == written) {
                self.map.remove(&id);
            }
        }
        if self.order.len() > capacity.saturating_mul(2) {
            self.compact();
        }
    }

    fn compact(&mut self) {
        let map = &self.map;
        self.order
            .retain(|(written, id)| map.get(id).is_some_and(|e| e.written == *written));
    }
}

#[derive(Clone, Debug)]
pub struct UrgencyCache {
    inner: Arc<Mutex<Entries>>,
    capacity: usize,
}

impl Default for UrgencyCache {
    fn default() -> Self {
        Self::with_capacity(URGENCY_CACHE_CAPACITY)
    }
}

impl UrgencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache holding at most `capacity` entries (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fingerprint of the fields the classifier reads.
    pub fn fingerprint(appointment: &Appointment) -> u64 {
        let mut hasher = DefaultHasher::new();
        appointment.notes.hash(&mut hasher);
        appointment.appointment_type.hash(&mut hasher);
        hasher.finish()
    }

    pub fn get(&self, appointment: &Appointment) -> Option<UrgencyResult> {
        let fingerprint = Self::fingerprint(appointment);
        self.lock()
            .map
            .get(&appointment.id)
            .filter(|entry| entry.fingerprint == fingerprint)
            .map(|entry| entry.result.clone())
    }

    pub fn insert(&self, appointment: &Appointment, result: UrgencyResult) {
        let fingerprint = Self::fingerprint(appointment);
        self.lock()
            .insert(appointment.id.clone(), fingerprint, result, self.capacity);
    }

    pub fn invalidate(&self, appointment_id: &str) {
        self.lock().map.remove(appointment_id);
    }

    /// Drops entries for appointments no longer in view.
    pub fn retain_ids<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        let keep: HashSet<&str> = ids.into_iter().collect();
        let mut entries = self.lock();
        entries.map.retain(|id, _| keep.contains(id.as_str()));
        entries.compact();
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
