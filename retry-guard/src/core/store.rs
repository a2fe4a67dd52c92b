//! Time-bounded failure records keyed by fingerprint.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::core::fingerprint::Fingerprint;
use crate::core::types::FailureRecord;

/// At most one record per fingerprint; newer failures overwrite older ones.
///
/// Expiry is lazy: nothing is removed until [`FailureStore::cleanup`] runs.
#[derive(Debug, Clone)]
pub struct FailureStore {
    records: HashMap<Fingerprint, FailureRecord>,
    max_age: Duration,
}

impl FailureStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            records: HashMap::new(),
            max_age,
        }
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&FailureRecord> {
        self.records.get(fingerprint)
    }

    pub fn get_mut(&mut self, fingerprint: &Fingerprint) -> Option<&mut FailureRecord> {
        self.records.get_mut(fingerprint)
    }

    pub fn insert(&mut self, fingerprint: Fingerprint, record: FailureRecord) {
        self.records.insert(fingerprint, record);
    }

    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Option<FailureRecord> {
        self.records.remove(fingerprint)
    }

    /// Drop every record older than the retention window, addressed or not.
    ///
    /// Returns the number of records removed.
    pub fn cleanup(&mut self, now: Instant) -> usize {
        let before = self.records.len();
        let max_age = self.max_age;
        self.records
            .retain(|_, record| now.saturating_duration_since(record.recorded_at) <= max_age);
        before - self.records.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Fingerprint, &FailureRecord)> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Fingerprint, &mut FailureRecord)> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
