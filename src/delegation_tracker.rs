//! Record assignments, update status, query overdue (C5); per-reference
//! retry counter (C6), kept in its own map so incrementing a retry count
//! never touches the immutable delegation record.

use chrono::Utc;
use cos_core::{DelegationRecord, DelegationStatus, ReferenceCode};
use dashmap::DashMap;

#[derive(Default)]
pub struct DelegationTracker {
    records: DashMap<ReferenceCode, DelegationRecord>,
}

impl DelegationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delegate(&self, record: DelegationRecord) {
        self.records.insert(record.reference_code, record);
    }

    /// Replaces the whole record atomically per the spec's immutability
    /// invariant — state changes never mutate a field in place.
    pub fn update_status(&self, reference_code: ReferenceCode, status: DelegationStatus) -> Option<DelegationRecord> {
        let mut entry = self.records.get_mut(&reference_code)?;
        *entry = entry.with_status(status);
        Some(entry.clone())
    }

    pub fn get(&self, reference_code: ReferenceCode) -> Option<DelegationRecord> {
        self.records.get(&reference_code).map(|entry| entry.clone())
    }

    pub fn get_by_assignee(&self, agent_id: &str) -> Vec<DelegationRecord> {
        self.records
            .iter()
            .filter(|entry| entry.delegated_to == agent_id)
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn get_overdue(&self) -> Vec<DelegationRecord> {
        let now = Utc::now();
        self.records
            .iter()
            .filter(|entry| entry.is_overdue_at(now))
            .map(|entry| entry.clone())
            .collect()
    }
}

#[derive(Default)]
pub struct RetryCounter {
    counts: DashMap<ReferenceCode, u32>,
}

impl RetryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, reference_code: ReferenceCode) -> u32 {
        let mut entry = self.counts.entry(reference_code).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn get(&self, reference_code: ReferenceCode) -> u32 {
        self.counts.get(&reference_code).map(|c| *c).unwrap_or(0)
    }

    pub fn reset(&self, reference_code: ReferenceCode) {
        self.counts.remove(&reference_code);
    }
}
