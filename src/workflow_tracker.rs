//! Multi-subtask aggregation state and completion detection (C7).
//!
//! Two inverted indexes — `parent -> record` and `subtask -> parent` — plus
//! a per-workflow lock around the cached sub-task results so that
//! `store_subtask_result` and `all_subtasks_complete` never race within the
//! same workflow, without a single crate-wide lock serialising unrelated
//! workflows.

use std::collections::HashMap;
use std::sync::Arc;

use cos_core::{MessageEnvelope, ReferenceCode, WorkflowRecord, WorkflowStatus};
use dashmap::DashMap;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct WorkflowTracker {
    records: DashMap<ReferenceCode, WorkflowRecord>,
    subtask_to_parent: DashMap<ReferenceCode, ReferenceCode>,
    results: DashMap<ReferenceCode, Arc<Mutex<HashMap<ReferenceCode, MessageEnvelope>>>>,
}

impl WorkflowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates both the primary record and the subtask inverted index.
    pub fn create(&self, workflow: WorkflowRecord) {
        for subtask in &workflow.subtask_reference_codes {
            self.subtask_to_parent.insert(*subtask, workflow.reference_code);
        }
        self.results
            .insert(workflow.reference_code, Arc::new(Mutex::new(HashMap::new())));
        self.records.insert(workflow.reference_code, workflow);
    }

    /// A parent's own reference code is never itself a sub-task reference:
    /// looking it up here returns nothing even though `get` would find it.
    pub fn find_by_subtask(&self, subtask_ref: ReferenceCode) -> Option<WorkflowRecord> {
        let parent = *self.subtask_to_parent.get(&subtask_ref)?;
        self.get(parent)
    }

    pub fn get(&self, parent_ref: ReferenceCode) -> Option<WorkflowRecord> {
        self.records.get(&parent_ref).map(|entry| entry.clone())
    }

    pub fn update_status(&self, parent_ref: ReferenceCode, status: WorkflowStatus) -> Option<WorkflowRecord> {
        let mut entry = self.records.get_mut(&parent_ref)?;
        *entry = entry.with_status(status);
        Some(entry.clone())
    }

    /// Serialised per workflow: storing a result and checking completion
    /// never interleave for the same parent.
    pub async fn store_subtask_result(&self, subtask_ref: ReferenceCode, envelope: MessageEnvelope) {
        let Some(parent) = self.subtask_to_parent.get(&subtask_ref).map(|p| *p) else {
            return;
        };
        if let Some(results) = self.results.get(&parent) {
            let mut guard = results.lock().await;
            guard.insert(subtask_ref, envelope);
        }
    }

    /// Results in the same order as `subtask_reference_codes`; only
    /// sub-tasks that have replied are included.
    pub async fn get_completed_results(&self, parent_ref: ReferenceCode) -> Vec<MessageEnvelope> {
        let Some(record) = self.get(parent_ref) else {
            return Vec::new();
        };
        let Some(results) = self.results.get(&parent_ref) else {
            return Vec::new();
        };
        let guard = results.lock().await;
        record
            .subtask_reference_codes
            .iter()
            .filter_map(|r| guard.get(r).cloned())
            .collect()
    }

    pub async fn all_subtasks_complete(&self, parent_ref: ReferenceCode) -> bool {
        let Some(record) = self.get(parent_ref) else {
            return false;
        };
        let Some(results) = self.results.get(&parent_ref) else {
            return false;
        };
        let guard = results.lock().await;
        record.subtask_reference_codes.iter().all(|r| guard.contains_key(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use cos_core::{Context, Payload, Priority};
    use uuid::Uuid;

    fn code(n: u16) -> ReferenceCode {
        ReferenceCode::from_parts(NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), n).unwrap()
    }

    fn envelope(reference_code: ReferenceCode) -> MessageEnvelope {
        MessageEnvelope {
            payload: Payload::TextMessage {
                message_id: Uuid::new_v4(),
                timestamp: chrono::Utc::now(),
                correlation_id: None,
                text: "done".to_string(),
            },
            reference_code,
            authority_claims: vec![],
            context: Context::default(),
            priority: Priority::Normal,
            sla: None,
        }
    }

    #[tokio::test]
    async fn parent_ref_is_not_a_subtask_ref() {
        let tracker = WorkflowTracker::new();
        let parent = code(1);
        let workflow = WorkflowRecord::new(parent, envelope(parent), vec![code(2), code(3)], "s");
        tracker.create(workflow);
        assert!(tracker.get(parent).is_some());
        assert!(tracker.find_by_subtask(parent).is_none());
        assert!(tracker.find_by_subtask(code(2)).is_some());
    }

    #[tokio::test]
    async fn all_subtasks_complete_after_every_result_stored() {
        let tracker = WorkflowTracker::new();
        let parent = code(10);
        let workflow = WorkflowRecord::new(parent, envelope(parent), vec![code(11), code(12)], "s");
        tracker.create(workflow);
        assert!(!tracker.all_subtasks_complete(parent).await);
        tracker.store_subtask_result(code(11), envelope(code(11))).await;
        assert!(!tracker.all_subtasks_complete(parent).await);
        tracker.store_subtask_result(code(12), envelope(code(12))).await;
        assert!(tracker.all_subtasks_complete(parent).await);
        assert_eq!(tracker.get_completed_results(parent).await.len(), 2);
    }
}
