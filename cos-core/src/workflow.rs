use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::MessageEnvelope;
use crate::reference_code::ReferenceCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    InProgress,
    Completed,
    Failed,
}

/// Tracks a multi-subtask decomposition from dispatch to aggregation. The
/// tracker owns two indexes keyed off this record: `reference_code` to
/// record, and each entry of `subtask_reference_codes` back to
/// `reference_code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub reference_code: ReferenceCode,
    pub original_envelope: MessageEnvelope,
    pub subtask_reference_codes: Vec<ReferenceCode>,
    pub summary: String,
    pub status: WorkflowStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkflowRecord {
    pub fn new(
        reference_code: ReferenceCode,
        original_envelope: MessageEnvelope,
        subtask_reference_codes: Vec<ReferenceCode>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            reference_code,
            original_envelope,
            subtask_reference_codes,
            summary: summary.into(),
            status: WorkflowStatus::InProgress,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_status(&self, status: WorkflowStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        if !matches!(next.status, WorkflowStatus::InProgress) {
            next.completed_at = Some(Utc::now());
        }
        next
    }
}
