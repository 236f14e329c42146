use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reference_code::ReferenceCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelegationStatus {
    Assigned,
    InProgress,
    AwaitingReview,
    Complete,
    Overdue,
}

/// An immutable record of a single unit of delegated work. State changes
/// produce a new record via [`DelegationRecord::with_status`]; nothing here
/// is mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub reference_code: ReferenceCode,
    pub delegated_by: String,
    pub delegated_to: String,
    pub description: String,
    pub status: DelegationStatus,
    pub assigned_at: DateTime<Utc>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DelegationRecord {
    pub fn new(
        reference_code: ReferenceCode,
        delegated_by: impl Into<String>,
        delegated_to: impl Into<String>,
        description: impl Into<String>,
        due_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            reference_code,
            delegated_by: delegated_by.into(),
            delegated_to: delegated_to.into(),
            description: description.into(),
            status: DelegationStatus::Assigned,
            assigned_at: Utc::now(),
            due_at,
            completed_at: None,
        }
    }

    pub fn with_status(&self, status: DelegationStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        if matches!(next.status, DelegationStatus::Complete) {
            next.completed_at = Some(Utc::now());
        }
        next
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        !matches!(self.status, DelegationStatus::Complete)
            && self.due_at.is_some_and(|due| due < now)
    }
}
