use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::envelope::{Decomposition, MessageEnvelope};

/// A decomposed plan awaiting a human `PlanApprovalResponse`, keyed
/// externally by the workflow reference code it was stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPlan {
    pub original_envelope: MessageEnvelope,
    pub decomposition: Decomposition,
    pub stored_at: DateTime<Utc>,
}

impl PendingPlan {
    pub fn new(original_envelope: MessageEnvelope, decomposition: Decomposition) -> Self {
        Self {
            original_envelope,
            decomposition,
            stored_at: Utc::now(),
        }
    }
}
