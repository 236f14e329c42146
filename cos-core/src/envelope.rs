use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authority::AuthorityClaim;
use crate::reference_code::ReferenceCode;

/// Delivery priority. Ordering is advisory to the bus; the core never
/// depends on priority to establish correctness, only on per-queue FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Routing and provenance metadata carried alongside a payload.
///
/// `parent_message_id` is set on replies to the originating message's id;
/// `from_agent_id` names whichever agent most recently emitted the
/// envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub parent_message_id: Option<Uuid>,
    pub original_goal: Option<String>,
    pub team_id: Option<String>,
    pub channel_id: Option<String>,
    pub reply_to: Option<String>,
    pub from_agent_id: Option<String>,
}

/// A decomposed task, as interpreted from a skill pipeline's final result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecomposedTask {
    pub capability: String,
    pub description: String,
    pub authority_tier: crate::authority::AuthorityTier,
}

/// The router's interpretation of a skill pipeline's terminal result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decomposition {
    pub tasks: Vec<DecomposedTask>,
    pub summary: String,
    pub confidence: f64,
}

/// Closed set of message bodies the runtime understands. Tagged so that an
/// envelope round-trips through any serde-backed transport without losing
/// its variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Payload {
    TextMessage {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Option<Uuid>,
        text: String,
    },
    PlanProposal {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Option<Uuid>,
        summary: String,
        task_descriptions: Vec<String>,
        original_goal: String,
        workflow_ref_code: ReferenceCode,
    },
    PlanApprovalResponse {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Option<Uuid>,
        is_approved: bool,
        rejection_reason: Option<String>,
        workflow_ref_code: ReferenceCode,
    },
    SupervisionAlert {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Option<Uuid>,
        delegation_ref_code: ReferenceCode,
        delegated_to: String,
        description: String,
        retry_count: u32,
        due_at: Option<DateTime<Utc>>,
        is_agent_running: bool,
    },
    EscalationAlert {
        message_id: Uuid,
        timestamp: DateTime<Utc>,
        correlation_id: Option<Uuid>,
        delegation_ref_code: ReferenceCode,
        delegated_to: String,
        description: String,
        retry_count: u32,
        reason: String,
    },
}

impl Payload {
    pub fn message_id(&self) -> Uuid {
        match self {
            Payload::TextMessage { message_id, .. }
            | Payload::PlanProposal { message_id, .. }
            | Payload::PlanApprovalResponse { message_id, .. }
            | Payload::SupervisionAlert { message_id, .. }
            | Payload::EscalationAlert { message_id, .. } => *message_id,
        }
    }

    /// Flattened, human-readable rendering used wherever the spec calls for
    /// "the payload rendered as text" (escalation summaries, the original
    /// goal carried in a `PlanProposal`, rejection text).
    pub fn render_text(&self) -> String {
        match self {
            Payload::TextMessage { text, .. } => text.clone(),
            Payload::PlanProposal { summary, .. } => summary.clone(),
            Payload::PlanApprovalResponse {
                is_approved,
                rejection_reason,
                ..
            } => {
                if *is_approved {
                    "approved".to_string()
                } else {
                    rejection_reason.clone().unwrap_or_else(|| "rejected".to_string())
                }
            }
            Payload::SupervisionAlert { description, .. } => description.clone(),
            Payload::EscalationAlert { description, reason, .. } => format!("{description} ({reason})"),
        }
    }
}

/// The unit of transport on the bus. Immutable once constructed: a reply is
/// always a fresh `MessageEnvelope`, never a mutation of the inbound one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub payload: Payload,
    pub reference_code: ReferenceCode,
    pub authority_claims: Vec<AuthorityClaim>,
    pub context: Context,
    pub priority: Priority,
    pub sla: Option<DateTime<Utc>>,
}

impl MessageEnvelope {
    pub fn new(payload: Payload, reference_code: ReferenceCode, context: Context) -> Self {
        Self {
            payload,
            reference_code,
            authority_claims: Vec::new(),
            context,
            priority: Priority::default(),
            sla: None,
        }
    }

    /// Build a reply envelope per the harness dispatch protocol: same
    /// reference code as the inbound message, `parent_message_id` set to
    /// the inbound payload's id, `from_agent_id` set to the replying agent.
    pub fn reply(&self, payload: Payload, from_agent_id: impl Into<String>) -> Self {
        let mut context = self.context.clone();
        context.parent_message_id = Some(self.payload.message_id());
        context.from_agent_id = Some(from_agent_id.into());
        Self {
            payload,
            reference_code: self.reference_code,
            authority_claims: Vec::new(),
            context,
            priority: self.priority,
            sla: self.sla,
        }
    }
}
