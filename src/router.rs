//! Triage / decompose / route / gate / escalate / aggregate (C12) — the
//! heart of the system.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cos_core::{
    AuthorityClaim, AuthorityTier, Capability, Context, DecomposedTask, Decomposition, DelegationRecord,
    MessageEnvelope, Payload, PendingPlan, Persona, ReferenceCode, WorkflowRecord, WorkflowStatus,
};
use serde_json::Map;
use tracing::{instrument, warn};

use crate::agent::Agent;
use crate::bus::MessageBus;
use crate::context_provider::ContextProvider;
use crate::delegation_tracker::DelegationTracker;
use crate::harness::queue_name;
use crate::pending_plan_store::PendingPlanStore;
use crate::reference_code_service::ReferenceCodeService;
use crate::registry::AgentRegistry;
use crate::skill_pipeline::SkillPipelineRunner;
use crate::workflow_tracker::WorkflowTracker;

pub struct RouterAgent {
    persona: Persona,
    registry: Arc<AgentRegistry>,
    delegations: Arc<DelegationTracker>,
    workflows: Arc<WorkflowTracker>,
    pending_plans: Arc<PendingPlanStore>,
    reference_codes: Arc<ReferenceCodeService>,
    pipeline: Arc<SkillPipelineRunner>,
    context_provider: Option<Arc<dyn ContextProvider>>,
    bus: Arc<dyn MessageBus>,
}

impl RouterAgent {
    pub fn new(
        persona: Persona,
        registry: Arc<AgentRegistry>,
        delegations: Arc<DelegationTracker>,
        workflows: Arc<WorkflowTracker>,
        pending_plans: Arc<PendingPlanStore>,
        reference_codes: Arc<ReferenceCodeService>,
        pipeline: Arc<SkillPipelineRunner>,
        context_provider: Option<Arc<dyn ContextProvider>>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            persona,
            registry,
            delegations,
            workflows,
            pending_plans,
            reference_codes,
            pipeline,
            context_provider,
            bus,
        }
    }

    fn available_capabilities_csv(&self) -> String {
        self.registry
            .all()
            .into_iter()
            .filter(|r| r.is_available && r.agent_id != self.persona.agent_id)
            .flat_map(|r| r.capabilities.into_iter().map(|c| c.name))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `min over c in envelope.authorityClaims where c.grantedTo =
    /// router.agentId of c.tier`; absent any such claim, `JustDoIt`.
    fn inbound_effective_tier(&self, envelope: &MessageEnvelope) -> AuthorityTier {
        envelope
            .authority_claims
            .iter()
            .filter(|c| c.granted_to == self.persona.agent_id)
            .map(|c| c.tier)
            .min()
            .unwrap_or(AuthorityTier::JustDoIt)
    }

    /// Finds an available agent for `capability`, excluding the router
    /// itself — the self-exclusion invariant.
    fn find_specialist(&self, capability: &str) -> Option<String> {
        self.registry
            .find_by_capability(capability)
            .into_iter()
            .find(|r| r.agent_id != self.persona.agent_id)
            .map(|r| r.agent_id)
    }

    async fn run_triage(&self, envelope: &MessageEnvelope) -> Option<Decomposition> {
        let mut params = Map::new();
        params.insert(
            "availableCapabilities".to_string(),
            self.available_capabilities_csv().into(),
        );
        if let Some(provider) = &self.context_provider {
            if let Ok(entries) = provider.query(&envelope.payload.render_text()).await {
                params.insert("businessContext".to_string(), entries.join("; ").into());
            }
        }

        let context = self.pipeline.run(&self.persona.pipeline, envelope.clone(), params).await;
        let result = context.final_result()?;
        serde_json::from_value::<Decomposition>(result.clone()).ok()
    }

    fn should_escalate(&self, decomposition: &Option<Decomposition>) -> bool {
        match decomposition {
            None => true,
            Some(d) => d.tasks.is_empty() || d.confidence < self.persona.confidence_threshold,
        }
    }

    async fn dispatch_single_task(
        &self,
        inbound: &MessageEnvelope,
        task: &DecomposedTask,
        inbound_tier: AuthorityTier,
        reply_to_override: Option<String>,
    ) -> anyhow::Result<bool> {
        let Some(agent_id) = self.find_specialist(&task.capability) else {
            return Ok(false);
        };

        let outbound_tier = std::cmp::min(inbound_tier, task.authority_tier);
        let r = self.reference_codes.generate().await?;

        self.delegations.delegate(DelegationRecord::new(
            r,
            self.persona.agent_id.clone(),
            agent_id.clone(),
            task.description.clone(),
            None,
        ));

        let claim = AuthorityClaim::new(self.persona.agent_id.clone(), agent_id.clone(), outbound_tier, vec![], None);
        let reply_to = reply_to_override.or_else(|| inbound.context.reply_to.clone());
        let dispatch = dispatch_envelope(inbound, r, vec![claim], reply_to, &self.persona.agent_id);
        self.bus.publish(dispatch, &queue_name(&agent_id)).await?;
        Ok(true)
    }

    /// Fresh-triage entry point: checks the approval gate before dispatch.
    async fn route(
        &self,
        inbound: &MessageEnvelope,
        decomposition: Decomposition,
        inbound_tier: AuthorityTier,
    ) -> anyhow::Result<()> {
        let max_outbound_tier = decomposition
            .tasks
            .iter()
            .map(|t| std::cmp::min(inbound_tier, t.authority_tier))
            .max()
            .unwrap_or(AuthorityTier::JustDoIt);

        if max_outbound_tier == AuthorityTier::AskMeFirst {
            self.gate_for_approval(inbound, decomposition).await?;
            return Ok(());
        }

        self.dispatch_decomposition(inbound, decomposition, inbound_tier).await
    }

    /// Dispatches a decomposition without re-checking the approval gate.
    /// Used both by `route` once the gate has cleared and by approval
    /// handling, where the gate must not fire a second time — approval
    /// itself is what authorizes the `AskMeFirst` tier.
    async fn dispatch_decomposition(
        &self,
        inbound: &MessageEnvelope,
        decomposition: Decomposition,
        inbound_tier: AuthorityTier,
    ) -> anyhow::Result<()> {
        if decomposition.tasks.len() == 1 {
            let task = &decomposition.tasks[0];
            let dispatched = self.dispatch_single_task(inbound, task, inbound_tier, None).await?;
            if !dispatched {
                self.escalate(inbound, &format!("Unroutable capability: {}", task.capability)).await?;
            }
            return Ok(());
        }

        self.route_multi_task(inbound, decomposition, inbound_tier).await
    }

    async fn route_multi_task(
        &self,
        inbound: &MessageEnvelope,
        decomposition: Decomposition,
        inbound_tier: AuthorityTier,
    ) -> anyhow::Result<()> {
        // Validation pass first: resolve every task's specialist before
        // creating the workflow record or publishing anything. If any task
        // is unroutable, bail here — nothing has been dispatched yet for
        // this workflow, so there is nothing to undo.
        let mut agent_ids = Vec::with_capacity(decomposition.tasks.len());
        for task in &decomposition.tasks {
            let Some(agent_id) = self.find_specialist(&task.capability) else {
                self.escalate(inbound, &format!("Unroutable capability in workflow: {}", task.capability))
                    .await?;
                return Ok(());
            };
            agent_ids.push(agent_id);
        }

        // Commit pass: every task is routable, so it's now safe to create
        // the workflow record and dispatch each sub-task.
        let w = self.reference_codes.generate().await?;
        let mut subtask_codes = Vec::with_capacity(decomposition.tasks.len());
        for _ in &decomposition.tasks {
            subtask_codes.push(self.reference_codes.generate().await?);
        }

        self.workflows.create(WorkflowRecord::new(
            w,
            inbound.clone(),
            subtask_codes.clone(),
            decomposition.summary.clone(),
        ));

        for ((task, r), agent_id) in decomposition.tasks.iter().zip(subtask_codes.iter()).zip(agent_ids.into_iter()) {
            let outbound_tier = std::cmp::min(inbound_tier, task.authority_tier);
            self.delegations.delegate(DelegationRecord::new(
                *r,
                self.persona.agent_id.clone(),
                agent_id.clone(),
                task.description.clone(),
                None,
            ));
            let claim = AuthorityClaim::new(
                self.persona.agent_id.clone(),
                agent_id.clone(),
                outbound_tier,
                vec![],
                None,
            );
            let reply_to = queue_name(&self.persona.agent_id);
            let dispatch = dispatch_envelope(inbound, *r, vec![claim], Some(reply_to), &self.persona.agent_id);
            self.bus.publish(dispatch, &queue_name(&agent_id)).await?;
        }

        Ok(())
    }

    async fn gate_for_approval(&self, inbound: &MessageEnvelope, decomposition: Decomposition) -> anyhow::Result<()> {
        let w = self.reference_codes.generate().await?;
        let task_descriptions = decomposition.tasks.iter().map(|t| t.description.clone()).collect();
        let summary = decomposition.summary.clone();
        self.pending_plans.store(w, PendingPlan::new(inbound.clone(), decomposition));

        let proposal = Payload::PlanProposal {
            message_id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: None,
            summary,
            task_descriptions,
            original_goal: inbound.payload.render_text(),
            workflow_ref_code: w,
        };
        let envelope = dispatch_envelope(
            inbound,
            w,
            vec![],
            inbound.context.reply_to.clone(),
            &self.persona.agent_id,
        )
        .with_payload(proposal);
        self.bus
            .publish(envelope, &self.persona.escalation_target)
            .await?;
        Ok(())
    }

    async fn handle_approval_response(
        &self,
        inbound: &MessageEnvelope,
        is_approved: bool,
        rejection_reason: Option<String>,
        workflow_ref_code: ReferenceCode,
    ) -> anyhow::Result<()> {
        let Some(plan) = self.pending_plans.get(workflow_ref_code) else {
            // Duplicate or timed-out response, or response arrived before
            // the plan was stored — tolerate and treat as unknown.
            return Ok(());
        };
        self.pending_plans.remove(workflow_ref_code);

        if is_approved {
            // Approval itself elevates: force the effective inbound tier to
            // AskMeFirst for this dispatch regardless of the original
            // inbound claims, and dispatch directly — the gate must not
            // fire again on the same decomposition.
            self.dispatch_decomposition(&plan.original_envelope, plan.decomposition, AuthorityTier::AskMeFirst)
                .await?;
        } else {
            let reason = rejection_reason.unwrap_or_else(|| "rejected".to_string());
            if let Some(reply_to) = plan.original_envelope.context.reply_to.clone() {
                let reply = plan.original_envelope.reply(
                    Payload::TextMessage {
                        message_id: uuid::Uuid::new_v4(),
                        timestamp: Utc::now(),
                        correlation_id: None,
                        text: reason,
                    },
                    &self.persona.agent_id,
                );
                self.bus.publish(reply, &reply_to).await?;
            }
        }
        let _ = inbound;
        Ok(())
    }

    async fn handle_subtask_result(&self, inbound: &MessageEnvelope, parent: ReferenceCode) -> anyhow::Result<()> {
        self.workflows
            .store_subtask_result(inbound.reference_code, inbound.clone())
            .await;

        if !self.workflows.all_subtasks_complete(parent).await {
            return Ok(());
        }

        self.workflows.update_status(parent, WorkflowStatus::Completed);
        let Some(workflow) = self.workflows.get(parent) else {
            return Ok(());
        };
        let results = self.workflows.get_completed_results(parent).await;
        let summary = results
            .iter()
            .map(|e| e.payload.render_text())
            .collect::<Vec<_>>()
            .join("; ");

        if let Some(reply_to) = workflow.original_envelope.context.reply_to.clone() {
            let mut context = workflow.original_envelope.context.clone();
            context.parent_message_id = Some(workflow.original_envelope.payload.message_id());
            context.from_agent_id = Some(self.persona.agent_id.clone());
            // The aggregate reply carries the workflow's own parent reference
            // code, not whatever code the original inbound envelope arrived
            // with — the two can differ once the goal has been decomposed.
            let reply = MessageEnvelope {
                payload: Payload::TextMessage {
                    message_id: uuid::Uuid::new_v4(),
                    timestamp: Utc::now(),
                    correlation_id: None,
                    text: summary,
                },
                reference_code: workflow.reference_code,
                authority_claims: Vec::new(),
                context,
                priority: workflow.original_envelope.priority,
                sla: workflow.original_envelope.sla,
            };
            self.bus.publish(reply, &reply_to).await?;
        }
        Ok(())
    }

    async fn escalate(&self, inbound: &MessageEnvelope, description: &str) -> anyhow::Result<()> {
        let r = self.reference_codes.generate().await?;
        self.delegations.delegate(DelegationRecord::new(
            r,
            self.persona.agent_id.clone(),
            self.persona.escalation_target.clone(),
            format!("Escalated: {description}"),
            None,
        ));
        let envelope = dispatch_envelope(
            inbound,
            r,
            vec![],
            inbound.context.reply_to.clone(),
            &self.persona.agent_id,
        );
        self.bus.publish(envelope, &self.persona.escalation_target).await?;
        Ok(())
    }
}

/// Builds the envelope the router publishes downstream: payload unchanged
/// unless overridden with [`EnvelopeWithPayload::with_payload`], a fresh
/// reference code, the router as `from_agent_id`, and caller-chosen claims
/// and `reply_to`.
fn dispatch_envelope(
    inbound: &MessageEnvelope,
    reference_code: ReferenceCode,
    authority_claims: Vec<AuthorityClaim>,
    reply_to: Option<String>,
    router_id: &str,
) -> MessageEnvelope {
    MessageEnvelope {
        payload: inbound.payload.clone(),
        reference_code,
        authority_claims,
        context: Context {
            parent_message_id: Some(inbound.payload.message_id()),
            original_goal: inbound.context.original_goal.clone(),
            team_id: inbound.context.team_id.clone(),
            channel_id: inbound.context.channel_id.clone(),
            reply_to,
            from_agent_id: Some(router_id.to_string()),
        },
        priority: inbound.priority,
        sla: inbound.sla,
    }
}

trait EnvelopeWithPayload {
    fn with_payload(self, payload: Payload) -> MessageEnvelope;
}

impl EnvelopeWithPayload for MessageEnvelope {
    fn with_payload(mut self, payload: Payload) -> MessageEnvelope {
        self.payload = payload;
        self
    }
}

#[async_trait]
impl Agent for RouterAgent {
    fn agent_id(&self) -> &str {
        &self.persona.agent_id
    }

    fn name(&self) -> &str {
        &self.persona.name
    }

    fn capabilities(&self) -> Vec<Capability> {
        self.persona.capabilities.clone()
    }

    #[instrument(skip(self, envelope), fields(router_id = %self.persona.agent_id))]
    async fn process(&self, envelope: MessageEnvelope) -> anyhow::Result<Option<Payload>> {
        if let Payload::PlanApprovalResponse {
            is_approved,
            rejection_reason,
            workflow_ref_code,
            ..
        } = &envelope.payload
        {
            self.handle_approval_response(&envelope, *is_approved, rejection_reason.clone(), *workflow_ref_code)
                .await?;
            return Ok(None);
        }

        if let Some(parent) = self.workflows.find_by_subtask(envelope.reference_code) {
            self.handle_subtask_result(&envelope, parent.reference_code).await?;
            return Ok(None);
        }

        let inbound_tier = self.inbound_effective_tier(&envelope);
        let decomposition = self.run_triage(&envelope).await;
        if self.should_escalate(&decomposition) {
            warn!("triage escalated: missing, unparsable, low-confidence, or empty decomposition");
            self.escalate(&envelope, "Low-confidence or unparsable triage result").await?;
            return Ok(None);
        }

        self.route(&envelope, decomposition.unwrap(), inbound_tier).await?;
        Ok(None)
    }
}
