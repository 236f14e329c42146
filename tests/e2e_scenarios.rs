//! End-to-end scenarios E1-E6, each driving a `RouterAgent` through the
//! `InMemoryBus` the way a real deployment would: publish an inbound
//! envelope, let the harness dispatch it, assert on what lands on the
//! queues a human or specialist agent would actually be consuming.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use cos_core::{
    AgentKind, Capability, Context, MessageEnvelope, Payload, Persona, Priority, ReferenceCode, SkillDefinition,
};
use cos_runtime::{
    Agent, AgentRegistry, AgentRuntime, AuthorityProvider, BusHandler, DelegationTracker, ExecutorRegistry,
    InMemoryBus, InMemorySequenceStore, MessageBus, PendingPlanStore, ReferenceCodeService, RouterAgent,
    SkillExecutor, SkillPipelineRunner, SkillRegistry, WorkflowTracker,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

struct Recorder {
    envelopes: Arc<Mutex<Vec<MessageEnvelope>>>,
}

#[async_trait]
impl BusHandler for Recorder {
    async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        self.envelopes.lock().unwrap().push(envelope);
        Ok(())
    }
}

fn recorder() -> (Arc<Mutex<Vec<MessageEnvelope>>>, Arc<Recorder>) {
    let envelopes = Arc::new(Mutex::new(Vec::new()));
    (envelopes.clone(), Arc::new(Recorder { envelopes }))
}

fn text_inbound(text: &str, reply_to: &str) -> MessageEnvelope {
    MessageEnvelope::new(
        Payload::TextMessage {
            message_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: None,
            text: text.to_string(),
        },
        ReferenceCode::from_parts(chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), 1).unwrap(),
        Context {
            reply_to: Some(reply_to.to_string()),
            ..Default::default()
        },
    )
}

async fn wait() {
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
}

struct Harness {
    bus: Arc<InMemoryBus>,
    registry: Arc<AgentRegistry>,
    delegations: Arc<DelegationTracker>,
    pending_plans: Arc<PendingPlanStore>,
    workflows: Arc<WorkflowTracker>,
    triage_result: Arc<Mutex<Value>>,
    router_runtime: Arc<AgentRuntime>,
}

async fn build_router(confidence_threshold: f64) -> Harness {
    let bus = Arc::new(InMemoryBus::new());
    let registry = Arc::new(AgentRegistry::new());
    let delegations = Arc::new(DelegationTracker::new());
    let workflows = Arc::new(WorkflowTracker::new());
    let pending_plans = Arc::new(PendingPlanStore::new());
    let reference_codes = Arc::new(ReferenceCodeService::new(Arc::new(InMemorySequenceStore::new())));

    let skills = Arc::new(SkillRegistry::new());
    skills.register(SkillDefinition::new("triage", "Triage", "", "triage", "scripted", None));
    let triage_result = Arc::new(Mutex::new(json!({"tasks": [], "summary": "", "confidence": 0.0})));
    let executors = Arc::new(ExecutorRegistry::new());
    struct SharedScriptedTriage(Arc<Mutex<Value>>);
    #[async_trait]
    impl SkillExecutor for SharedScriptedTriage {
        async fn execute(&self, _definition: &SkillDefinition, _params: &Map<String, Value>) -> anyhow::Result<Value> {
            Ok(self.0.lock().unwrap().clone())
        }
    }
    executors.register("scripted", Arc::new(SharedScriptedTriage(triage_result.clone())));

    let pipeline = Arc::new(SkillPipelineRunner::new(skills, executors));
    let persona = Persona::new(
        "cos",
        "Chief of Staff",
        "agent.founder",
        vec!["triage".to_string()],
        confidence_threshold,
    );

    let router = Arc::new(RouterAgent::new(
        persona,
        registry.clone(),
        delegations.clone(),
        workflows.clone(),
        pending_plans.clone(),
        reference_codes,
        pipeline,
        None,
        bus.clone(),
    ));

    let router_runtime = Arc::new(AgentRuntime::new(bus.clone(), registry.clone(), Some(Arc::new(AuthorityProvider::new()))));
    router_runtime.bootstrap(vec![router]).await.unwrap();

    Harness {
        bus,
        registry,
        delegations,
        pending_plans,
        workflows,
        triage_result,
        router_runtime,
    }
}

fn register_specialist(registry: &AgentRegistry, agent_id: &str, capability: &str) {
    registry.register(cos_core::AgentRegistration::new(
        agent_id,
        agent_id,
        AgentKind::Ai,
        vec![Capability {
            name: capability.to_string(),
            description: String::new(),
        }],
    ));
}

#[tokio::test]
async fn e1_routes_a_single_task() {
    let h = build_router(0.5).await;
    register_specialist(&h.registry, "email-agent", "email-drafting");

    *h.triage_result.lock().unwrap() = json!({
        "tasks": [{"capability": "email-drafting", "description": "Draft reply", "authorityTier": "DoItAndShowMe"}],
        "summary": "draft a reply",
        "confidence": 0.9
    });

    let (received, recorder) = recorder();
    h.bus.start_consuming("agent.email-agent", recorder).await.unwrap();

    h.bus
        .publish(text_inbound("Draft reply to John", "agent.user"), "agent.cos")
        .await
        .unwrap();
    wait().await;

    let envelopes = received.lock().unwrap();
    assert_eq!(envelopes.len(), 1);
    let envelope = &envelopes[0];
    assert_eq!(envelope.context.from_agent_id.as_deref(), Some("cos"));
    assert_eq!(envelope.context.reply_to.as_deref(), Some("agent.user"));
    assert_eq!(envelope.authority_claims.len(), 1);
    assert_eq!(envelope.authority_claims[0].granted_to, "email-agent");
    assert_eq!(envelope.authority_claims[0].tier, cos_core::AuthorityTier::JustDoIt);

    let delegations = h.delegations.get_by_assignee("email-agent");
    assert_eq!(delegations.len(), 1);
    assert_eq!(delegations[0].status, cos_core::DelegationStatus::Assigned);
}

#[tokio::test]
async fn e2_escalates_on_unroutable_capability() {
    let h = build_router(0.5).await;
    *h.triage_result.lock().unwrap() = json!({
        "tasks": [{"capability": "quantum-physics", "description": "Solve", "authorityTier": "JustDoIt"}],
        "summary": "s",
        "confidence": 0.95
    });

    let (received, recorder) = recorder();
    h.bus.start_consuming("agent.founder", recorder).await.unwrap();

    h.bus
        .publish(text_inbound("Solve physics", "agent.user"), "agent.cos")
        .await
        .unwrap();
    wait().await;

    assert_eq!(received.lock().unwrap().len(), 1);
    let delegations = h.delegations.get_by_assignee("agent.founder");
    assert_eq!(delegations.len(), 1);
    assert!(delegations[0].description.starts_with("Escalated"));
}

#[tokio::test]
async fn e3_approval_gate_then_resume() {
    let h = build_router(0.5).await;
    register_specialist(&h.registry, "finance-agent", "wire-transfer");

    *h.triage_result.lock().unwrap() = json!({
        "tasks": [{"capability": "wire-transfer", "description": "Send $10k", "authorityTier": "AskMeFirst"}],
        "summary": "wire transfer",
        "confidence": 0.9
    });

    let (founder_received, founder_recorder) = recorder();
    h.bus.start_consuming("agent.founder", founder_recorder).await.unwrap();
    let (specialist_received, specialist_recorder) = recorder();
    h.bus
        .start_consuming("agent.finance-agent", specialist_recorder)
        .await
        .unwrap();

    h.bus
        .publish(text_inbound("Send $10k to vendor", "agent.user"), "agent.cos")
        .await
        .unwrap();
    wait().await;

    assert!(specialist_received.lock().unwrap().is_empty());
    let proposals = founder_received.lock().unwrap();
    assert_eq!(proposals.len(), 1);
    let Payload::PlanProposal {
        workflow_ref_code,
        task_descriptions,
        ..
    } = &proposals[0].payload
    else {
        panic!("expected a PlanProposal");
    };
    assert_eq!(task_descriptions, &vec!["Send $10k".to_string()]);
    let w = *workflow_ref_code;
    drop(proposals);

    h.bus
        .publish(
            MessageEnvelope::new(
                Payload::PlanApprovalResponse {
                    message_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    correlation_id: None,
                    is_approved: true,
                    rejection_reason: None,
                    workflow_ref_code: w,
                },
                w,
                Context::default(),
            ),
            "agent.cos",
        )
        .await
        .unwrap();
    wait().await;

    assert_eq!(specialist_received.lock().unwrap().len(), 1);
    assert!(h.pending_plans.get(w).is_none());
}

#[tokio::test]
async fn e4_rejection_sends_text_and_removes_plan() {
    let h = build_router(0.5).await;
    register_specialist(&h.registry, "finance-agent", "wire-transfer");

    *h.triage_result.lock().unwrap() = json!({
        "tasks": [{"capability": "wire-transfer", "description": "Send $10k", "authorityTier": "AskMeFirst"}],
        "summary": "wire transfer",
        "confidence": 0.9
    });

    let (founder_received, founder_recorder) = recorder();
    h.bus.start_consuming("agent.founder", founder_recorder).await.unwrap();
    let (user_received, user_recorder) = recorder();
    h.bus.start_consuming("agent.user", user_recorder).await.unwrap();
    let (specialist_received, specialist_recorder) = recorder();
    h.bus
        .start_consuming("agent.finance-agent", specialist_recorder)
        .await
        .unwrap();

    h.bus
        .publish(text_inbound("Send $10k to vendor", "agent.user"), "agent.cos")
        .await
        .unwrap();
    wait().await;

    let w = {
        let proposals = founder_received.lock().unwrap();
        let Payload::PlanProposal { workflow_ref_code, .. } = &proposals[0].payload else {
            panic!("expected a PlanProposal");
        };
        *workflow_ref_code
    };

    h.bus
        .publish(
            MessageEnvelope::new(
                Payload::PlanApprovalResponse {
                    message_id: Uuid::new_v4(),
                    timestamp: Utc::now(),
                    correlation_id: None,
                    is_approved: false,
                    rejection_reason: Some("Too risky".to_string()),
                    workflow_ref_code: w,
                },
                w,
                Context::default(),
            ),
            "agent.cos",
        )
        .await
        .unwrap();
    wait().await;

    assert!(specialist_received.lock().unwrap().is_empty());
    assert!(h.pending_plans.get(w).is_none());
    let user_messages = user_received.lock().unwrap();
    assert_eq!(user_messages.len(), 1);
    let Payload::TextMessage { text, .. } = &user_messages[0].payload else {
        panic!("expected a TextMessage");
    };
    assert!(text.contains("Too risky"));
}

#[tokio::test]
async fn e7_multi_task_aggregate_reply_carries_the_parent_reference_code() {
    let h = build_router(0.5).await;
    register_specialist(&h.registry, "email-agent", "email-drafting");
    register_specialist(&h.registry, "finance-agent", "invoice-lookup");

    *h.triage_result.lock().unwrap() = json!({
        "tasks": [
            {"capability": "email-drafting", "description": "Draft reply", "authorityTier": "JustDoIt"},
            {"capability": "invoice-lookup", "description": "Find invoice", "authorityTier": "JustDoIt"}
        ],
        "summary": "draft and look up",
        "confidence": 0.9
    });

    let (email_received, email_recorder) = recorder();
    h.bus.start_consuming("agent.email-agent", email_recorder).await.unwrap();
    let (finance_received, finance_recorder) = recorder();
    h.bus.start_consuming("agent.finance-agent", finance_recorder).await.unwrap();
    let (user_received, user_recorder) = recorder();
    h.bus.start_consuming("agent.user", user_recorder).await.unwrap();

    h.bus
        .publish(text_inbound("Draft reply and find the invoice", "agent.user"), "agent.cos")
        .await
        .unwrap();
    wait().await;

    let subtask_a = email_received.lock().unwrap()[0].reference_code;
    let subtask_b = finance_received.lock().unwrap()[0].reference_code;
    let workflow = h.workflows.find_by_subtask(subtask_a).expect("subtask should be tracked");
    let parent = workflow.reference_code;
    assert_eq!(h.workflows.find_by_subtask(subtask_b).unwrap().reference_code, parent);

    // Simulate both specialists replying directly to the router's own queue.
    for subtask in [subtask_a, subtask_b] {
        let reply = MessageEnvelope::new(
            Payload::TextMessage {
                message_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                correlation_id: None,
                text: "done".to_string(),
            },
            subtask,
            Context::default(),
        );
        h.bus.publish(reply, "agent.cos").await.unwrap();
    }
    wait().await;

    let user_messages = user_received.lock().unwrap();
    assert_eq!(user_messages.len(), 1);
    assert_eq!(user_messages[0].reference_code, parent);
    assert_ne!(parent, subtask_a);
    assert_ne!(parent, subtask_b);
}

#[tokio::test]
async fn e8_second_unroutable_task_leaves_first_task_queue_untouched() {
    let h = build_router(0.5).await;
    register_specialist(&h.registry, "email-agent", "email-drafting");

    *h.triage_result.lock().unwrap() = json!({
        "tasks": [
            {"capability": "email-drafting", "description": "Draft reply", "authorityTier": "JustDoIt"},
            {"capability": "quantum-physics", "description": "Solve", "authorityTier": "JustDoIt"}
        ],
        "summary": "draft and solve",
        "confidence": 0.9
    });

    let (email_received, email_recorder) = recorder();
    h.bus.start_consuming("agent.email-agent", email_recorder).await.unwrap();
    let (founder_received, founder_recorder) = recorder();
    h.bus.start_consuming("agent.founder", founder_recorder).await.unwrap();

    h.bus
        .publish(text_inbound("Draft reply and solve physics", "agent.user"), "agent.cos")
        .await
        .unwrap();
    wait().await;

    assert!(email_received.lock().unwrap().is_empty());
    let escalations = founder_received.lock().unwrap();
    assert_eq!(escalations.len(), 1);
    let delegations = h.delegations.get_by_assignee("agent.founder");
    assert_eq!(delegations.len(), 1);
    assert!(delegations[0].description.starts_with("Escalated"));
}

struct CountingAgent {
    id: String,
    calls: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait]
impl Agent for CountingAgent {
    fn agent_id(&self) -> &str {
        &self.id
    }
    fn name(&self) -> &str {
        &self.id
    }
    fn capabilities(&self) -> Vec<Capability> {
        vec![]
    }
    async fn process(&self, _envelope: MessageEnvelope) -> anyhow::Result<Option<Payload>> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test]
async fn e6_stopping_one_consumer_leaves_the_other_running() {
    let bus = Arc::new(InMemoryBus::new());
    let registry = Arc::new(AgentRegistry::new());
    let runtime = AgentRuntime::new(bus.clone(), registry, None);

    let calls_a = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let calls_b = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    runtime
        .start_agent(
            Arc::new(CountingAgent {
                id: "a".to_string(),
                calls: calls_a.clone(),
            }),
            None,
        )
        .await
        .unwrap();
    runtime
        .start_agent(
            Arc::new(CountingAgent {
                id: "b".to_string(),
                calls: calls_b.clone(),
            }),
            None,
        )
        .await
        .unwrap();

    runtime.stop_agent("a").await.unwrap();

    bus.publish(text_inbound("hi", "agent.user"), "agent.a").await.unwrap();
    bus.publish(text_inbound("hi", "agent.user"), "agent.b").await.unwrap();
    wait().await;

    assert_eq!(calls_a.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(calls_b.load(std::sync::atomic::Ordering::SeqCst), 1);
}
