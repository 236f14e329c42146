use std::sync::Arc;

use anyhow::Result;
use cos_core::Persona;
use cos_runtime::{
    AgentRegistry, AgentRuntime, AuthorityProvider, DelegationTracker, ExecutorRegistry, InMemoryBus,
    InMemorySequenceStore, PendingPlanStore, ReferenceCodeService, RetryCounter, RouterAgent, SkillPipelineRunner,
    SkillRegistry, SupervisionConfig, SupervisionService, WorkflowTracker,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("failed to set tracing subscriber");

    info!("starting Chief of Staff orchestration runtime");

    let bus = Arc::new(InMemoryBus::new());
    let registry = Arc::new(AgentRegistry::new());
    let authority = Arc::new(AuthorityProvider::new());
    let delegations = Arc::new(DelegationTracker::new());
    let workflows = Arc::new(WorkflowTracker::new());
    let pending_plans = Arc::new(PendingPlanStore::new());
    let retry_counter = Arc::new(RetryCounter::new());
    let reference_codes = Arc::new(ReferenceCodeService::new(Arc::new(InMemorySequenceStore::new())));
    let skills = Arc::new(SkillRegistry::new());
    let executors = Arc::new(ExecutorRegistry::new());
    let pipeline = Arc::new(SkillPipelineRunner::new(skills, executors));

    let persona = Persona::new("cos", "Chief of Staff", "agent.founder", vec!["triage".to_string()], 0.6);

    let router = Arc::new(RouterAgent::new(
        persona,
        registry.clone(),
        delegations.clone(),
        workflows,
        pending_plans,
        reference_codes,
        pipeline,
        None,
        bus.clone(),
    ));

    let runtime = Arc::new(AgentRuntime::new(bus.clone(), registry, Some(authority)));
    runtime.bootstrap(vec![router]).await?;

    let supervision = SupervisionService::new(
        SupervisionConfig::default(),
        delegations,
        retry_counter,
        bus,
        Some(runtime.clone()),
    );
    let cancel = CancellationToken::new();
    let supervision_cancel = cancel.clone();
    let supervision_handle = tokio::spawn(async move { supervision.run(supervision_cancel).await });

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    cancel.cancel();
    let _ = supervision_handle.await;
    runtime.shutdown().await;

    Ok(())
}
