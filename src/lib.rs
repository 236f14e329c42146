//! Chief of Staff orchestration runtime: the agent harness and runtime, the
//! router/decomposer agent, workflow and delegation state machines with
//! supervision, the tiered authority model, and the in-memory bus
//! implementing the message-bus contract that the core depends on.

pub mod agent;
pub mod authority_provider;
pub mod bus;
pub mod context_provider;
pub mod delegation_tracker;
pub mod error;
pub mod harness;
pub mod pending_plan_store;
pub mod reference_code_service;
pub mod registry;
pub mod router;
pub mod sequence_store;
pub mod skill_pipeline;
pub mod supervision;
pub mod workflow_tracker;

pub use agent::Agent;
pub use authority_provider::AuthorityProvider;
pub use bus::{BusHandler, ConsumerHandle, InMemoryBus, MessageBus, DEAD_LETTER_QUEUE};
pub use context_provider::ContextProvider;
pub use delegation_tracker::{DelegationTracker, RetryCounter};
pub use error::{RuntimeError, RuntimeResult};
pub use harness::AgentHarness;
pub use pending_plan_store::PendingPlanStore;
pub use reference_code_service::ReferenceCodeService;
pub use registry::AgentRegistry;
pub use router::RouterAgent;
pub use sequence_store::{InMemorySequenceStore, SequenceStore, SqliteSequenceStore};
pub use skill_pipeline::{ExecutorRegistry, PipelineContext, SkillExecutor, SkillPipelineRunner, SkillRegistry};
pub use supervision::{SupervisionConfig, SupervisionService};
pub use workflow_tracker::WorkflowTracker;

/// Runtime-level equivalent of the router's configuration knobs not
/// carried by `Persona` itself. Constructed with plain `Default` values in
/// `main`; no external config loader, per the core's explicit non-goal.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub confidence_threshold: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.6,
        }
    }
}

pub mod runtime;
pub use runtime::AgentRuntime;
