//! Pure data model for the Chief of Staff orchestration runtime: reference
//! codes, authority claims, message envelopes, and the records tracked by
//! the runtime's stores. Nothing in this crate touches a clock beyond
//! `chrono::Utc::now`, a channel, a lock, or a file — all I/O lives in
//! `cos-runtime`.

pub mod agent;
pub mod authority;
pub mod delegation;
pub mod envelope;
pub mod error;
pub mod pending_plan;
pub mod persona;
pub mod reference_code;
pub mod skill;
pub mod workflow;

pub use agent::{AgentKind, AgentRegistration, Capability};
pub use authority::{AuthorityClaim, AuthorityTier};
pub use delegation::{DelegationRecord, DelegationStatus};
pub use envelope::{Context, DecomposedTask, Decomposition, MessageEnvelope, Payload, Priority};
pub use error::CoreError;
pub use pending_plan::PendingPlan;
pub use persona::Persona;
pub use reference_code::ReferenceCode;
pub use skill::SkillDefinition;
pub use workflow::{WorkflowRecord, WorkflowStatus};
