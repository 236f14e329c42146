use serde::{Deserialize, Serialize};

use crate::agent::Capability;

/// The configuration that gives a router agent its behaviour: which skills
/// it runs in triage, where it escalates to, and how confident a
/// decomposition must be before it's trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub agent_id: String,
    pub name: String,
    pub agent_type: String,
    pub capabilities: Vec<Capability>,
    pub pipeline: Vec<String>,
    pub escalation_target: String,
    pub model_tier: String,
    pub confidence_threshold: f64,
}

impl Persona {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        escalation_target: impl Into<String>,
        pipeline: Vec<String>,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            agent_type: "ai".to_string(),
            capabilities: Vec::new(),
            pipeline,
            escalation_target: escalation_target.into(),
            model_tier: "default".to_string(),
            confidence_threshold,
        }
    }
}
