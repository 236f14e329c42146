use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single thing an agent claims it can do. Two registrations with
/// matching `name` are treated as offering the same capability regardless
/// of `description`, which is display-only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Ai,
    Human,
}

/// What the registry stores per agent. `is_available` flips to `false`
/// when the owning harness stops; the record itself is otherwise
/// overwritten wholesale on re-registration, never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRegistration {
    pub agent_id: String,
    pub name: String,
    pub agent_type: AgentKind,
    pub capabilities: Vec<Capability>,
    pub registered_at: DateTime<Utc>,
    pub is_available: bool,
}

impl AgentRegistration {
    pub fn new(
        agent_id: impl Into<String>,
        name: impl Into<String>,
        agent_type: AgentKind,
        capabilities: Vec<Capability>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            agent_type,
            capabilities,
            registered_at: Utc::now(),
            is_available: true,
        }
    }

    pub fn has_capability(&self, name: &str) -> bool {
        self.capabilities.iter().any(|c| c.name == name)
    }
}
