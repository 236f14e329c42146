//! Register agents; look up by id, capability, or availability (C4).
//!
//! Backed by `dashmap::DashMap` so routing decisions — issued on every
//! inbound envelope — never contend with a global lock.

use cos_core::AgentRegistration;
use dashmap::DashMap;

#[derive(Default)]
pub struct AgentRegistry {
    agents: DashMap<String, AgentRegistration>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: a second registration under the same id overwrites the
    /// first wholesale.
    pub fn register(&self, registration: AgentRegistration) {
        self.agents.insert(registration.agent_id.clone(), registration);
    }

    pub fn find_by_id(&self, agent_id: &str) -> Option<AgentRegistration> {
        self.agents.get(agent_id).map(|entry| entry.clone())
    }

    /// Returns every available registration advertising `capability_name`.
    pub fn find_by_capability(&self, capability_name: &str) -> Vec<AgentRegistration> {
        self.agents
            .iter()
            .filter(|entry| entry.is_available && entry.has_capability(capability_name))
            .map(|entry| entry.clone())
            .collect()
    }

    pub fn mark_unavailable(&self, agent_id: &str) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.is_available = false;
        }
    }

    pub fn all(&self) -> Vec<AgentRegistration> {
        self.agents.iter().map(|entry| entry.clone()).collect()
    }
}
