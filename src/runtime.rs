//! Own the set of harnesses; add/stop/team operations (C11).

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use crate::agent::Agent;
use crate::authority_provider::AuthorityProvider;
use crate::bus::MessageBus;
use crate::error::{RuntimeError, RuntimeResult};
use crate::harness::AgentHarness;
use crate::registry::AgentRegistry;

/// Holds every running harness keyed by agent id, plus team membership.
/// The same `start_agent`/`stop_agent` pair handles both ephemeral and
/// long-lived agents — only the caller's intent differs.
pub struct AgentRuntime {
    bus: Arc<dyn MessageBus>,
    registry: Arc<AgentRegistry>,
    authority: Option<Arc<AuthorityProvider>>,
    harnesses: DashMap<String, Arc<AgentHarness>>,
    teams: DashMap<String, HashSet<String>>,
}

impl AgentRuntime {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        registry: Arc<AgentRegistry>,
        authority: Option<Arc<AuthorityProvider>>,
    ) -> Self {
        Self {
            bus,
            registry,
            authority,
            harnesses: DashMap::new(),
            teams: DashMap::new(),
        }
    }

    /// Starts every agent in `seed` at construction time, per C11's startup
    /// contract.
    pub async fn bootstrap(&self, seed: Vec<Arc<dyn Agent>>) -> RuntimeResult<()> {
        for agent in seed {
            self.start_agent(agent, None).await?;
        }
        Ok(())
    }

    pub async fn start_agent(&self, agent: Arc<dyn Agent>, team_id: Option<&str>) -> RuntimeResult<String> {
        let agent_id = agent.agent_id().to_string();
        if self.harnesses.contains_key(&agent_id) {
            return Err(RuntimeError::AgentAlreadyRunning(agent_id));
        }

        let harness = Arc::new(AgentHarness::new(
            agent,
            self.bus.clone(),
            self.registry.clone(),
            self.authority.clone(),
        ));
        harness.start().await?;
        self.harnesses.insert(agent_id.clone(), harness);

        if let Some(team_id) = team_id {
            self.teams.entry(team_id.to_string()).or_default().insert(agent_id.clone());
        }

        info!(agent_id = %agent_id, team_id, "agent started");
        Ok(agent_id)
    }

    pub async fn stop_agent(&self, agent_id: &str) -> RuntimeResult<()> {
        let (_, harness) = self
            .harnesses
            .remove(agent_id)
            .ok_or_else(|| RuntimeError::AgentNotRunning(agent_id.to_string()))?;
        harness.stop().await;
        for mut team in self.teams.iter_mut() {
            team.remove(agent_id);
        }
        info!(agent_id, "agent stopped");
        Ok(())
    }

    pub async fn stop_team(&self, team_id: &str) -> RuntimeResult<()> {
        let (_, members) = self
            .teams
            .remove(team_id)
            .ok_or_else(|| RuntimeError::UnknownTeam(team_id.to_string()))?;
        for agent_id in members {
            if let Some((_, harness)) = self.harnesses.remove(&agent_id) {
                harness.stop().await;
            }
        }
        Ok(())
    }

    pub fn running_agent_ids(&self) -> Vec<String> {
        self.harnesses.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn get_team_agent_ids(&self, team_id: &str) -> Vec<String> {
        self.teams
            .get(team_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.running_agent_ids();
        for agent_id in ids {
            if let Some((_, harness)) = self.harnesses.remove(&agent_id) {
                harness.stop().await;
            }
        }
    }
}
