//! Wire one agent to its queue; stamp replies; validate authority (C10).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use cos_core::{AgentKind, AgentRegistration, MessageEnvelope};
use tokio::sync::Mutex;
use tracing::{instrument, warn};

use crate::authority_provider::AuthorityProvider;
use crate::bus::{BusHandler, ConsumerHandle, MessageBus};
use crate::error::RuntimeResult;
use crate::registry::AgentRegistry;

pub fn queue_name(agent_id: &str) -> String {
    format!("agent.{agent_id}")
}

/// One running agent: its queue binding, registry entry, and the consumer
/// handle that owns its transport resources.
pub struct AgentHarness {
    agent: Arc<dyn crate::agent::Agent>,
    bus: Arc<dyn MessageBus>,
    registry: Arc<AgentRegistry>,
    authority: Option<Arc<AuthorityProvider>>,
    handle: Mutex<Option<ConsumerHandle>>,
}

impl AgentHarness {
    pub fn new(
        agent: Arc<dyn crate::agent::Agent>,
        bus: Arc<dyn MessageBus>,
        registry: Arc<AgentRegistry>,
        authority: Option<Arc<AuthorityProvider>>,
    ) -> Self {
        Self {
            agent,
            bus,
            registry,
            authority,
            handle: Mutex::new(None),
        }
    }

    pub fn agent_id(&self) -> &str {
        self.agent.agent_id()
    }

    pub async fn start(&self) -> RuntimeResult<()> {
        self.registry.register(AgentRegistration::new(
            self.agent.agent_id(),
            self.agent.name(),
            AgentKind::Ai,
            self.agent.capabilities(),
        ));

        let dispatcher = Arc::new(Dispatcher {
            agent: self.agent.clone(),
            bus: self.bus.clone(),
            authority: self.authority.clone(),
        });
        let handle = self
            .bus
            .start_consuming(&queue_name(self.agent.agent_id()), dispatcher)
            .await?;
        *self.handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stops only this agent's consumer and marks it unavailable. Other
    /// harnesses sharing the bus are unaffected.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.stop().await;
        }
        self.registry.mark_unavailable(self.agent.agent_id());
    }
}

struct Dispatcher {
    agent: Arc<dyn crate::agent::Agent>,
    bus: Arc<dyn MessageBus>,
    authority: Option<Arc<AuthorityProvider>>,
}

#[async_trait]
impl BusHandler for Dispatcher {
    #[instrument(skip(self, envelope), fields(agent_id = %self.agent.agent_id()))]
    async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()> {
        if let Some(_authority) = &self.authority {
            if !envelope.authority_claims.is_empty() {
                let now = Utc::now();
                let valid = envelope
                    .authority_claims
                    .iter()
                    .any(|c| c.granted_to == self.agent.agent_id() && !c.is_expired_at(now));
                if !valid {
                    warn!("dropping envelope: no valid authority claim for this agent");
                    return Ok(());
                }
            }
        }

        let reply_payload = self.agent.process(envelope.clone()).await?;

        if let Some(payload) = reply_payload {
            match &envelope.context.reply_to {
                None => {
                    warn!("agent returned a reply with no reply_to; dropping");
                }
                Some(reply_to) => {
                    let reply = envelope.reply(payload, self.agent.agent_id());
                    self.bus.publish(reply, reply_to).await?;
                }
            }
        }

        Ok(())
    }
}
