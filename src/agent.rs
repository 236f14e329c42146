//! The tagged interface a harness wires to a queue.

use async_trait::async_trait;
use cos_core::{Capability, MessageEnvelope, Payload};

/// One peer in the runtime — human-fronted or AI-backed, the harness
/// doesn't care which. Mirrors the teacher's own `Agent` trait
/// (`agent_type`/`name`/`system_prompt`/`model`/`execute`), narrowed to
/// what the harness dispatch protocol needs.
#[async_trait]
pub trait Agent: Send + Sync {
    fn agent_id(&self) -> &str;
    fn name(&self) -> &str;
    fn capabilities(&self) -> Vec<Capability>;

    /// Returning `Ok(Some(payload))` publishes a reply carrying it, stamped
    /// by the harness per the dispatch protocol; `Ok(None)` acknowledges
    /// with no reply. `Err` propagates to the bus so the message is
    /// dead-lettered.
    async fn process(&self, envelope: MessageEnvelope) -> anyhow::Result<Option<Payload>>;
}
