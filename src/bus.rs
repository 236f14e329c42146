//! In-memory reference implementation of the message bus contract.
//!
//! A concrete broker (topic exchange, wire encoding, persistence) is out of
//! scope; this bus satisfies the exact contract — per-queue FIFO, prefetch
//! of one, dead-letter on handler failure, per-consumer scoped stop — so
//! the runtime and its tests have something to run against.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cos_core::MessageEnvelope;

use crate::error::{RuntimeError, RuntimeResult};

pub const DEAD_LETTER_QUEUE: &str = "dead-letter";

/// Invoked once per message delivered to a consumer. Returning `Err`
/// dead-letters the message; returning `Ok` acknowledges it.
#[async_trait]
pub trait BusHandler: Send + Sync {
    async fn handle(&self, envelope: MessageEnvelope) -> anyhow::Result<()>;
}

/// Skeletal interface for the bus contract (§4.3): publish, per-consumer
/// start/stop, stop-all. A concrete broker would implement this the same
/// way `InMemoryBus` does, just with a durable transport underneath.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, envelope: MessageEnvelope, queue_name: &str) -> RuntimeResult<()>;

    async fn start_consuming(
        &self,
        queue_name: &str,
        handler: Arc<dyn BusHandler>,
    ) -> RuntimeResult<ConsumerHandle>;

    async fn stop_all(&self);
}

struct Queue {
    sender: mpsc::UnboundedSender<MessageEnvelope>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<MessageEnvelope>>>,
}

fn new_queue() -> Arc<Queue> {
    let (sender, receiver) = mpsc::unbounded_channel();
    Arc::new(Queue {
        sender,
        receiver: Mutex::new(Some(receiver)),
    })
}

/// A scoped handle to exactly one consumer. Dropping it leaks the consumer
/// task running forever; callers must `stop()` it to release transport
/// resources, mirroring the teacher's resource-owning handles.
pub struct ConsumerHandle {
    queue_name: String,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl ConsumerHandle {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Stops only this consumer; every other consumer on the bus keeps
    /// running.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

/// The reference bus: one unbounded `mpsc` channel per queue, a single
/// consumer task draining it strictly in order (prefetch = 1 falls out of
/// awaiting the handler before the next `recv`), and a dedicated
/// dead-letter queue that never dead-letters itself.
#[derive(Default)]
pub struct InMemoryBus {
    queues: DashMap<String, Arc<Queue>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, name: &str) -> Arc<Queue> {
        self.queues
            .entry(name.to_string())
            .or_insert_with(new_queue)
            .clone()
    }

    async fn dead_letter(&self, envelope: MessageEnvelope, reason: &str) {
        warn!(queue = DEAD_LETTER_QUEUE, reason, "dead-lettering message");
        let queue = self.queue(DEAD_LETTER_QUEUE);
        let _ = queue.sender.send(envelope);
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, envelope: MessageEnvelope, queue_name: &str) -> RuntimeResult<()> {
        let queue = self.queue(queue_name);
        queue
            .sender
            .send(envelope)
            .map_err(|_| RuntimeError::UnknownQueue(queue_name.to_string()))?;
        Ok(())
    }

    async fn start_consuming(
        &self,
        queue_name: &str,
        handler: Arc<dyn BusHandler>,
    ) -> RuntimeResult<ConsumerHandle> {
        let queue = self.queue(queue_name);
        let mut guard = queue.receiver.lock().await;
        let mut receiver = guard
            .take()
            .ok_or_else(|| RuntimeError::ConsumerAlreadyRegistered(queue_name.to_string()))?;
        drop(guard);

        let cancel = CancellationToken::new();
        let queue_name_owned = queue_name.to_string();
        let is_dead_letter = queue_name_owned == DEAD_LETTER_QUEUE;
        let task_cancel = cancel.clone();
        let dead_letter_sink = self.queue(DEAD_LETTER_QUEUE);

        let join = tokio::spawn(async move {
            loop {
                let envelope = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    msg = receiver.recv() => msg,
                };
                let Some(envelope) = envelope else {
                    break;
                };
                match handler.handle(envelope.clone()).await {
                    Ok(()) => {
                        debug!(queue = %queue_name_owned, "message acknowledged");
                    }
                    Err(err) => {
                        if is_dead_letter {
                            warn!(error = %err, "handler on dead-letter queue failed; not re-dead-lettered");
                        } else {
                            warn!(queue = %queue_name_owned, error = %err, "handler failed");
                            let _ = dead_letter_sink.sender.send(envelope);
                        }
                    }
                }
            }
        });

        self.tokens.lock().await.push(cancel.clone());

        Ok(ConsumerHandle {
            queue_name: queue_name.to_string(),
            cancel,
            join,
        })
    }

    async fn stop_all(&self) {
        let tokens = self.tokens.lock().await;
        for token in tokens.iter() {
            token.cancel();
        }
    }
}
