//! Periodic overdue scan; alert or escalate (C13).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cos_core::Payload;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bus::MessageBus;
use crate::delegation_tracker::{DelegationTracker, RetryCounter};
use crate::runtime::AgentRuntime;

#[derive(Debug, Clone)]
pub struct SupervisionConfig {
    pub check_interval: Duration,
    pub max_retries: u32,
    pub alert_target: String,
    pub escalation_target: String,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            max_retries: 3,
            alert_target: "agent.founder".to_string(),
            escalation_target: "agent.founder".to_string(),
        }
    }
}

/// Runs `tick` on `config.check_interval` until `token` is cancelled.
/// Errors inside one tick are logged; the loop continues.
pub struct SupervisionService {
    config: SupervisionConfig,
    delegations: Arc<DelegationTracker>,
    retry_counter: Arc<RetryCounter>,
    bus: Arc<dyn MessageBus>,
    runtime: Option<Arc<AgentRuntime>>,
}

impl SupervisionService {
    pub fn new(
        config: SupervisionConfig,
        delegations: Arc<DelegationTracker>,
        retry_counter: Arc<RetryCounter>,
        bus: Arc<dyn MessageBus>,
        runtime: Option<Arc<AgentRuntime>>,
    ) -> Self {
        Self {
            config,
            delegations,
            retry_counter,
            bus,
            runtime,
        }
    }

    pub async fn run(&self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.check_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("supervision loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "supervision tick failed; continuing");
                    }
                }
            }
        }
    }

    async fn tick(&self) -> anyhow::Result<()> {
        for delegation in self.delegations.get_overdue() {
            let n = self.retry_counter.increment(delegation.reference_code);
            let is_agent_running = match &self.runtime {
                None => true,
                Some(runtime) => runtime.running_agent_ids().contains(&delegation.delegated_to),
            };

            if n > self.config.max_retries {
                let alert = Payload::EscalationAlert {
                    message_id: uuid::Uuid::new_v4(),
                    timestamp: Utc::now(),
                    correlation_id: None,
                    delegation_ref_code: delegation.reference_code,
                    delegated_to: delegation.delegated_to.clone(),
                    description: delegation.description.clone(),
                    retry_count: n,
                    reason: "Max retries exceeded".to_string(),
                };
                self.publish_alert(alert, &self.config.escalation_target).await?;
            } else {
                let alert = Payload::SupervisionAlert {
                    message_id: uuid::Uuid::new_v4(),
                    timestamp: Utc::now(),
                    correlation_id: None,
                    delegation_ref_code: delegation.reference_code,
                    delegated_to: delegation.delegated_to.clone(),
                    description: delegation.description.clone(),
                    retry_count: n,
                    due_at: delegation.due_at,
                    is_agent_running,
                };
                self.publish_alert(alert, &self.config.alert_target).await?;
            }
        }
        Ok(())
    }

    async fn publish_alert(&self, payload: Payload, target: &str) -> anyhow::Result<()> {
        use cos_core::{Context, MessageEnvelope, Priority};
        let reference_code = payload_reference_code(&payload);
        let envelope = MessageEnvelope {
            payload,
            reference_code,
            authority_claims: vec![],
            context: Context::default(),
            priority: Priority::High,
            sla: None,
        };
        self.bus.publish(envelope, target).await?;
        Ok(())
    }
}

fn payload_reference_code(payload: &Payload) -> cos_core::ReferenceCode {
    match payload {
        Payload::EscalationAlert { delegation_ref_code, .. } | Payload::SupervisionAlert { delegation_ref_code, .. } => {
            *delegation_ref_code
        }
        _ => unreachable!("supervision only ever builds alert payloads"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusHandler, InMemoryBus};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, NaiveDate};
    use cos_core::{DelegationRecord, MessageEnvelope, ReferenceCode};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn code(n: u16) -> ReferenceCode {
        ReferenceCode::from_parts(NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), n).unwrap()
    }

    struct Counter(Arc<AtomicU32>);

    #[async_trait]
    impl BusHandler for Counter {
        async fn handle(&self, _envelope: MessageEnvelope) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn escalates_after_max_retries_exceeded() {
        let bus = Arc::new(InMemoryBus::new());
        let alert_count = Arc::new(AtomicU32::new(0));
        let escalation_count = Arc::new(AtomicU32::new(0));
        bus.start_consuming("agent.founder", Arc::new(Counter(alert_count.clone())))
            .await
            .unwrap();

        let delegations = Arc::new(DelegationTracker::new());
        delegations.delegate(DelegationRecord::new(
            code(1),
            "cos",
            "email-agent",
            "d",
            Some(Utc::now() - ChronoDuration::hours(1)),
        ));
        let retry_counter = Arc::new(RetryCounter::new());
        let config = SupervisionConfig {
            check_interval: Duration::from_millis(1),
            max_retries: 3,
            alert_target: "agent.founder".to_string(),
            escalation_target: "agent.founder".to_string(),
        };
        let service = SupervisionService::new(config, delegations, retry_counter.clone(), bus, None);

        for _ in 0..4 {
            service.tick().await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(escalation_count.load(Ordering::SeqCst), 0);
        assert_eq!(alert_count.load(Ordering::SeqCst), 4);
        assert_eq!(retry_counter.get(code(1)), 4);
    }

    #[tokio::test]
    async fn cancellation_exits_loop_cleanly() {
        let bus = Arc::new(InMemoryBus::new());
        let delegations = Arc::new(DelegationTracker::new());
        let retry_counter = Arc::new(RetryCounter::new());
        let config = SupervisionConfig {
            check_interval: Duration::from_millis(5),
            ..SupervisionConfig::default()
        };
        let service = Arc::new(SupervisionService::new(config, delegations, retry_counter, bus, None));
        let token = CancellationToken::new();
        let inner = service.clone();
        let inner_token = token.clone();
        let handle = tokio::spawn(async move { inner.run(inner_token).await });
        token.cancel();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("supervision loop should exit promptly on cancellation")
            .unwrap();
    }
}
