//! Execute an ordered list of skills, threading each result into the next
//! (C9). Executors are opaque: the runner never inspects what they return,
//! it only threads the value forward under the skill's id.

use std::sync::Arc;

use async_trait::async_trait;
use cos_core::{MessageEnvelope, SkillDefinition};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::warn;

/// Mirrors the teacher's `Agent`/`LLMProvider` async traits: one opaque
/// `execute` call, no assumption about what runs underneath (an LLM call,
/// a subprocess, a pure function).
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute(&self, definition: &SkillDefinition, params: &Map<String, Value>) -> anyhow::Result<Value>;
}

#[derive(Default)]
pub struct SkillRegistry {
    skills: DashMap<String, SkillDefinition>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, skill: SkillDefinition) {
        self.skills.insert(skill.skill_id.clone(), skill);
    }

    pub fn get(&self, skill_id: &str) -> Option<SkillDefinition> {
        self.skills.get(skill_id).map(|s| s.clone())
    }
}

#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<String, Arc<dyn SkillExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, executor_type: impl Into<String>, executor: Arc<dyn SkillExecutor>) {
        self.executors.insert(executor_type.into(), executor);
    }

    pub fn get(&self, executor_type: &str) -> Option<Arc<dyn SkillExecutor>> {
        self.executors.get(executor_type).map(|e| e.clone())
    }
}

/// The runner's output: the envelope it was given, every skill's result in
/// pipeline order, and whatever caller-supplied parameters were merged in.
pub struct PipelineContext {
    pub envelope: MessageEnvelope,
    pub results: Vec<(String, Value)>,
    pub parameters: Map<String, Value>,
}

impl PipelineContext {
    pub fn result_for(&self, skill_id: &str) -> Option<&Value> {
        self.results.iter().find(|(id, _)| id == skill_id).map(|(_, v)| v)
    }

    /// The result of the last skill that ran, or `None` if the pipeline was
    /// empty or every skill id was unknown.
    pub fn final_result(&self) -> Option<&Value> {
        self.results.last().map(|(_, v)| v)
    }
}

pub struct SkillPipelineRunner {
    skills: Arc<SkillRegistry>,
    executors: Arc<ExecutorRegistry>,
}

impl SkillPipelineRunner {
    pub fn new(skills: Arc<SkillRegistry>, executors: Arc<ExecutorRegistry>) -> Self {
        Self { skills, executors }
    }

    pub async fn run(
        &self,
        skill_ids: &[String],
        envelope: MessageEnvelope,
        parameters: Map<String, Value>,
    ) -> PipelineContext {
        let mut context = PipelineContext {
            envelope,
            results: Vec::new(),
            parameters,
        };

        for skill_id in skill_ids {
            let Some(definition) = self.skills.get(skill_id) else {
                warn!(skill_id, "unknown skill id; skipping");
                continue;
            };
            let Some(executor) = self.executors.get(&definition.executor_type) else {
                warn!(
                    skill_id,
                    executor_type = %definition.executor_type,
                    "unknown executor type; skipping"
                );
                continue;
            };

            let mut params = context.parameters.clone();
            params.insert(
                "envelope".to_string(),
                serde_json::to_value(&context.envelope).unwrap_or(Value::Null),
            );
            let results_so_far: Map<String, Value> = context.results.iter().cloned().collect();
            params.insert("results".to_string(), Value::Object(results_so_far));

            match executor.execute(&definition, &params).await {
                Ok(value) => context.results.push((skill_id.clone(), value)),
                Err(err) => {
                    warn!(skill_id, error = %err, "skill execution failed; skipping");
                }
            }
        }

        context
    }
}
