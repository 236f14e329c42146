use serde::{Deserialize, Serialize};

/// A skill as consumed by the pipeline runner. The runner never parses
/// `content`; only the executor named by `executor_type` does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub skill_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub executor_type: String,
    pub content: Option<String>,
}

impl SkillDefinition {
    pub fn new(
        skill_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        executor_type: impl Into<String>,
        content: Option<String>,
    ) -> Self {
        Self {
            skill_id: skill_id.into(),
            name: name.into(),
            description: description.into(),
            category: category.into(),
            executor_type: executor_type.into(),
            content,
        }
    }
}
