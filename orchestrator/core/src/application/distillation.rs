// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Experience distillation.
//!
//! Given a group of scored attempts whose rewards disagree, the distiller
//! model proposes edits to one experience library. The reply is validated
//! as a whole: one bad operation discards the list and nothing is staged.
//! Accepted operations are staged into [`PendingChanges`] and only reach the
//! libraries when the training step commits.

use praxis_cortex::application::{ExperienceService, PendingChanges};
use praxis_cortex::{cap_words, ExperienceOperation, ExperienceOwner, MAX_EXPERIENCE_WORDS};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::generator::prompt_fingerprint;
use crate::domain::config::DistillationConfig;
use crate::domain::llm::{GenerationOptions, LLMError, LLMProvider};
use crate::domain::plan::PlanError;
use crate::infrastructure::plan_parser::parse_json_value;
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptKind, PromptTemplateEngine};

#[derive(Debug, Clone, thiserror::Error)]
pub enum DistillationError {
    #[error("distiller model failed: {0}")]
    Model(#[from] LLMError),

    #[error("unparseable operation list: {0}")]
    Parse(#[from] PlanError),

    #[error("operation {index} is invalid: {reason}")]
    InvalidOperation { index: usize, reason: String },

    #[error("failed to render distillation prompt: {0}")]
    Prompt(String),
}

#[derive(Debug, Clone)]
pub struct DistillationSettings {
    pub max_operations: usize,
    pub temperature: f32,
}

impl From<&DistillationConfig> for DistillationSettings {
    fn from(config: &DistillationConfig) -> Self {
        Self {
            max_operations: config.max_operations,
            temperature: config.temperature,
        }
    }
}

/// One scored attempt shown to the distiller
#[derive(Debug, Clone)]
pub struct Attempt {
    pub label: String,
    pub answer: Option<String>,
    pub reward: f64,
    /// Plan text the attempt was built from
    pub plan: String,
}

/// Operations accepted from one distiller reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Distillation {
    pub operations: Vec<ExperienceOperation>,
    /// Additions the distiller marked as useful to every agent
    pub shared: Vec<ExperienceOperation>,
}

impl Distillation {
    pub fn len(&self) -> usize {
        self.operations.len() + self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue the operations as one batch per target library
    pub fn stage(self, owner: ExperienceOwner, pending: &mut PendingChanges, source: &str) {
        if !self.operations.is_empty() {
            pending.push_batch(owner, self.operations, source);
        }
        if !self.shared.is_empty() {
            pending.push_batch(ExperienceOwner::Shared, self.shared, source);
        }
    }
}

/// Validate a distiller reply. Accepts `{"operations": [...]}` or a bare list.
pub fn parse_operations(
    text: &str,
    owner: ExperienceOwner,
    max_operations: usize,
) -> Result<Distillation, DistillationError> {
    let value = parse_json_value(text)?;
    let list = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("operations") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(PlanError::Malformed("'operations' is not a list".to_string()).into()),
            None => return Err(PlanError::Malformed("missing 'operations'".to_string()).into()),
        },
        _ => return Err(PlanError::Malformed("expected an object or a list".to_string()).into()),
    };

    let mut distillation = Distillation::default();
    for (index, item) in list.into_iter().enumerate() {
        let Value::Object(mut map) = item else {
            return Err(DistillationError::InvalidOperation {
                index,
                reason: "not an object".to_string(),
            });
        };

        let shared = matches!(
            map.remove("scope").as_ref().and_then(|s| s.as_str()).map(str::to_ascii_lowercase).as_deref(),
            Some("shared")
        );
        if let Some(Value::String(action)) = map.get_mut("action") {
            *action = action.trim().to_ascii_lowercase();
        }

        let operation: ExperienceOperation =
            serde_json::from_value(Value::Object(map)).map_err(|e| DistillationError::InvalidOperation {
                index,
                reason: e.to_string(),
            })?;
        let operation = cap_content(operation).ok_or_else(|| DistillationError::InvalidOperation {
            index,
            reason: "content is empty".to_string(),
        })?;

        if shared {
            let allowed = matches!(owner, ExperienceOwner::Generator(_)) && matches!(operation, ExperienceOperation::Add { .. });
            if !allowed {
                return Err(DistillationError::InvalidOperation {
                    index,
                    reason: format!("shared scope is only valid for additions by generators, got '{}'", operation.action()),
                });
            }
            distillation.shared.push(operation);
        } else {
            distillation.operations.push(operation);
        }
    }

    if distillation.len() > max_operations {
        warn!(
            owner = %owner,
            proposed = distillation.len(),
            max_operations,
            "Distiller proposed too many operations, keeping the first ones"
        );
        let mut remaining = max_operations;
        distillation.operations.truncate(remaining);
        remaining -= distillation.operations.len();
        distillation.shared.truncate(remaining);
    }
    Ok(distillation)
}

/// Collapse and cap add/modify content; `None` when nothing is left
fn cap_content(operation: ExperienceOperation) -> Option<ExperienceOperation> {
    Some(match operation {
        ExperienceOperation::Add { content, category } => {
            let content = cap_words(&content, MAX_EXPERIENCE_WORDS);
            if content.is_empty() {
                return None;
            }
            ExperienceOperation::Add { content, category }
        }
        ExperienceOperation::Modify { id, content, category } => {
            let content = cap_words(&content, MAX_EXPERIENCE_WORDS);
            if content.is_empty() {
                return None;
            }
            ExperienceOperation::Modify { id, content, category }
        }
        other => other,
    })
}

pub struct ExperienceDistiller {
    llm: Arc<dyn LLMProvider>,
    templates: Arc<PromptTemplateEngine>,
    experience: Arc<dyn ExperienceService>,
    settings: DistillationSettings,
}

impl ExperienceDistiller {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        templates: Arc<PromptTemplateEngine>,
        experience: Arc<dyn ExperienceService>,
        settings: DistillationSettings,
    ) -> Self {
        Self {
            llm,
            templates,
            experience,
            settings,
        }
    }

    /// Ask for edits to `owner`'s library from a group of scored attempts
    pub async fn distill(
        &self,
        owner: ExperienceOwner,
        problem: &str,
        ground_truth: &str,
        attempts: &[Attempt],
    ) -> Result<Distillation, DistillationError> {
        let library = self.experience.snapshot(owner);
        let current = if library.is_empty() {
            String::new()
        } else {
            library.render_prior(library.len())
        };

        let rendered_attempts = attempts
            .iter()
            .map(|a| {
                format!(
                    "{} (reward {}): answer {}\n{}",
                    a.label,
                    a.reward,
                    a.answer.as_deref().unwrap_or("(none)"),
                    a.plan
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let context = PromptContext::new()
            .problem(problem)
            .experience(current)
            .candidates(rendered_attempts)
            .extra("owner", owner.key())
            .extra("ground_truth", ground_truth)
            .extra("max_operations", self.settings.max_operations)
            .extra("max_words", MAX_EXPERIENCE_WORDS);
        let prompt = self
            .templates
            .render(PromptKind::Distillation, &context)
            .map_err(|e| DistillationError::Prompt(format!("{:#}", e)))?;
        debug!(owner = %owner, fingerprint = %prompt_fingerprint(&prompt), "Distillation prompt:\n{}", prompt);

        let options = GenerationOptions::with_temperature(self.settings.temperature).json_output();
        let result = match self.llm.generate(&prompt, &options).await {
            Ok(response) => parse_operations(&response.text, owner, self.settings.max_operations),
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(distillation) => {
                metrics::counter!("praxis_distillations_total", "outcome" => "accepted").increment(1);
                info!(owner = %owner, operations = distillation.len(), "Distiller proposed library edits");
            }
            Err(e) => {
                metrics::counter!("praxis_distillations_total", "outcome" => "rejected").increment(1);
                metrics::counter!("praxis_distillation_rejected_total").increment(1);
                warn!(owner = %owner, "Discarding distiller output: {}", e);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_cortex::ExperienceId;

    #[test]
    fn test_parses_wrapped_list_with_scope() {
        let text = r#"```json
{"operations": [
  {"action": "ADD", "content": "Write every given before choosing a law", "category": "setup"},
  {"action": "modify", "id": "2", "content": "Check units at the end"},
  {"action": "delete", "id": 4},
  {"action": "keep"},
  {"action": "add", "content": "Name quantities in snake_case", "scope": "shared"}
]}
```"#;
        let distillation = parse_operations(text, ExperienceOwner::Generator(1), 8).unwrap();
        assert_eq!(distillation.operations.len(), 4);
        assert_eq!(distillation.shared.len(), 1);
        assert_eq!(distillation.operations[2], ExperienceOperation::Delete { id: ExperienceId(4) });
        assert_eq!(distillation.operations[3], ExperienceOperation::Keep { id: None });

        let mut pending = PendingChanges::default();
        distillation.stage(ExperienceOwner::Generator(1), &mut pending, "test");
        assert_eq!(pending.batches.len(), 2);
        assert_eq!(pending.batches[1].owner, ExperienceOwner::Shared);
    }

    #[test]
    fn test_content_is_capped() {
        let long = vec!["word"; 50].join(" ");
        let text = format!(r#"[{{"action": "add", "content": "{}"}}]"#, long);
        let distillation = parse_operations(&text, ExperienceOwner::Critic, 4).unwrap();
        let content = distillation.operations[0].content().unwrap();
        assert_eq!(content.split_whitespace().count(), MAX_EXPERIENCE_WORDS);
    }

    #[test]
    fn test_malformed_lists_are_rejected_whole() {
        let owner = ExperienceOwner::Generator(2);
        assert!(matches!(parse_operations("nothing to add", owner, 4), Err(DistillationError::Parse(_))));
        assert!(matches!(
            parse_operations(r#"{"operations": [{"action": "add", "content": "ok"}, {"action": "rename", "id": 1}]}"#, owner, 4),
            Err(DistillationError::InvalidOperation { index: 1, .. })
        ));
        assert!(matches!(
            parse_operations(r#"[{"action": "modify", "content": "no id"}]"#, owner, 4),
            Err(DistillationError::InvalidOperation { index: 0, .. })
        ));
        assert!(matches!(
            parse_operations(r#"[{"action": "add", "content": "   "}]"#, owner, 4),
            Err(DistillationError::InvalidOperation { .. })
        ));
        // shared scope cannot edit existing entries, and critics cannot use it
        assert!(parse_operations(r#"[{"action": "delete", "id": 1, "scope": "shared"}]"#, owner, 4).is_err());
        assert!(parse_operations(r#"[{"action": "add", "content": "x", "scope": "shared"}]"#, ExperienceOwner::Critic, 4).is_err());
    }

    #[test]
    fn test_operation_count_is_bounded() {
        let text = r#"{"operations": [
            {"action": "add", "content": "a"}, {"action": "add", "content": "b"},
            {"action": "add", "content": "c"}, {"action": "add", "content": "d", "scope": "shared"}
        ]}"#;
        let distillation = parse_operations(text, ExperienceOwner::Generator(1), 2).unwrap();
        assert_eq!(distillation.len(), 2);
        assert!(distillation.shared.is_empty());

        let empty = parse_operations(r#"{"operations": []}"#, ExperienceOwner::Generator(1), 2).unwrap();
        assert!(empty.is_empty());
    }
}
