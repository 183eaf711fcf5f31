// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Collaborator ports: turning a plan into an answer, and supplying problems.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::expression::ExpressionError;
use super::llm::LLMError;
use super::plan::CausalPlan;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AnswerError {
    #[error("plan could not be evaluated: {0}")]
    Computation(String),

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error("answer model failed: {0}")]
    Model(#[from] LLMError),

    #[error("answer model returned no answer")]
    NoAnswer,
}

/// Executes a plan and returns the final answer as text
#[async_trait]
pub trait AnswerComputer: Send + Sync {
    async fn compute(&self, plan: &CausalPlan, problem: &str) -> Result<String, AnswerError>;
}

/// One training or evaluation item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "question", alias = "problem")]
    pub text: String,
    #[serde(default, alias = "answer", deserialize_with = "string_or_number")]
    pub ground_truth: Option<String>,
}

/// Ground truth may be written as `25`, `25.0` or `"25 m/s"`.
fn string_or_number<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

impl Problem {
    pub fn new(id: impl Into<String>, text: impl Into<String>, ground_truth: Option<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ground_truth,
        }
    }
}

/// Supplies problems in a stable order
#[async_trait]
pub trait DatasetLoader: Send + Sync {
    async fn load(&self) -> anyhow::Result<Vec<Problem>>;
}

/// Dataset held in memory; used by `solve` and by tests
pub struct StaticDataset {
    problems: Vec<Problem>,
}

impl StaticDataset {
    pub fn new(problems: Vec<Problem>) -> Self {
        Self { problems }
    }
}

#[async_trait]
impl DatasetLoader for StaticDataset {
    async fn load(&self) -> anyhow::Result<Vec<Problem>> {
        Ok(self.problems.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_accepts_numeric_ground_truth() {
        let problem: Problem = serde_json::from_str(r#"{"question": "2+2?", "answer": 4}"#).unwrap();
        assert_eq!(problem.text, "2+2?");
        assert_eq!(problem.ground_truth.as_deref(), Some("4"));
        assert!(problem.id.is_empty());

        let unlabeled: Problem = serde_json::from_str(r#"{"id": "p1", "text": "x"}"#).unwrap();
        assert_eq!(unlabeled.ground_truth, None);
    }
}
