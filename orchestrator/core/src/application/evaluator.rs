// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reward evaluation.
//!
//! A plan's answer comes from the [`AnswerComputer`] collaborator and is
//! compared to ground truth in three tiers:
//!
//! 1. numeric comparison with unit and notation handling, when both sides
//!    read as numbers;
//! 2. the comparator model, for non-numeric answers, trusted only above a
//!    confidence floor;
//! 3. normalised string equality, whenever the model is off, fails or hedges.
//!
//! Reward is binary: 1.0 on a match and 0.0 otherwise, including when the
//! answer could not be computed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::answer::{AnswerComputer, AnswerError};
use crate::domain::comparison::{exact_equivalent, numeric_equivalent};
use crate::domain::config::TrainingConfig;
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::plan::CausalPlan;
use crate::infrastructure::plan_parser::parse_typed;
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptKind, PromptTemplateEngine};

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct EvaluationSettings {
    pub tolerance: f64,
    pub semantic_comparison: bool,
    pub min_confidence: f64,
}

impl From<&TrainingConfig> for EvaluationSettings {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            tolerance: config.answer_tolerance,
            semantic_comparison: config.semantic_comparison,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMethod {
    Numeric,
    Semantic,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparison {
    pub matched: bool,
    pub method: ComparisonMethod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub answer: Option<String>,
    pub reward: f64,
    pub comparison: Option<Comparison>,
}

#[derive(Debug, Deserialize)]
struct ComparatorVerdict {
    equivalent: bool,
    #[serde(default)]
    confidence: f64,
}

pub struct RewardEvaluator {
    computer: Arc<dyn AnswerComputer>,
    comparator: Arc<dyn LLMProvider>,
    templates: Arc<PromptTemplateEngine>,
    settings: EvaluationSettings,
}

impl RewardEvaluator {
    pub fn new(
        computer: Arc<dyn AnswerComputer>,
        comparator: Arc<dyn LLMProvider>,
        templates: Arc<PromptTemplateEngine>,
        settings: EvaluationSettings,
    ) -> Self {
        Self {
            computer,
            comparator,
            templates,
            settings,
        }
    }

    /// Execute a plan without scoring it
    pub async fn answer(&self, plan: &CausalPlan, problem: &str) -> Result<String, AnswerError> {
        self.computer.compute(plan, problem).await
    }

    /// Execute `plan` and score its answer against `ground_truth`
    pub async fn evaluate(&self, plan: &CausalPlan, problem: &str, ground_truth: &str) -> Evaluation {
        let answer = match self.computer.compute(plan, problem).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(target_variable = plan.target_variable(), "Answer computation failed: {}", e);
                metrics::counter!("praxis_answer_failures_total").increment(1);
                metrics::histogram!("praxis_reward").record(0.0);
                return Evaluation {
                    answer: None,
                    reward: 0.0,
                    comparison: None,
                };
            }
        };

        let comparison = self.compare(problem, ground_truth, &answer).await;
        let reward = if comparison.matched { 1.0 } else { 0.0 };
        debug!(
            expected = ground_truth,
            actual = %answer,
            method = ?comparison.method,
            reward,
            "Scored answer"
        );
        metrics::histogram!("praxis_reward").record(reward);

        Evaluation {
            answer: Some(answer),
            reward,
            comparison: Some(comparison),
        }
    }

    pub async fn compare(&self, problem: &str, expected: &str, actual: &str) -> Comparison {
        if let Some(matched) = numeric_equivalent(expected, actual, self.settings.tolerance) {
            return Comparison {
                matched,
                method: ComparisonMethod::Numeric,
            };
        }

        if self.settings.semantic_comparison {
            match self.semantic(problem, expected, actual).await {
                Ok(verdict) if verdict.confidence >= self.settings.min_confidence => {
                    return Comparison {
                        matched: verdict.equivalent,
                        method: ComparisonMethod::Semantic,
                    };
                }
                Ok(verdict) => {
                    debug!(confidence = verdict.confidence, "Comparator unsure, using exact match");
                }
                Err(e) => {
                    warn!("Comparator unavailable, using exact match: {}", e);
                }
            }
        }

        Comparison {
            matched: exact_equivalent(expected, actual),
            method: ComparisonMethod::Exact,
        }
    }

    async fn semantic(&self, problem: &str, expected: &str, actual: &str) -> anyhow::Result<ComparatorVerdict> {
        let context = PromptContext::new()
            .problem(problem)
            .extra("expected", expected)
            .extra("actual", actual);
        let prompt = self.templates.render(PromptKind::Comparison, &context)?;
        let response = self
            .comparator
            .generate(&prompt, &GenerationOptions::with_temperature(0.0).json_output())
            .await?;
        Ok(parse_typed(&response.text)?)
    }
}
