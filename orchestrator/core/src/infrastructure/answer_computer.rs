// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Answer Computer
//!
//! Model-backed implementation of the [`AnswerComputer`] port.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Execute a fused plan and return its final value as text
//!
//! When every step carries a formula the plan is evaluated exactly, in step
//! order, over the plan's knowns. Otherwise, or when a formula does not
//! evaluate, the calculator model executes the plan from the Answer prompt.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::answer::{AnswerComputer, AnswerError};
use crate::domain::expression;
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::plan::CausalPlan;
use crate::domain::rational::Rational;
use crate::infrastructure::plan_parser::parse_typed;
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptKind, PromptTemplateEngine};

/// Evaluate a plan whose steps all carry formulas
pub fn evaluate_formulas(plan: &CausalPlan) -> Result<Rational, AnswerError> {
    let mut env: BTreeMap<String, Rational> = plan.known_values();
    if let Some(value) = env.get(plan.target_variable()) {
        return Ok(*value);
    }
    for step in plan.computation_plan() {
        let formula = step
            .expression
            .as_deref()
            .ok_or_else(|| AnswerError::Computation(format!("step {} has no formula", step.id)))?;
        let value = expression::evaluate(formula, &env)?;
        env.insert(step.target.clone(), value);
    }
    env.get(plan.target_variable())
        .copied()
        .ok_or_else(|| AnswerError::Computation(format!("'{}' was never computed", plan.target_variable())))
}

#[derive(Debug, Deserialize)]
struct AnswerResponse {
    answer: serde_json::Value,
}

pub struct ModelAnswerComputer {
    llm: Arc<dyn LLMProvider>,
    templates: Arc<PromptTemplateEngine>,
}

impl ModelAnswerComputer {
    pub fn new(llm: Arc<dyn LLMProvider>, templates: Arc<PromptTemplateEngine>) -> Self {
        Self { llm, templates }
    }

    async fn ask_model(&self, plan: &CausalPlan, problem: &str) -> Result<String, AnswerError> {
        let context = PromptContext::new()
            .problem(problem)
            .extra("target", plan.target_variable())
            .extra("plan", plan.to_json_pretty());
        let prompt = self
            .templates
            .render(PromptKind::Answer, &context)
            .map_err(|e| AnswerError::Computation(format!("{:#}", e)))?;

        let response = self
            .llm
            .generate(&prompt, &GenerationOptions::with_temperature(0.0).json_output())
            .await?;
        let parsed: AnswerResponse = parse_typed(&response.text).map_err(|_| AnswerError::NoAnswer)?;
        let answer = match parsed.answer {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        if answer.is_empty() {
            return Err(AnswerError::NoAnswer);
        }
        Ok(answer)
    }
}

#[async_trait]
impl AnswerComputer for ModelAnswerComputer {
    async fn compute(&self, plan: &CausalPlan, problem: &str) -> Result<String, AnswerError> {
        match evaluate_formulas(plan) {
            Ok(value) => Ok(value.to_decimal_string()),
            Err(e) => {
                debug!(target_variable = plan.target_variable(), "Formula evaluation unavailable ({}), asking calculator model", e);
                self.ask_model(plan, problem).await
            }
        }
    }
}

/// Formula-only computer; fails instead of consulting a model
pub struct FormulaAnswerComputer;

#[async_trait]
impl AnswerComputer for FormulaAnswerComputer {
    async fn compute(&self, plan: &CausalPlan, _problem: &str) -> Result<String, AnswerError> {
        evaluate_formulas(plan).map(|v| v.to_decimal_string())
    }
}
