// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Template Engine
//!
//! This module renders every prompt Praxis sends to a model, using Handlebars
//! for placeholder substitution.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Transform named templates with placeholders into final prompts
//! - **Integration:** generator / critic / distiller / calculator / comparator → LLM input
//!
//! # Supported Placeholders
//!
//! - `{{problem}}` - Problem statement
//! - `{{knowledge}}` - Retrieved knowledge rules, one bullet per rule
//! - `{{experience}}` - Rendered experience prior (bullets with ids)
//! - `{{candidates}}` - Candidate plans or attempts under review
//! - anything else through [`PromptContext::extra`]
//!
//! # Usage
//!
//! ```ignore
//! let engine = PromptTemplateEngine::new()?;
//! let prompt = engine.render(
//!     PromptKind::Generation,
//!     &PromptContext::new().problem(text).knowledge(rules),
//! )?;
//! ```

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Templates
// ============================================================================

const GENERATION_TEMPLATE: &str = r#"You are generator agent {{generator}}. Build a causal plan (a scaffold) that solves the problem below. Do not compute the final number yourself; describe how to compute it.

Problem:
{{problem}}

Relevant knowledge:
{{knowledge}}
{{#if experience}}

Lessons from earlier attempts:
{{experience}}
{{/if}}

Return only a JSON object with this shape:
{
  "target_variable": "<snake_case name of the quantity asked for>",
  "knowns": {"<variable>": <number, or an exact fraction as a quoted string such as "1/3", or null when not given>},
  "causal_graph": [
    {"cause": ["<variable>", "..."], "effect": "<variable>", "rule": "<law or relation used>"}
  ],
  "computation_plan": [
    {"id": 1, "target": "<variable>", "inputs": ["<known or earlier target>"], "description": "<what the step does>", "expression": "<arithmetic over the inputs>"}
  ]
}

Use snake_case variable names. Values implied by the wording ("starts at rest") are knowns too. Every step may only read knowns or targets of earlier steps, and the last step must produce the target variable."#;

const FUSION_TEMPLATE: &str = r#"You are the critic. Several candidate causal plans were proposed for the problem below. Fuse them into one plan.

Problem:
{{problem}}

Relevant knowledge:
{{knowledge}}
{{#if experience}}

Fusion lessons:
{{experience}}
{{/if}}

Candidates ({{candidate_count}}):
{{candidates}}

Work through these steps:
1. Discard candidates or edges that contradict the problem statement.
2. Compare the causal graphs and keep the best supported edges; drop any edge that would create a cycle.
3. Use one consistent snake_case name for each quantity.
4. Order the computation plan so each step reads only knowns or earlier steps and the last step produces the target.

Return only a JSON object:
{"rationale": "<two or three sentences on what you kept and dropped>", "plan": <the fused plan, same shape as the candidates>}"#;

const DISTILLATION_TEMPLATE: &str = r#"You maintain the experience library of the {{owner}} agent. Experiences are short, reusable lessons injected into future prompts.

Problem:
{{problem}}

Correct answer: {{ground_truth}}

Attempts and their rewards (1 = correct, 0 = wrong):
{{candidates}}

Current library:
{{#if experience}}{{experience}}{{else}}(empty){{/if}}

Compare the successful and failed attempts and decide how the library should change. Return only a JSON object:
{"operations": [
  {"action": "add", "content": "<lesson>", "category": "<topic>"},
  {"action": "modify", "id": <id>, "content": "<rewritten lesson>"},
  {"action": "delete", "id": <id>},
  {"action": "keep", "id": <id>}
]}

Rules: at most {{max_operations}} operations; each content at most {{max_words}} words; lessons must be general, never tied to this problem's numbers. Add "scope": "shared" to an operation whose lesson helps every agent. Return {"operations": []} when nothing should change."#;

const ANSWER_TEMPLATE: &str = r#"Execute the causal plan below for the problem and report the value of `{{target}}`.

Problem:
{{problem}}

Plan:
{{plan}}

Return only a JSON object: {"answer": "<final value, with unit if the problem uses one>"}"#;

const COMPARISON_TEMPLATE: &str = r#"Decide whether two answers to the same question are equivalent. Treat different units, notations and phrasings of the same quantity as equivalent.

Question:
{{problem}}

Expected answer: {{expected}}
Given answer: {{actual}}

Return only a JSON object: {"equivalent": true or false, "confidence": <0.0 to 1.0>}"#;

/// The prompts Praxis knows how to render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Generation,
    Fusion,
    Distillation,
    Answer,
    Comparison,
}

impl PromptKind {
    pub fn all() -> [PromptKind; 5] {
        [
            PromptKind::Generation,
            PromptKind::Fusion,
            PromptKind::Distillation,
            PromptKind::Answer,
            PromptKind::Comparison,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PromptKind::Generation => "generation",
            PromptKind::Fusion => "fusion",
            PromptKind::Distillation => "distillation",
            PromptKind::Answer => "answer",
            PromptKind::Comparison => "comparison",
        }
    }

    fn default_template(&self) -> &'static str {
        match self {
            PromptKind::Generation => GENERATION_TEMPLATE,
            PromptKind::Fusion => FUSION_TEMPLATE,
            PromptKind::Distillation => DISTILLATION_TEMPLATE,
            PromptKind::Answer => ANSWER_TEMPLATE,
            PromptKind::Comparison => COMPARISON_TEMPLATE,
        }
    }
}

// ============================================================================
// Template Context
// ============================================================================

/// Context data for prompt template rendering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge: Option<String>,

    /// Rendered experience prior; omitted sections are skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<String>,

    /// Additional custom fields
    #[serde(flatten)]
    pub extras: HashMap<String, serde_json::Value>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn problem(mut self, problem: impl Into<String>) -> Self {
        self.problem = Some(problem.into());
        self
    }

    pub fn knowledge(mut self, knowledge: impl Into<String>) -> Self {
        self.knowledge = Some(knowledge.into());
        self
    }

    /// Empty priors are dropped so the template's `{{#if}}` hides the section
    pub fn experience(mut self, experience: impl Into<String>) -> Self {
        let experience = experience.into();
        self.experience = (!experience.trim().is_empty()).then_some(experience);
        self
    }

    pub fn candidates(mut self, candidates: impl Into<String>) -> Self {
        self.candidates = Some(candidates.into());
        self
    }

    /// Add extra field
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Template Engine
// ============================================================================

pub struct PromptTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl PromptTemplateEngine {
    /// Engine with the built-in templates registered
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();

        handlebars.set_strict_mode(false); // Don't fail on missing variables
        // Prompts are plain text; HTML escaping would mangle quotes in JSON
        handlebars.register_escape_fn(handlebars::no_escape);

        for kind in PromptKind::all() {
            handlebars
                .register_template_string(kind.name(), kind.default_template())
                .with_context(|| format!("Invalid built-in template '{}'", kind.name()))?;
        }

        Ok(Self { handlebars })
    }

    /// Replace a built-in template, e.g. from a prompt override file
    pub fn override_template(&mut self, kind: PromptKind, template: &str) -> Result<()> {
        self.validate_template(template)?;
        self.handlebars
            .register_template_string(kind.name(), template)
            .with_context(|| format!("Failed to register template '{}'", kind.name()))
    }

    /// Render a named template with context
    pub fn render(&self, kind: PromptKind, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render(kind.name(), context)
            .with_context(|| format!("Failed to render '{}' prompt", kind.name()))
    }

    /// Validate template syntax without rendering
    pub fn validate_template(&self, template: &str) -> Result<()> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .context("Invalid Handlebars template syntax")
    }
}

// ============================================================================
// Tests
// ============================================================================
