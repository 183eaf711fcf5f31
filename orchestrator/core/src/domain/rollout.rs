// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Rollouts and the groups they form.
//!
//! A [`RolloutGroup`] holds whatever one generator produced for one problem.
//! Failed rollouts are recorded next to the successful ones rather than
//! silently vanishing, so reports can tell a parse failure from a timeout.

use praxis_cortex::{ExperienceId, ExperienceOwner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::plan::CausalPlan;

/// One candidate plan, tagged with where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rollout {
    pub generator: u32,
    pub index: u32,
    pub seed: u64,
    pub plan: CausalPlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RolloutFailure {
    /// The model answered but the text was not a valid plan
    Parse(String),
    /// The model call failed after the provider exhausted its retries
    Model(String),
    /// The rollout outlived `rollout_timeout` and was abandoned
    Timeout(String),
    /// The generation prompt could not be rendered, so no call was made
    Prompt(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRollout {
    pub generator: u32,
    pub index: u32,
    pub failure: RolloutFailure,
}

/// Experiences rendered into a generator's prompt, per library
pub type ShownExperiences = Vec<(ExperienceOwner, Vec<ExperienceId>)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutGroup {
    pub generator: u32,
    /// Ordered by rollout index
    pub rollouts: Vec<Rollout>,
    pub failures: Vec<FailedRollout>,
    pub experiences_shown: ShownExperiences,
}

impl RolloutGroup {
    pub fn len(&self) -> usize {
        self.rollouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rollouts.is_empty()
    }

    pub fn plans(&self) -> impl Iterator<Item = &CausalPlan> {
        self.rollouts.iter().map(|r| &r.plan)
    }

    pub fn indices(&self) -> Vec<u32> {
        self.rollouts.iter().map(|r| r.index).collect()
    }

    /// Failures where the provider gave up after its retries
    pub fn model_failures(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f.failure, RolloutFailure::Model(_)))
            .count()
    }

    pub fn timeouts(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| matches!(f.failure, RolloutFailure::Timeout(_)))
            .count()
    }

    /// Most common target variable; ties go to the lowest rollout index.
    pub fn majority_target(&self) -> Option<String> {
        let mut counts: BTreeMap<&str, (usize, u32)> = BTreeMap::new();
        for rollout in &self.rollouts {
            let entry = counts
                .entry(rollout.plan.target_variable())
                .or_insert((0, rollout.index));
            entry.0 += 1;
        }
        counts
            .into_iter()
            .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
            .map(|(target, _)| target.to_string())
    }
}

/// A rollout's own answer and reward, used for per-generator variance gating
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRollout {
    pub generator: u32,
    pub index: u32,
    pub answer: Option<String>,
    pub reward: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// The critic model's plan passed validation
    Model,
    /// The critic failed; candidates were merged in code
    Deterministic,
    /// No candidate reached the target
    LowConfidence,
}

impl FusionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionMethod::Model => "model",
            FusionMethod::Deterministic => "deterministic",
            FusionMethod::LowConfidence => "low_confidence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub generator: u32,
    pub source_rollouts: Vec<u32>,
    pub plan: CausalPlan,
    pub method: FusionMethod,
    pub rationale: String,
    /// Critic-library experiences shown in the fusion prompt
    #[serde(default)]
    pub critic_experiences: Vec<ExperienceId>,
    pub answer: Option<String>,
    /// `None` when solving without ground truth
    pub reward: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(target: &str) -> CausalPlan {
        serde_json::from_str(&format!(
            r#"{{"target_variable": "{}", "knowns": {{"x": 1}}, "causal_graph": [{{"cause": ["x"], "effect": "{}"}}]}}"#,
            target, target
        ))
        .unwrap()
    }

    fn rollout(index: u32, target: &str) -> Rollout {
        Rollout {
            generator: 1,
            index,
            seed: index as u64,
            plan: plan(target),
        }
    }

    #[test]
    fn test_majority_target_prefers_count_then_earliest() {
        let group = RolloutGroup {
            generator: 1,
            rollouts: vec![rollout(0, "speed"), rollout(1, "velocity"), rollout(2, "velocity")],
            failures: vec![],
            experiences_shown: vec![],
        };
        assert_eq!(group.majority_target().as_deref(), Some("velocity"));

        let tie = RolloutGroup {
            generator: 1,
            rollouts: vec![rollout(0, "speed"), rollout(1, "velocity")],
            failures: vec![],
            experiences_shown: vec![],
        };
        assert_eq!(tie.majority_target().as_deref(), Some("speed"));
    }

    #[test]
    fn test_model_failures_counted_separately() {
        let group = RolloutGroup {
            generator: 2,
            rollouts: vec![],
            failures: vec![
                FailedRollout {
                    generator: 2,
                    index: 0,
                    failure: RolloutFailure::Parse("bad json".into()),
                },
                FailedRollout {
                    generator: 2,
                    index: 1,
                    failure: RolloutFailure::Model("connection refused".into()),
                },
                FailedRollout {
                    generator: 2,
                    index: 2,
                    failure: RolloutFailure::Timeout("deadline of 50ms elapsed".into()),
                },
            ],
            experiences_shown: vec![],
        };
        assert!(group.is_empty());
        assert_eq!(group.model_failures(), 1);
        assert_eq!(group.timeouts(), 1);

        let json = serde_json::to_value(&group.failures[2].failure).unwrap();
        assert_eq!(json["kind"], "timeout");
    }
}
