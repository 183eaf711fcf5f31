// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Critic fusion: one refined plan per rollout group.
//!
//! The critic model is asked first, at temperature 0. Its answer goes through
//! the same parse boundary as a rollout, and the fused target must be one of
//! the candidates' targets. When the call fails or the output does not hold
//! up, [`merge_candidates`] performs the fusion in code:
//!
//! 1. the target is the candidates' majority target;
//! 2. knowns are unioned, a stated value beats an unresolved one;
//! 3. edges are ranked by how many candidates share them and the best edge
//!    per effect is kept unless it would close a cycle;
//! 4. the computation plan is derived topologically, reusing candidate
//!    formulas whose inputs match the chosen edge.
//!
//! If that still cannot reach the target, the result is a low-confidence
//! plan connecting the target directly to every known.

use chrono::Utc;
use praxis_cortex::application::ExperienceService;
use praxis_cortex::{ExperienceId, ExperienceOwner};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::generator::{prompt_fingerprint, render_prior};
use crate::domain::answer::Problem;
use crate::domain::config::TrainingConfig;
use crate::domain::events::TrainingEvent;
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::plan::{
    derivable, derive_steps, edge_keeps_acyclic, CausalEdge, CausalPlan, KnownValue, PlanError, PlanInput,
};
use crate::domain::rational::Rational;
use crate::domain::rollout::{FusedResult, FusionMethod, RolloutGroup};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::plan_parser::{parse_json_value, plan_from_value};
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptKind, PromptTemplateEngine};

const LOW_CONFIDENCE_RULE: &str = "direct relation from all knowns (low confidence)";

#[derive(Debug, Clone)]
pub struct FusionSettings {
    pub temperature: f32,
    pub max_prior_items: usize,
}

impl From<&TrainingConfig> for FusionSettings {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            temperature: config.critic_temperature,
            max_prior_items: config.max_prior_items,
        }
    }
}

/// A fused plan with how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub plan: CausalPlan,
    pub method: FusionMethod,
    pub rationale: String,
}

pub struct CriticFusion {
    llm: Arc<dyn LLMProvider>,
    templates: Arc<PromptTemplateEngine>,
    experience: Arc<dyn ExperienceService>,
    event_bus: Arc<EventBus>,
    settings: FusionSettings,
}

impl CriticFusion {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        templates: Arc<PromptTemplateEngine>,
        experience: Arc<dyn ExperienceService>,
        event_bus: Arc<EventBus>,
        settings: FusionSettings,
    ) -> Self {
        Self {
            llm,
            templates,
            experience,
            event_bus,
            settings,
        }
    }

    /// Fuse one generator's group. `None` when the group has no rollouts.
    pub async fn fuse(&self, problem: &Problem, knowledge: &str, group: &RolloutGroup) -> Option<FusedResult> {
        if group.is_empty() {
            return None;
        }

        let critic = self.experience.snapshot(ExperienceOwner::Critic);
        let (prior, shown) = render_prior(&[("Fusion lessons", &critic)], self.settings.max_prior_items);
        let critic_experiences: Vec<ExperienceId> = shown.into_iter().flat_map(|(_, ids)| ids).collect();

        let outcome = match self.model_fusion(problem, knowledge, group, prior).await {
            Ok((plan, rationale)) => MergeOutcome {
                plan,
                method: FusionMethod::Model,
                rationale,
            },
            Err(reason) => {
                warn!(
                    problem_id = %problem.id,
                    generator = group.generator,
                    "Critic fusion failed, merging deterministically: {}",
                    reason
                );
                let candidates: Vec<&CausalPlan> = group.plans().collect();
                let outcome = merge_candidates(&candidates)?;
                if outcome.method == FusionMethod::LowConfidence {
                    metrics::counter!("praxis_fusion_degraded_total").increment(1);
                    self.event_bus.publish_training_event(TrainingEvent::FusionDegraded {
                        problem_id: problem.id.clone(),
                        generator: group.generator,
                        reason: outcome.rationale.clone(),
                        degraded_at: Utc::now(),
                    });
                }
                outcome
            }
        };

        metrics::counter!("praxis_fusion_total", "method" => outcome.method.as_str()).increment(1);
        info!(
            problem_id = %problem.id,
            generator = group.generator,
            method = outcome.method.as_str(),
            candidates = group.len(),
            "Fused rollout group: {}",
            outcome.rationale
        );

        Some(FusedResult {
            generator: group.generator,
            source_rollouts: group.indices(),
            plan: outcome.plan,
            method: outcome.method,
            rationale: outcome.rationale,
            critic_experiences,
            answer: None,
            reward: None,
        })
    }

    async fn model_fusion(
        &self,
        problem: &Problem,
        knowledge: &str,
        group: &RolloutGroup,
        prior: String,
    ) -> Result<(CausalPlan, String), String> {
        let candidates = group
            .rollouts
            .iter()
            .enumerate()
            .map(|(i, r)| format!("Candidate {} (rollout {}):\n{}", i + 1, r.index, r.plan.to_json_pretty()))
            .collect::<Vec<_>>()
            .join("\n\n");

        let context = PromptContext::new()
            .problem(problem.text.as_str())
            .knowledge(knowledge)
            .experience(prior)
            .candidates(candidates)
            .extra("candidate_count", group.len());
        let prompt = self
            .templates
            .render(PromptKind::Fusion, &context)
            .map_err(|e| format!("{:#}", e))?;
        debug!(generator = group.generator, fingerprint = %prompt_fingerprint(&prompt), "Fusion prompt:\n{}", prompt);

        let options = GenerationOptions::with_temperature(self.settings.temperature).json_output();
        let response = self
            .llm
            .generate(&prompt, &options)
            .await
            .map_err(|e| e.to_string())?;

        let (plan, rationale) = parse_verdict(&response.text).map_err(|e| e.to_string())?;
        let targets: BTreeSet<&str> = group.plans().map(|p| p.target_variable()).collect();
        if !targets.contains(plan.target_variable()) {
            return Err(format!(
                "fused target '{}' matches no candidate",
                plan.target_variable()
            ));
        }
        Ok((plan, rationale))
    }
}

/// `{"rationale": "...", "plan": {...}}`, or a bare plan
fn parse_verdict(text: &str) -> Result<(CausalPlan, String), PlanError> {
    let mut value = parse_json_value(text)?;
    let rationale = value
        .get("rationale")
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    let plan_value = if value.get("plan").is_some_and(|p| p.is_object()) {
        value["plan"].take()
    } else {
        value
    };
    let plan = plan_from_value(plan_value)?;
    let rationale = if rationale.is_empty() {
        "critic gave no rationale".to_string()
    } else {
        rationale
    };
    Ok((plan, rationale))
}

/// Most frequent value; ties go to the first seen
fn majority<T: PartialEq + Clone>(values: impl IntoIterator<Item = T>) -> Option<T> {
    let mut counts: Vec<(T, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max()?;
    counts.into_iter().find(|(_, n)| *n == best).map(|(v, _)| v)
}

fn union_knowns(candidates: &[&CausalPlan]) -> BTreeMap<String, KnownValue> {
    let mut names: BTreeSet<&str> = BTreeSet::new();
    let mut votes: BTreeMap<&str, Vec<Rational>> = BTreeMap::new();
    for plan in candidates {
        for (name, value) in plan.knowns() {
            names.insert(name.as_str());
            if let Some(v) = value.value() {
                votes.entry(name.as_str()).or_default().push(v);
            }
        }
    }
    names
        .into_iter()
        .map(|name| {
            let value = votes
                .get(name)
                .and_then(|v| majority(v.iter().copied()))
                .map(KnownValue::Value)
                .unwrap_or(KnownValue::Unresolved);
            (name.to_string(), value)
        })
        .collect()
}

/// Variables a step reads, by name
fn step_input_names(plan: &CausalPlan, inputs: &[PlanInput]) -> BTreeSet<String> {
    inputs
        .iter()
        .filter_map(|input| match input {
            PlanInput::Known(name) => Some(name.clone()),
            PlanInput::Step(id) => plan
                .computation_plan()
                .iter()
                .find(|s| s.id == *id)
                .map(|s| s.target.clone()),
            PlanInput::Literal(_) => None,
        })
        .collect()
}

/// A candidate's formula for `edge`, when one of its steps computes the same
/// effect from the same causes
fn matching_expression(candidates: &[&CausalPlan], edge: &CausalEdge) -> Option<String> {
    candidates.iter().find_map(|plan| {
        plan.computation_plan()
            .iter()
            .filter(|step| step.target == edge.effect)
            .find(|step| step_input_names(plan, &step.inputs) == edge.cause)
            .and_then(|step| step.expression.clone())
    })
}

/// Best-effort plan: the target computed from every known in one step.
pub fn low_confidence_plan(target: &str, candidates: &[&CausalPlan]) -> Result<CausalPlan, PlanError> {
    CausalPlan::low_confidence(target, union_knowns(candidates), LOW_CONFIDENCE_RULE)
}

/// Deterministic fusion of candidate plans. `None` only for an empty slice.
pub fn merge_candidates(candidates: &[&CausalPlan]) -> Option<MergeOutcome> {
    let target = majority(candidates.iter().map(|p| p.target_variable().to_string()))?;
    let mut knowns = union_knowns(candidates);

    struct Support {
        edge: CausalEdge,
        count: usize,
    }
    let mut supported: Vec<Support> = Vec::new();
    for plan in candidates {
        for edge in plan.causal_graph() {
            match supported
                .iter_mut()
                .find(|s| s.edge.cause == edge.cause && s.edge.effect == edge.effect)
            {
                Some(s) => s.count += 1,
                None => supported.push(Support {
                    edge: edge.clone(),
                    count: 1,
                }),
            }
        }
    }
    let distinct = supported.len();
    // An effect some candidate states as a value needs no edge
    supported.retain(|s| !matches!(knowns.get(&s.edge.effect), Some(KnownValue::Value(_))));
    supported.sort_by(|a, b| b.count.cmp(&a.count));

    let mut chosen: Vec<CausalEdge> = Vec::new();
    let mut cyclic = 0usize;
    for s in &supported {
        if chosen.iter().any(|e| e.effect == s.edge.effect) {
            continue;
        }
        if edge_keeps_acyclic(&chosen, &s.edge) {
            chosen.push(s.edge.clone());
        } else {
            cyclic += 1;
        }
    }
    // Alternates, only while the target is unreachable
    if !derivable(&target, &knowns, &chosen) {
        for s in &supported {
            if chosen.contains(&s.edge) || !edge_keeps_acyclic(&chosen, &s.edge) {
                continue;
            }
            chosen.push(s.edge.clone());
            if derivable(&target, &knowns, &chosen) {
                break;
            }
        }
    }

    // A variable computed by a chosen edge is not an unresolved given
    knowns.retain(|name, value| value.value().is_some() || !chosen.iter().any(|e| &e.effect == name));

    let mut expressions: BTreeMap<String, String> = BTreeMap::new();
    for edge in &chosen {
        if expressions.contains_key(&edge.effect) {
            continue;
        }
        if let Some(expression) = matching_expression(candidates, edge) {
            expressions.insert(edge.effect.clone(), expression);
        }
    }

    let merged = derive_steps(&target, &knowns, &chosen, &expressions).and_then(|steps| {
        let graph: Vec<CausalEdge> = steps
            .iter()
            .filter_map(|step| {
                let causes: BTreeSet<String> = step
                    .inputs
                    .iter()
                    .filter_map(|input| match input {
                        PlanInput::Known(name) => Some(name.clone()),
                        PlanInput::Step(id) => steps.iter().find(|s| s.id == *id).map(|s| s.target.clone()),
                        PlanInput::Literal(_) => None,
                    })
                    .collect();
                chosen
                    .iter()
                    .find(|e| e.effect == step.target && e.cause == causes)
                    .cloned()
            })
            .collect();
        CausalPlan::new(&target, knowns.clone(), graph, steps)
    });

    match merged {
        Ok(plan) => Some(MergeOutcome {
            rationale: format!(
                "merged {} candidates on '{}': kept {} of {} distinct edges, {} dropped for cycles",
                candidates.len(),
                target,
                plan.causal_graph().len(),
                distinct,
                cyclic
            ),
            plan,
            method: FusionMethod::Deterministic,
        }),
        Err(e) => {
            debug!("Merged graph does not reach '{}': {}", target, e);
            match low_confidence_plan(&target, candidates) {
                Ok(plan) => Some(MergeOutcome {
                    plan,
                    method: FusionMethod::LowConfidence,
                    rationale: format!("no merged graph reaches '{}' ({}); connected it to every known", target, e),
                }),
                // Without knowns there is nothing to connect; keep a candidate as written
                Err(_) => candidates
                    .iter()
                    .position(|p| p.target_variable() == target)
                    .map(|i| MergeOutcome {
                        plan: candidates[i].clone(),
                        method: FusionMethod::Deterministic,
                        rationale: format!("kept candidate {} unchanged", i + 1),
                    }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{GenerationResponse, LLMError};
    use crate::domain::rollout::Rollout;
    use async_trait::async_trait;
    use praxis_cortex::application::{NullEventBus, StandardExperienceService};
    use praxis_cortex::InMemoryExperienceRepository;

    fn plan(json: &str) -> CausalPlan {
        serde_json::from_str(json).unwrap()
    }

    const SCENARIO: &str = r#"{
        "target_variable": "final_velocity",
        "knowns": {"mass": 10, "force": 50, "time": 5, "initial_velocity": 0},
        "causal_graph": [
            {"cause": ["force", "mass"], "effect": "acceleration", "rule": "F=ma"},
            {"cause": ["initial_velocity", "acceleration", "time"], "effect": "final_velocity", "rule": "v=v0+at"}
        ],
        "computation_plan": [
            {"id": 1, "target": "acceleration", "inputs": ["force", "mass"], "expression": "force / mass"},
            {"id": 2, "target": "final_velocity", "inputs": ["initial_velocity", "acceleration", "time"], "expression": "initial_velocity + acceleration * time"}
        ]
    }"#;

    // Skips the initial velocity; still a valid plan
    const SHORTCUT: &str = r#"{
        "target_variable": "final_velocity",
        "knowns": {"mass": 10, "force": 50, "time": 5},
        "causal_graph": [
            {"cause": ["force", "mass"], "effect": "acceleration", "rule": "F=ma"},
            {"cause": ["acceleration", "time"], "effect": "final_velocity", "rule": "v=at"}
        ]
    }"#;

    #[test]
    fn test_merge_prefers_best_supported_edges() {
        let a = plan(SCENARIO);
        let b = plan(SCENARIO);
        let c = plan(SHORTCUT);
        let outcome = merge_candidates(&[&c, &a, &b]).unwrap();

        assert_eq!(outcome.method, FusionMethod::Deterministic);
        let fused = outcome.plan;
        assert_eq!(fused.target_variable(), "final_velocity");
        assert_eq!(fused.edge_signatures(), a.edge_signatures());
        let last = fused.computation_plan().last().unwrap();
        assert_eq!(last.expression.as_deref(), Some("initial_velocity + acceleration * time"));
        assert_eq!(fused.computation_plan()[0].expression.as_deref(), Some("force / mass"));
    }

    #[test]
    fn test_merge_drops_edges_that_close_a_cycle() {
        let a = plan(
            r#"{"target_variable": "t", "knowns": {"k": 1, "g": null},
                "causal_graph": [{"cause": ["k", "g"], "effect": "t"}]}"#,
        );
        let b = plan(
            r#"{"target_variable": "t", "knowns": {"k": 1},
                "causal_graph": [{"cause": ["k"], "effect": "t"}, {"cause": ["t"], "effect": "g"}]}"#,
        );
        let outcome = merge_candidates(&[&a, &a, &b]).unwrap();

        assert!(outcome.rationale.contains("1 dropped for cycles"), "{}", outcome.rationale);
        let graph = outcome.plan.causal_graph();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph[0].effect, "t");
        assert!(graph[0].cause.contains("g"));
    }

    #[test]
    fn test_merge_reconciles_conflicting_knowns() {
        let a = plan(r#"{"target_variable": "y", "knowns": {"x": 2}, "causal_graph": [{"cause": ["x"], "effect": "y"}]}"#);
        let b = plan(r#"{"target_variable": "y", "knowns": {"x": 3}, "causal_graph": [{"cause": ["x"], "effect": "y"}]}"#);
        let c = plan(r#"{"target_variable": "y", "knowns": {"x": null}, "causal_graph": [{"cause": ["x"], "effect": "y"}]}"#);
        let fused = merge_candidates(&[&c, &b, &a, &b]).unwrap().plan;
        assert_eq!(fused.knowns().get("x"), Some(&KnownValue::Value(Rational::from_integer(3))));
    }

    #[test]
    fn test_low_confidence_plan_connects_all_knowns() {
        let a = plan(SCENARIO);
        let fallback = low_confidence_plan("final_velocity", &[&a]).unwrap();
        assert!(fallback.is_low_confidence());
        assert_eq!(fallback.causal_graph().len(), 1);
        assert_eq!(fallback.causal_graph()[0].cause.len(), 4);
    }

    struct Critic(Result<String, LLMError>);

    #[async_trait]
    impl LLMProvider for Critic {
        async fn generate(&self, _prompt: &str, options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
            assert_eq!(options.temperature, Some(0.0));
            self.0.clone().map(|text| GenerationResponse::text(text, "critic"))
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    fn fusion(response: Result<String, LLMError>) -> CriticFusion {
        let experience = Arc::new(StandardExperienceService::new(
            Arc::new(InMemoryExperienceRepository::new()),
            Arc::new(NullEventBus),
        ));
        CriticFusion::new(
            Arc::new(Critic(response)),
            Arc::new(PromptTemplateEngine::new().unwrap()),
            experience,
            Arc::new(EventBus::with_default_capacity()),
            FusionSettings {
                temperature: 0.0,
                max_prior_items: 8,
            },
        )
    }

    fn group() -> RolloutGroup {
        RolloutGroup {
            generator: 1,
            rollouts: vec![
                Rollout {
                    generator: 1,
                    index: 0,
                    seed: 1,
                    plan: plan(SCENARIO),
                },
                Rollout {
                    generator: 1,
                    index: 2,
                    seed: 3,
                    plan: plan(SHORTCUT),
                },
            ],
            failures: vec![],
            experiences_shown: vec![],
        }
    }

    #[tokio::test]
    async fn test_model_verdict_is_used_when_valid() {
        let verdict = format!(r#"{{"rationale": "kept the initial velocity", "plan": {}}}"#, SCENARIO);
        let problem = Problem::new("p1", "find the final velocity", Some("25".into()));
        let fused = fusion(Ok(verdict)).fuse(&problem, "- F=ma", &group()).await.unwrap();

        assert_eq!(fused.method, FusionMethod::Model);
        assert_eq!(fused.rationale, "kept the initial velocity");
        assert_eq!(fused.source_rollouts, vec![0, 2]);
        assert_eq!(fused.reward, None);
    }

    #[tokio::test]
    async fn test_invalid_verdict_falls_back_to_merger() {
        let problem = Problem::new("p1", "find the final velocity", None);
        let bad_target = r#"{"plan": {"target_variable": "momentum", "knowns": {"mass": 10},
            "causal_graph": [{"cause": ["mass"], "effect": "momentum"}]}}"#;

        for response in [
            Err(LLMError::Timeout(std::time::Duration::from_secs(1))),
            Ok("no idea".to_string()),
            Ok(bad_target.to_string()),
        ] {
            let fused = fusion(response).fuse(&problem, "", &group()).await.unwrap();
            assert_eq!(fused.method, FusionMethod::Deterministic);
            assert_eq!(fused.plan.target_variable(), "final_velocity");
        }
    }

    #[tokio::test]
    async fn test_empty_group_is_not_fused() {
        let problem = Problem::new("p1", "x", None);
        let empty = RolloutGroup {
            generator: 3,
            rollouts: vec![],
            failures: vec![],
            experiences_shown: vec![],
        };
        assert!(fusion(Ok(String::new())).fuse(&problem, "", &empty).await.is_none());
    }
}
