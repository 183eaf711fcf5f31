// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Causal Plan
//!
//! The structured scaffold every generator emits and the critic fuses.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Strict, validated plan type; malformed plans never get past deserialization
//!
//! A [`CausalPlan`] can only be obtained through [`CausalPlan::new`] or through
//! `serde` (which routes via [`RawPlan`] and the same validation), so every
//! value in the program is known to have:
//!
//! - normalized variable names (`Final Velocity` → `final_velocity`),
//! - an acyclic causal graph from which the target is derivable,
//! - a computation plan whose steps only read knowns, literals or earlier steps,
//!   and which produces the target.
//!
//! Models are lenient writers, so the raw form accepts common aliases
//! (`steps`, `edges`, `causes`), a single cause instead of a list, step
//! inputs written as names, and a missing graph or plan (derived from the other).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::rational::Rational;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("plan has no target variable")]
    MissingTarget,

    #[error("invalid causal edge: {0}")]
    InvalidEdge(String),

    #[error("causal graph has a cycle through '{0}'")]
    Cycle(String),

    #[error("target '{0}' cannot be derived from the knowns")]
    Unresolvable(String),

    #[error("invalid computation step {id}: {reason}")]
    InvalidStep { id: u32, reason: String },

    #[error("step {step} reads '{input}', which is neither known nor computed earlier")]
    UnresolvedInput { step: u32, input: String },

    #[error("no JSON object found in model output")]
    NoJson,

    #[error("malformed plan: {0}")]
    Malformed(String),
}

/// Lowercase snake_case with runs of separators collapsed.
pub fn normalize_variable(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_separator && !out.is_empty() {
                out.push('_');
            }
            pending_separator = false;
            out.extend(c.to_lowercase());
        } else {
            pending_separator = true;
        }
    }
    out
}

/// A known quantity; `Unresolved` names a given whose value the problem
/// implies but does not state (a physical constant, say).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KnownValue {
    Value(Rational),
    Unresolved,
}

impl KnownValue {
    pub fn value(&self) -> Option<Rational> {
        match self {
            KnownValue::Value(v) => Some(*v),
            KnownValue::Unresolved => None,
        }
    }
}

impl Serialize for KnownValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            KnownValue::Value(v) => v.serialize(serializer),
            KnownValue::Unresolved => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for KnownValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Null => KnownValue::Unresolved,
            serde_json::Value::Number(n) => Rational::parse(&n.to_string())
                .map(KnownValue::Value)
                .unwrap_or(KnownValue::Unresolved),
            serde_json::Value::String(s) => parse_known_text(&s),
            serde_json::Value::Object(map) => map
                .get("value")
                .map(|v| match v {
                    serde_json::Value::String(s) => parse_known_text(s),
                    other => Rational::parse(&other.to_string())
                        .map(KnownValue::Value)
                        .unwrap_or(KnownValue::Unresolved),
                })
                .unwrap_or(KnownValue::Unresolved),
            _ => KnownValue::Unresolved,
        })
    }
}

/// `"10"`, `"1/3"`, `"10 kg"` → value; anything else is unresolved.
fn parse_known_text(text: &str) -> KnownValue {
    if let Ok(v) = Rational::parse(text) {
        return KnownValue::Value(v);
    }
    text.split_whitespace()
        .next()
        .and_then(|first| Rational::parse(first).ok())
        .map(KnownValue::Value)
        .unwrap_or(KnownValue::Unresolved)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CausalEdge {
    pub cause: BTreeSet<String>,
    pub effect: String,
    pub rule: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanInput {
    /// Reads a known by name
    Known(String),
    /// Reads the output of an earlier step
    Step(u32),
    /// An inline constant
    Literal(Rational),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComputationStep {
    pub id: u32,
    pub target: String,
    pub inputs: Vec<PlanInput>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanConfidence {
    #[default]
    Normal,
    /// Best-effort plan emitted when no candidate reached the target
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPlan")]
pub struct CausalPlan {
    target_variable: String,
    knowns: BTreeMap<String, KnownValue>,
    causal_graph: Vec<CausalEdge>,
    computation_plan: Vec<ComputationStep>,
    confidence: PlanConfidence,
}

// ============================================================================
// Raw (lenient) wire form
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEdge {
    #[serde(alias = "causes", alias = "from")]
    cause: OneOrMany,
    #[serde(alias = "to")]
    effect: String,
    #[serde(default, alias = "relation", alias = "formula")]
    rule: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Step { step: u32 },
    Known { known: String },
    Literal { literal: Rational },
    Variable { variable: String },
    Name(String),
    Number(Rational),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStep {
    #[serde(default, alias = "step", alias = "step_id")]
    id: Option<u32>,
    #[serde(alias = "output", alias = "target_variable", alias = "variable")]
    target: String,
    #[serde(default)]
    inputs: Vec<RawInput>,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "formula")]
    expression: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPlan {
    #[serde(alias = "target")]
    target_variable: String,
    #[serde(default, alias = "given", alias = "known_variables")]
    knowns: BTreeMap<String, KnownValue>,
    #[serde(default, alias = "edges", alias = "graph")]
    causal_graph: Vec<RawEdge>,
    #[serde(default, alias = "steps", alias = "plan")]
    computation_plan: Vec<RawStep>,
    #[serde(default)]
    confidence: PlanConfidence,
}

impl TryFrom<RawPlan> for CausalPlan {
    type Error = PlanError;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        let target = normalize_variable(&raw.target_variable);

        let mut knowns: BTreeMap<String, KnownValue> = BTreeMap::new();
        for (name, value) in raw.knowns {
            let key = normalize_variable(&name);
            if key.is_empty() {
                continue;
            }
            match knowns.get(&key) {
                Some(KnownValue::Value(_)) => {}
                _ => {
                    knowns.insert(key, value);
                }
            }
        }

        let edges = raw
            .causal_graph
            .into_iter()
            .map(|e| CausalEdge {
                cause: match e.cause {
                    OneOrMany::One(c) => c.split(',').map(normalize_variable).collect(),
                    OneOrMany::Many(cs) => cs.iter().map(|c| normalize_variable(c)).collect(),
                },
                effect: normalize_variable(&e.effect),
                rule: e.rule.trim().to_string(),
            })
            .map(|mut e| {
                e.cause.remove("");
                e
            })
            .collect::<Vec<_>>();

        let steps = if raw.computation_plan.is_empty() {
            Vec::new()
        } else {
            resolve_steps(raw.computation_plan, &knowns)?
        };

        CausalPlan::assemble(target, knowns, edges, steps, raw.confidence)
    }
}

fn parse_step_reference(name: &str) -> Option<u32> {
    let trimmed = name.trim();
    let digits = trimmed
        .strip_prefix("step_")
        .or_else(|| trimmed.strip_prefix("step "))
        .or_else(|| trimmed.strip_prefix("step"))
        .or_else(|| trimmed.strip_prefix('$'))
        .or_else(|| trimmed.strip_prefix('#'))?;
    digits.trim().parse().ok()
}

fn resolve_steps(raw_steps: Vec<RawStep>, knowns: &BTreeMap<String, KnownValue>) -> Result<Vec<ComputationStep>, PlanError> {
    let mut steps: Vec<ComputationStep> = Vec::with_capacity(raw_steps.len());
    let mut produced: BTreeMap<String, u32> = BTreeMap::new();
    let mut seen_ids = BTreeSet::new();

    for (position, raw) in raw_steps.into_iter().enumerate() {
        let id = raw.id.unwrap_or(position as u32 + 1);
        if !seen_ids.insert(id) {
            return Err(PlanError::InvalidStep {
                id,
                reason: "duplicate step id".to_string(),
            });
        }
        let target = normalize_variable(&raw.target);
        if target.is_empty() {
            return Err(PlanError::InvalidStep {
                id,
                reason: "step has no target".to_string(),
            });
        }

        let mut inputs = Vec::with_capacity(raw.inputs.len());
        for input in raw.inputs {
            let resolved = match input {
                RawInput::Step { step } => {
                    if !steps.iter().any(|s| s.id == step) {
                        return Err(PlanError::InvalidStep {
                            id,
                            reason: format!("reads step {} which does not precede it", step),
                        });
                    }
                    PlanInput::Step(step)
                }
                RawInput::Literal { literal } | RawInput::Number(literal) => PlanInput::Literal(literal),
                RawInput::Known { known: name } | RawInput::Variable { variable: name } | RawInput::Name(name) => {
                    let key = normalize_variable(&name);
                    if let Some(step_id) = produced.get(&key) {
                        PlanInput::Step(*step_id)
                    } else if knowns.contains_key(&key) {
                        PlanInput::Known(key)
                    } else if let Some(step_id) = parse_step_reference(&name).filter(|n| seen_ids.contains(n) && *n != id) {
                        PlanInput::Step(step_id)
                    } else if let Ok(literal) = Rational::parse(&name) {
                        PlanInput::Literal(literal)
                    } else {
                        return Err(PlanError::UnresolvedInput { step: id, input: key });
                    }
                }
            };
            inputs.push(resolved);
        }

        if produced.insert(target.clone(), id).is_some() {
            return Err(PlanError::InvalidStep {
                id,
                reason: format!("'{}' is computed more than once", target),
            });
        }
        steps.push(ComputationStep {
            id,
            target,
            inputs,
            description: raw.description.trim().to_string(),
            expression: raw.expression.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
        });
    }
    Ok(steps)
}

// ============================================================================
// Validated plan
// ============================================================================

impl CausalPlan {
    /// Build and validate a plan. An empty `computation_plan` is derived from
    /// the graph; an empty graph is derived from the steps.
    pub fn new(
        target_variable: &str,
        knowns: BTreeMap<String, KnownValue>,
        causal_graph: Vec<CausalEdge>,
        computation_plan: Vec<ComputationStep>,
    ) -> Result<Self, PlanError> {
        let knowns = knowns
            .into_iter()
            .map(|(k, v)| (normalize_variable(&k), v))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self::assemble(
            normalize_variable(target_variable),
            knowns,
            causal_graph,
            computation_plan,
            PlanConfidence::Normal,
        )
    }

    /// Last-resort plan: the target computed in one step from every known.
    pub fn low_confidence(target_variable: &str, knowns: BTreeMap<String, KnownValue>, rule: &str) -> Result<Self, PlanError> {
        let target = normalize_variable(target_variable);
        let knowns: BTreeMap<String, KnownValue> = knowns
            .into_iter()
            .map(|(k, v)| (normalize_variable(&k), v))
            .filter(|(k, _)| !k.is_empty() && *k != target)
            .collect();
        if knowns.is_empty() {
            return Err(PlanError::Unresolvable(target));
        }
        let edge = CausalEdge {
            cause: knowns.keys().cloned().collect(),
            effect: target.clone(),
            rule: rule.to_string(),
        };
        let step = ComputationStep {
            id: 1,
            target: target.clone(),
            inputs: knowns.keys().cloned().map(PlanInput::Known).collect(),
            description: rule.to_string(),
            expression: None,
        };
        Self::assemble(target, knowns, vec![edge], vec![step], PlanConfidence::Low)
    }

    fn assemble(
        target: String,
        knowns: BTreeMap<String, KnownValue>,
        edges: Vec<CausalEdge>,
        steps: Vec<ComputationStep>,
        confidence: PlanConfidence,
    ) -> Result<Self, PlanError> {
        if target.is_empty() {
            return Err(PlanError::MissingTarget);
        }

        let mut graph: Vec<CausalEdge> = Vec::with_capacity(edges.len());
        for edge in edges {
            validate_edge(&edge, &knowns)?;
            if !graph.contains(&edge) {
                graph.push(edge);
            }
        }

        if graph.is_empty() {
            graph = edges_from_steps(&steps);
        }
        check_acyclic(&graph)?;
        if !derivable(&target, &knowns, &graph) {
            return Err(PlanError::Unresolvable(target));
        }

        let steps = if steps.is_empty() {
            derive_steps(&target, &knowns, &graph, &BTreeMap::new())?
        } else {
            steps
        };
        check_steps(&target, &knowns, &steps)?;

        Ok(Self {
            target_variable: target,
            knowns,
            causal_graph: graph,
            computation_plan: steps,
            confidence,
        })
    }

    pub fn target_variable(&self) -> &str {
        &self.target_variable
    }

    pub fn knowns(&self) -> &BTreeMap<String, KnownValue> {
        &self.knowns
    }

    pub fn causal_graph(&self) -> &[CausalEdge] {
        &self.causal_graph
    }

    pub fn computation_plan(&self) -> &[ComputationStep] {
        &self.computation_plan
    }

    pub fn confidence(&self) -> PlanConfidence {
        self.confidence
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == PlanConfidence::Low
    }

    /// Knowns that carry a value
    pub fn known_values(&self) -> BTreeMap<String, Rational> {
        self.knowns
            .iter()
            .filter_map(|(k, v)| v.value().map(|v| (k.clone(), v)))
            .collect()
    }

    /// Edge `(cause set, effect)` pairs, for comparing plans structurally
    pub fn edge_signatures(&self) -> BTreeSet<(Vec<String>, String)> {
        self.causal_graph
            .iter()
            .map(|e| (e.cause.iter().cloned().collect(), e.effect.clone()))
            .collect()
    }

    /// Effects in dependency order (every cause precedes its effect)
    pub fn topological_order(&self) -> Vec<String> {
        topological_effects(&self.causal_graph)
    }

    /// The same plan with one known multiplied by `factor`, for
    /// counterfactual questions ("what if the mass were doubled?").
    pub fn with_known_scaled(&self, name: &str, factor: Rational) -> Result<Self, PlanError> {
        let key = normalize_variable(name);
        let Some(KnownValue::Value(current)) = self.knowns.get(&key) else {
            return Err(PlanError::Malformed(format!("'{}' is not a known with a value", key)));
        };
        let scaled = current
            .checked_mul(&factor)
            .map_err(|e| PlanError::Malformed(e.to_string()))?;
        let mut plan = self.clone();
        plan.knowns.insert(key, KnownValue::Value(scaled));
        Ok(plan)
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

fn validate_edge(edge: &CausalEdge, knowns: &BTreeMap<String, KnownValue>) -> Result<(), PlanError> {
    if edge.effect.is_empty() {
        return Err(PlanError::InvalidEdge("edge without an effect".to_string()));
    }
    if edge.cause.is_empty() {
        return Err(PlanError::InvalidEdge(format!("'{}' has no causes", edge.effect)));
    }
    if edge.cause.contains(&edge.effect) {
        return Err(PlanError::Cycle(edge.effect.clone()));
    }
    if let Some(KnownValue::Value(_)) = knowns.get(&edge.effect) {
        return Err(PlanError::InvalidEdge(format!("'{}' is already known", edge.effect)));
    }
    Ok(())
}

fn edges_from_steps(steps: &[ComputationStep]) -> Vec<CausalEdge> {
    let by_id: BTreeMap<u32, &str> = steps.iter().map(|s| (s.id, s.target.as_str())).collect();
    steps
        .iter()
        .filter_map(|step| {
            let cause: BTreeSet<String> = step
                .inputs
                .iter()
                .filter_map(|input| match input {
                    PlanInput::Known(name) => Some(name.clone()),
                    PlanInput::Step(id) => by_id.get(id).map(|t| t.to_string()),
                    PlanInput::Literal(_) => None,
                })
                .collect();
            if cause.is_empty() {
                return None;
            }
            Some(CausalEdge {
                cause,
                effect: step.target.clone(),
                rule: step.expression.clone().unwrap_or_else(|| step.description.clone()),
            })
        })
        .collect()
}

/// Variables that appear as causes or effects, mapped to the effects they feed
fn adjacency(edges: &[CausalEdge]) -> BTreeMap<&str, BTreeSet<&str>> {
    let mut adjacency: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for edge in edges {
        adjacency.entry(edge.effect.as_str()).or_default();
        for cause in &edge.cause {
            adjacency.entry(cause.as_str()).or_default().insert(edge.effect.as_str());
        }
    }
    adjacency
}

/// Kahn's algorithm; returns the variables left over when a cycle exists.
fn kahn(edges: &[CausalEdge]) -> (Vec<String>, Vec<String>) {
    let adjacency = adjacency(edges);
    let mut in_degree: BTreeMap<&str, usize> = adjacency.keys().map(|k| (*k, 0)).collect();
    for targets in adjacency.values() {
        for t in targets {
            if let Some(d) = in_degree.get_mut(t) {
                *d += 1;
            }
        }
    }

    let mut ready: VecDeque<&str> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(k, _)| *k).collect();
    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(node) = ready.pop_front() {
        order.push(node.to_string());
        if let Some(targets) = adjacency.get(node) {
            for t in targets {
                if let Some(d) = in_degree.get_mut(t) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push_back(t);
                    }
                }
            }
        }
    }
    let remaining = in_degree
        .into_iter()
        .filter(|(k, _)| !order.iter().any(|o| o == k))
        .map(|(k, _)| k.to_string())
        .collect();
    (order, remaining)
}

pub(crate) fn check_acyclic(edges: &[CausalEdge]) -> Result<(), PlanError> {
    let (_, remaining) = kahn(edges);
    match remaining.into_iter().next() {
        Some(node) => Err(PlanError::Cycle(node)),
        None => Ok(()),
    }
}

/// True when adding `cause → effect` keeps the graph acyclic
pub(crate) fn edge_keeps_acyclic(edges: &[CausalEdge], candidate: &CausalEdge) -> bool {
    if candidate.cause.contains(&candidate.effect) {
        return false;
    }
    let mut extended = edges.to_vec();
    extended.push(candidate.clone());
    check_acyclic(&extended).is_ok()
}

fn topological_effects(edges: &[CausalEdge]) -> Vec<String> {
    let effects: BTreeSet<&str> = edges.iter().map(|e| e.effect.as_str()).collect();
    kahn(edges)
        .0
        .into_iter()
        .filter(|v| effects.contains(v.as_str()))
        .collect()
}

pub(crate) fn derivable(target: &str, knowns: &BTreeMap<String, KnownValue>, edges: &[CausalEdge]) -> bool {
    let mut resolved: BTreeSet<&str> = knowns.keys().map(|k| k.as_str()).collect();
    loop {
        if resolved.contains(target) {
            return true;
        }
        let before = resolved.len();
        for edge in edges {
            if !resolved.contains(edge.effect.as_str()) && edge.cause.iter().all(|c| resolved.contains(c.as_str())) {
                resolved.insert(edge.effect.as_str());
            }
        }
        if resolved.len() == before {
            return false;
        }
    }
}

/// Build a computation plan by walking back from `target`; each effect uses
/// the first edge that produces it. `expressions` supplies formulas by effect.
pub(crate) fn derive_steps(
    target: &str,
    knowns: &BTreeMap<String, KnownValue>,
    edges: &[CausalEdge],
    expressions: &BTreeMap<String, String>,
) -> Result<Vec<ComputationStep>, PlanError> {
    fn visit(
        variable: &str,
        knowns: &BTreeMap<String, KnownValue>,
        edges: &[CausalEdge],
        expressions: &BTreeMap<String, String>,
        visiting: &mut BTreeSet<String>,
        steps: &mut Vec<ComputationStep>,
    ) -> Result<(), PlanError> {
        if knowns.contains_key(variable) || steps.iter().any(|s| s.target == variable) {
            return Ok(());
        }
        if !visiting.insert(variable.to_string()) {
            return Err(PlanError::Cycle(variable.to_string()));
        }
        let edge = edges
            .iter()
            .find(|e| e.effect == variable && e.cause.iter().all(|c| derivable(c, knowns, edges)))
            .ok_or_else(|| PlanError::Unresolvable(variable.to_string()))?;
        for cause in &edge.cause {
            visit(cause, knowns, edges, expressions, visiting, steps)?;
        }
        let inputs = edge
            .cause
            .iter()
            .map(|cause| match steps.iter().find(|s| &s.target == cause) {
                Some(step) => PlanInput::Step(step.id),
                None => PlanInput::Known(cause.clone()),
            })
            .collect();
        steps.push(ComputationStep {
            id: steps.len() as u32 + 1,
            target: variable.to_string(),
            inputs,
            description: edge.rule.clone(),
            expression: expressions.get(variable).cloned(),
        });
        visiting.remove(variable);
        Ok(())
    }

    let mut steps = Vec::new();
    visit(target, knowns, edges, expressions, &mut BTreeSet::new(), &mut steps)?;
    Ok(steps)
}

fn check_steps(target: &str, knowns: &BTreeMap<String, KnownValue>, steps: &[ComputationStep]) -> Result<(), PlanError> {
    let mut earlier: BTreeSet<u32> = BTreeSet::new();
    for step in steps {
        for input in &step.inputs {
            match input {
                PlanInput::Known(name) if !knowns.contains_key(name) => {
                    return Err(PlanError::UnresolvedInput {
                        step: step.id,
                        input: name.clone(),
                    })
                }
                PlanInput::Step(id) if !earlier.contains(id) => {
                    return Err(PlanError::InvalidStep {
                        id: step.id,
                        reason: format!("reads step {} which does not precede it", id),
                    })
                }
                _ => {}
            }
        }
        earlier.insert(step.id);
    }
    if !steps.iter().any(|s| s.target == target) && !matches!(knowns.get(target), Some(KnownValue::Value(_))) {
        return Err(PlanError::Unresolvable(target.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"{
        "target_variable": "Final Velocity",
        "knowns": {"mass": 10, "force": 50, "time": 5, "initial_velocity": 0},
        "causal_graph": [
            {"cause": ["force", "mass"], "effect": "acceleration", "rule": "F=ma"},
            {"cause": ["initial_velocity", "acceleration", "time"], "effect": "final_velocity", "rule": "v=v0+at"}
        ],
        "computation_plan": [
            {"id": 1, "target": "acceleration", "inputs": ["force", "mass"], "description": "a = F/m", "expression": "force / mass"},
            {"id": 2, "target": "final_velocity", "inputs": ["initial_velocity", "acceleration", "time"], "description": "v = v0 + a t", "expression": "initial_velocity + acceleration * time"}
        ]
    }"#;

    fn known(pairs: &[(&str, i64)]) -> BTreeMap<String, KnownValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), KnownValue::Value(Rational::from(*v))))
            .collect()
    }

    fn edge(cause: &[&str], effect: &str) -> CausalEdge {
        CausalEdge {
            cause: cause.iter().map(|c| c.to_string()).collect(),
            effect: effect.to_string(),
            rule: String::new(),
        }
    }

    #[test]
    fn test_scenario_plan_parses_and_orders() {
        let plan: CausalPlan = serde_json::from_str(SCENARIO).unwrap();
        assert_eq!(plan.target_variable(), "final_velocity");
        assert_eq!(plan.computation_plan()[1].inputs[1], PlanInput::Step(1));
        assert_eq!(plan.topological_order(), vec!["acceleration", "final_velocity"]);
        assert_eq!(plan.known_values()["force"], Rational::from(50));
    }

    #[test]
    fn test_serialized_plan_parses_back() {
        let plan: CausalPlan = serde_json::from_str(SCENARIO).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let again: CausalPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, again);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let result = CausalPlan::new(
            "c",
            known(&[("x", 1)]),
            vec![edge(&["x", "b"], "a"), edge(&["a"], "b"), edge(&["b"], "c")],
            vec![],
        );
        assert!(matches!(result, Err(PlanError::Cycle(_))));
    }

    #[test]
    fn test_unreachable_target_is_rejected() {
        let result = CausalPlan::new("z", known(&[("x", 1)]), vec![edge(&["y"], "z")], vec![]);
        assert_eq!(result, Err(PlanError::Unresolvable("z".to_string())));
    }

    #[test]
    fn test_steps_derived_from_graph() {
        let plan = CausalPlan::new(
            "final_velocity",
            known(&[("mass", 10), ("force", 50), ("time", 5), ("initial_velocity", 0)]),
            vec![
                edge(&["initial_velocity", "acceleration", "time"], "final_velocity"),
                edge(&["force", "mass"], "acceleration"),
            ],
            vec![],
        )
        .unwrap();
        let steps = plan.computation_plan();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].target, "acceleration");
        assert_eq!(steps[1].target, "final_velocity");
        assert!(steps[1].inputs.contains(&PlanInput::Step(1)));
    }

    #[test]
    fn test_graph_derived_from_steps_and_lenient_aliases() {
        let plan: CausalPlan = serde_json::from_str(
            r#"{
                "target": "area",
                "given": {"side": "3 m"},
                "steps": [{"output": "area", "inputs": ["side", "side"], "formula": "side^2"}]
            }"#,
        )
        .unwrap();
        assert_eq!(plan.causal_graph().len(), 1);
        assert_eq!(plan.causal_graph()[0].effect, "area");
        assert_eq!(plan.known_values()["side"], Rational::from(3));
    }

    #[test]
    fn test_step_reading_a_later_step_is_rejected() {
        let result: Result<CausalPlan, _> = serde_json::from_str(
            r#"{
                "target_variable": "b",
                "knowns": {"x": 1},
                "computation_plan": [
                    {"id": 1, "target": "a", "inputs": [{"step": 2}]},
                    {"id": 2, "target": "b", "inputs": ["x"]}
                ]
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_input_is_rejected() {
        let result: Result<CausalPlan, _> = serde_json::from_str(
            r#"{"target_variable": "a", "knowns": {"x": 1}, "computation_plan": [{"target": "a", "inputs": ["mystery"]}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_fraction_and_unresolved_knowns() {
        let plan: CausalPlan = serde_json::from_str(
            r#"{"target_variable": "y", "knowns": {"ratio": "1/3", "g": null},
                "causal_graph": [{"cause": "ratio, g", "effect": "y"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.knowns()["ratio"], KnownValue::Value(Rational::new(1, 3).unwrap()));
        assert_eq!(plan.knowns()["g"], KnownValue::Unresolved);
    }

    #[test]
    fn test_counterfactual_scaling_is_exact() {
        let plan: CausalPlan = serde_json::from_str(
            r#"{"target_variable": "y", "knowns": {"ratio": "1/3"}, "causal_graph": [{"cause": ["ratio"], "effect": "y"}]}"#,
        )
        .unwrap();
        let doubled = plan.with_known_scaled("ratio", Rational::from(2)).unwrap();
        assert_eq!(doubled.known_values()["ratio"], Rational::new(2, 3).unwrap());
    }

    #[test]
    fn test_low_confidence_plan_is_valid() {
        let plan = CausalPlan::low_confidence("Answer", known(&[("a", 1), ("b", 2)]), "unknown relation").unwrap();
        assert!(plan.is_low_confidence());
        assert_eq!(plan.causal_graph().len(), 1);
        assert_eq!(plan.causal_graph()[0].cause.len(), 2);
        assert_eq!(plan.computation_plan()[0].target, "answer");
    }

    #[test]
    fn test_normalize_variable() {
        assert_eq!(normalize_variable("  Final Velocity "), "final_velocity");
        assert_eq!(normalize_variable("v-0"), "v_0");
        assert_eq!(normalize_variable("__mass__"), "mass");
    }
}
