// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scripted model providers and fixtures shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use praxis_core::application::generator::derive_seed;
use praxis_core::application::Trainer;
use praxis_core::domain::answer::Problem;
use praxis_core::domain::config::{ExecutionMode, PraxisConfigSpec};
use praxis_core::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider, ModelRole};
use praxis_core::infrastructure::event_bus::EventBus;
use praxis_core::infrastructure::llm::RoleProviders;
use praxis_core::infrastructure::FormulaAnswerComputer;
use praxis_cortex::application::{
    CommitReport, ExperienceService, LibraryBatch, PendingChanges, RejectedBatch, SemanticRetriever,
    StandardExperienceService,
};
use praxis_cortex::{ExperienceLibrary, ExperienceOwner, ExperienceRepository, InMemoryExperienceRepository, LibraryError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const PROBLEM: &str =
    "A 10 kg object starts at rest. A constant 50 N force acts on it for 5 s. What is its final velocity in m/s?";

pub const CORRECT_PLAN: &str = r#"{
  "target_variable": "final_velocity",
  "knowns": {"mass": 10, "force": 50, "time": 5, "initial_velocity": 0},
  "causal_graph": [
    {"cause": ["force", "mass"], "effect": "acceleration", "rule": "Newton's second law"},
    {"cause": ["initial_velocity", "acceleration", "time"], "effect": "final_velocity", "rule": "v = v0 + a t"}
  ],
  "computation_plan": [
    {"id": 1, "target": "acceleration", "inputs": ["force", "mass"], "description": "a = F / m", "expression": "force / mass"},
    {"id": 2, "target": "final_velocity", "inputs": ["initial_velocity", "acceleration", "time"], "description": "v = v0 + a t", "expression": "initial_velocity + acceleration * time"}
  ]
}"#;

/// Same graph, but multiplies force by mass
pub const WRONG_PLAN: &str = r#"{
  "target_variable": "final_velocity",
  "knowns": {"mass": 10, "force": 50, "time": 5, "initial_velocity": 0},
  "computation_plan": [
    {"id": 1, "target": "acceleration", "inputs": ["force", "mass"], "expression": "force * mass"},
    {"id": 2, "target": "final_velocity", "inputs": ["initial_velocity", "acceleration", "time"], "expression": "initial_velocity + acceleration * time"}
  ]
}"#;

pub const DISTILLED: &str = r#"{"operations": [
  {"action": "add", "content": "Acceleration is force divided by mass, never their product", "category": "dynamics"},
  {"action": "add", "content": "Objects at rest have zero initial velocity", "scope": "shared"}
]}"#;

type Script = Box<dyn Fn(&str, &GenerationOptions) -> Result<String, LLMError> + Send + Sync>;

/// A provider that answers from a closure and records every prompt
pub struct ScriptedLlm {
    name: &'static str,
    script: Script,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(
        name: &'static str,
        script: impl Fn(&str, &GenerationOptions) -> Result<String, LLMError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Box::new(script),
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(name: &'static str, reply: &'static str) -> Arc<Self> {
        Self::new(name, move |_, _| Ok(reply.to_string()))
    }

    /// Replies only after `delay`, for exercising call deadlines
    pub fn stalling(name: &'static str, reply: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Box::new(move |_, _| Ok(reply.to_string())),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Self::new(name, |_, _| Err(LLMError::Network("scripted outage".to_string())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.script)(prompt, options).map(|text| GenerationResponse::text(text, self.name))
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        Ok(())
    }
}

/// Recover `(generator, rollout index)` from a generation call
pub fn rollout_of(prompt: &str, options: &GenerationOptions, problem: &str, max_rollouts: u32) -> (u32, u32) {
    let generator: u32 = prompt
        .strip_prefix("You are generator agent ")
        .and_then(|rest| rest.split('.').next())
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0);
    let seed = options.seed.unwrap_or_default();
    let index = (0..max_rollouts)
        .find(|i| derive_seed(problem, generator, *i) == seed)
        .unwrap_or(u32::MAX);
    (generator, index)
}

/// Generator 1 gets rollout 1 wrong; every other rollout is correct
pub fn mixed_generator() -> Arc<ScriptedLlm> {
    ScriptedLlm::new("generator", |prompt, options| {
        let plan = match rollout_of(prompt, options, PROBLEM, 3) {
            (1, 1) => WRONG_PLAN,
            _ => CORRECT_PLAN,
        };
        Ok(plan.to_string())
    })
}

pub fn critic_verdict() -> String {
    format!(r#"{{"rationale": "Both candidates agree on Newton's second law.", "plan": {}}}"#, CORRECT_PLAN)
}

pub struct Harness {
    pub trainer: Trainer,
    pub experience: Arc<dyn ExperienceService>,
    pub event_bus: Arc<EventBus>,
    pub generator: Arc<ScriptedLlm>,
    pub critic: Arc<ScriptedLlm>,
    pub distiller: Arc<ScriptedLlm>,
}

pub fn spec(mode: ExecutionMode) -> PraxisConfigSpec {
    let mut spec = PraxisConfigSpec::default();
    spec.training.epochs = 1;
    spec.training.num_generators = 2;
    spec.training.rollouts_per_generator = 3;
    spec.training.generator_execution = mode;
    spec.training.rollout_execution = mode;
    spec.retrieval.enabled = false;
    spec
}

pub fn harness(spec: &PraxisConfigSpec, generator: Arc<ScriptedLlm>, critic: Arc<ScriptedLlm>) -> Harness {
    harness_with_repository(spec, generator, critic, Arc::new(InMemoryExperienceRepository::new()))
}

pub fn harness_with_repository(
    spec: &PraxisConfigSpec,
    generator: Arc<ScriptedLlm>,
    critic: Arc<ScriptedLlm>,
    repository: Arc<dyn ExperienceRepository>,
) -> Harness {
    build_harness(spec, generator, critic, repository, Arc::new(EventBus::with_default_capacity()), None)
}

pub fn build_harness(
    spec: &PraxisConfigSpec,
    generator: Arc<ScriptedLlm>,
    critic: Arc<ScriptedLlm>,
    repository: Arc<dyn ExperienceRepository>,
    event_bus: Arc<EventBus>,
    retriever: Option<Arc<SemanticRetriever>>,
) -> Harness {
    let experience: Arc<dyn ExperienceService> = Arc::new(StandardExperienceService::new(repository, event_bus.clone()));
    assemble(spec, generator, critic, experience, event_bus, retriever)
}

pub fn harness_with_service(
    spec: &PraxisConfigSpec,
    generator: Arc<ScriptedLlm>,
    critic: Arc<ScriptedLlm>,
    experience: Arc<dyn ExperienceService>,
) -> Harness {
    assemble(spec, generator, critic, experience, Arc::new(EventBus::with_default_capacity()), None)
}

fn assemble(
    spec: &PraxisConfigSpec,
    generator: Arc<ScriptedLlm>,
    critic: Arc<ScriptedLlm>,
    experience: Arc<dyn ExperienceService>,
    event_bus: Arc<EventBus>,
    retriever: Option<Arc<SemanticRetriever>>,
) -> Harness {
    let distiller = ScriptedLlm::replying("distiller", DISTILLED);

    let roles = RoleProviders::uniform(ScriptedLlm::failing("unused"))
        .with(ModelRole::Generator, generator.clone())
        .with(ModelRole::Critic, critic.clone())
        .with(ModelRole::Distiller, distiller.clone());

    let trainer = Trainer::from_config(
        spec,
        &roles,
        experience.clone(),
        retriever,
        Some(Arc::new(FormulaAnswerComputer)),
        event_bus.clone(),
    )
    .expect("trainer wiring");

    Harness {
        trainer,
        experience,
        event_bus,
        generator,
        critic,
        distiller,
    }
}

/// Refuses every batch aimed at the shared library and applies the rest
pub struct ReadOnlyShared {
    inner: StandardExperienceService,
}

impl ReadOnlyShared {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: StandardExperienceService::new(
                Arc::new(InMemoryExperienceRepository::new()),
                Arc::new(EventBus::with_default_capacity()),
            ),
        })
    }
}

#[async_trait]
impl ExperienceService for ReadOnlyShared {
    async fn load(&self, owners: &[ExperienceOwner]) -> Result<(), LibraryError> {
        self.inner.load(owners).await
    }

    fn snapshot(&self, owner: ExperienceOwner) -> ExperienceLibrary {
        self.inner.snapshot(owner)
    }

    async fn commit(&self, mut changes: PendingChanges) -> Result<CommitReport, LibraryError> {
        let (shared, rest): (Vec<LibraryBatch>, Vec<LibraryBatch>) = changes
            .batches
            .into_iter()
            .partition(|b| b.owner == ExperienceOwner::Shared);
        changes.batches = rest;
        let mut report = self.inner.commit(changes).await?;
        report.rejected.extend(shared.into_iter().map(|batch| RejectedBatch {
            owner: batch.owner,
            source: batch.source,
            reason: "library is read-only".to_string(),
        }));
        Ok(report)
    }

    async fn checkpoint(&self, epoch: u32) -> Result<(), LibraryError> {
        self.inner.checkpoint(epoch).await
    }

    async fn restore_checkpoint(&self, epoch: u32) -> Result<usize, LibraryError> {
        self.inner.restore_checkpoint(epoch).await
    }
}

pub fn problem() -> Problem {
    Problem::new("velocity", PROBLEM, Some("25".to_string()))
}
