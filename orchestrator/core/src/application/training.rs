// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The training loop.
//!
//! One step per problem:
//!
//! ```text
//! retrieve → generate groups → fuse + score each group
//!          → gate each generator group on rollout rewards
//!          → gate the critic on fused rewards
//!          → distill where the gate fires → commit once
//! ```
//!
//! Library edits and usage counts from a step are collected in one
//! [`PendingChanges`] and committed after every model call for the step has
//! finished, so no generator ever sees a library change mid-step. Libraries
//! are checkpointed at the end of every epoch.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use praxis_cortex::application::{ExperienceService, PendingChanges, RetrievalMode, SemanticRetriever};
use praxis_cortex::ExperienceOwner;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::application::distillation::{Attempt, DistillationSettings, ExperienceDistiller};
use crate::application::evaluator::{EvaluationSettings, RewardEvaluator};
use crate::application::fanout::{fan_out, ExecutionMode};
use crate::application::fusion::{CriticFusion, FusionSettings};
use crate::application::generator::{GeneratorSettings, ScaffoldGenerator};
use crate::domain::answer::{AnswerComputer, DatasetLoader, Problem};
use crate::domain::comparison::{exact_equivalent, numeric_equivalent};
use crate::domain::config::PraxisConfigSpec;
use crate::domain::events::TrainingEvent;
use crate::domain::llm::ModelRole;
use crate::domain::reward::{DistillationGate, GateDecision, PhaseTracker, StepPhase};
use crate::domain::rollout::{FusedResult, FusionMethod, RolloutGroup, ScoredRollout};
use crate::infrastructure::answer_computer::ModelAnswerComputer;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::llm::RoleProviders;
use crate::infrastructure::prompt_template_engine::PromptTemplateEngine;

const NO_KNOWLEDGE: &str = "(no relevant rules)";

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedSummary {
    pub generator: u32,
    pub method: FusionMethod,
    pub answer: Option<String>,
    pub reward: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DistillationOutcome {
    Skipped,
    Applied { operations: usize },
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistillationRecord {
    pub owner: ExperienceOwner,
    pub std_dev: f64,
    #[serde(flatten)]
    pub outcome: DistillationOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub problem_id: String,
    pub epoch: u32,
    pub retrieval_mode: Option<RetrievalMode>,
    pub rules_retrieved: usize,
    pub rollouts: usize,
    pub failed_rollouts: usize,
    pub fused: Vec<FusedSummary>,
    pub distillations: Vec<DistillationRecord>,
    /// Phase history of every analysed group, keyed by library owner
    pub phases: Vec<(ExperienceOwner, Vec<StepPhase>)>,
}

impl StepReport {
    pub fn correct(&self) -> usize {
        self.fused.iter().filter(|f| f.reward == Some(1.0)).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedProblem {
    pub problem_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Completed(StepReport),
    Skipped(SkippedProblem),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    pub epoch: u32,
    pub problems: usize,
    pub fused_total: usize,
    pub fused_correct: usize,
    /// Share of fused plans whose answer matched ground truth
    pub accuracy: f64,
    pub distillations_applied: usize,
    pub distillations_skipped: usize,
    pub distillations_rejected: usize,
    pub skipped: Vec<SkippedProblem>,
    pub steps: Vec<StepReport>,
}

impl EpochReport {
    fn new(epoch: u32, problems: usize) -> Self {
        Self {
            epoch,
            problems,
            fused_total: 0,
            fused_correct: 0,
            accuracy: 0.0,
            distillations_applied: 0,
            distillations_skipped: 0,
            distillations_rejected: 0,
            skipped: Vec::new(),
            steps: Vec::new(),
        }
    }

    fn record(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Completed(step) => {
                self.fused_total += step.fused.len();
                self.fused_correct += step.correct();
                for record in &step.distillations {
                    match record.outcome {
                        DistillationOutcome::Skipped => self.distillations_skipped += 1,
                        DistillationOutcome::Applied { .. } => self.distillations_applied += 1,
                        DistillationOutcome::Rejected { .. } => self.distillations_rejected += 1,
                    }
                }
                self.steps.push(step);
            }
            StepOutcome::Skipped(skipped) => self.skipped.push(skipped),
        }
        self.accuracy = if self.fused_total == 0 {
            0.0
        } else {
            self.fused_correct as f64 / self.fused_total as f64
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub epochs: Vec<EpochReport>,
}

impl TrainingReport {
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize training report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write training report {:?}", path))
    }
}

/// Inference result for one problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub problem_id: String,
    /// Plurality answer across the fused plans
    pub answer: Option<String>,
    pub votes: usize,
    pub fused: Vec<FusedResult>,
    /// Present when the problem carried ground truth
    pub reward: Option<f64>,
}

// ============================================================================
// Trainer
// ============================================================================

#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub epochs: u32,
    pub num_generators: u32,
    pub generator_execution: ExecutionMode,
    pub rollout_execution: ExecutionMode,
    pub retrieval_enabled: bool,
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub answer_tolerance: f64,
}

impl From<&PraxisConfigSpec> for TrainerSettings {
    fn from(spec: &PraxisConfigSpec) -> Self {
        Self {
            epochs: spec.training.epochs,
            num_generators: spec.training.num_generators,
            generator_execution: spec.training.generator_execution,
            rollout_execution: spec.training.rollout_execution,
            retrieval_enabled: spec.retrieval.enabled,
            top_k: spec.retrieval.top_k,
            similarity_threshold: spec.retrieval.similarity_threshold,
            answer_tolerance: spec.training.answer_tolerance,
        }
    }
}

/// A generator group after fusion and scoring
struct ScoredGroup<'a> {
    group: &'a RolloutGroup,
    scored: Vec<ScoredRollout>,
    fused: Option<FusedResult>,
}

pub struct Trainer {
    settings: TrainerSettings,
    retriever: Option<Arc<SemanticRetriever>>,
    generator: ScaffoldGenerator,
    fusion: CriticFusion,
    evaluator: RewardEvaluator,
    distiller: ExperienceDistiller,
    experience: Arc<dyn ExperienceService>,
    event_bus: Arc<EventBus>,
    gate: DistillationGate,
}

impl Trainer {
    /// Wire every component from configuration. `answer_computer` replaces the
    /// model-backed calculator when given.
    pub fn from_config(
        spec: &PraxisConfigSpec,
        roles: &RoleProviders,
        experience: Arc<dyn ExperienceService>,
        retriever: Option<Arc<SemanticRetriever>>,
        answer_computer: Option<Arc<dyn AnswerComputer>>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        let templates = Arc::new(PromptTemplateEngine::new()?);
        let answer_computer = answer_computer.unwrap_or_else(|| {
            Arc::new(ModelAnswerComputer::new(roles.get(ModelRole::Calculator), templates.clone()))
        });

        Ok(Self {
            settings: TrainerSettings::from(spec),
            retriever,
            generator: ScaffoldGenerator::new(
                roles.get(ModelRole::Generator),
                templates.clone(),
                experience.clone(),
                GeneratorSettings::from(&spec.training),
            ),
            fusion: CriticFusion::new(
                roles.get(ModelRole::Critic),
                templates.clone(),
                experience.clone(),
                event_bus.clone(),
                FusionSettings::from(&spec.training),
            ),
            evaluator: RewardEvaluator::new(
                answer_computer,
                roles.get(ModelRole::Comparator),
                templates.clone(),
                EvaluationSettings::from(&spec.training),
            ),
            distiller: ExperienceDistiller::new(
                roles.get(ModelRole::Distiller),
                templates,
                experience.clone(),
                DistillationSettings::from(&spec.training.distillation),
            ),
            experience,
            event_bus,
            gate: DistillationGate::new(
                spec.training.distillation.policy,
                spec.training.distillation.variance_threshold,
            ),
        })
    }

    pub fn settings(&self) -> &TrainerSettings {
        &self.settings
    }

    /// Load every library the configured agents use
    pub async fn load_libraries(&self) -> Result<()> {
        self.experience
            .load(&ExperienceOwner::all(self.settings.num_generators))
            .await
            .context("Failed to load experience libraries")
    }

    /// Run every epoch over the dataset
    pub async fn train(&self, dataset: &dyn DatasetLoader) -> Result<TrainingReport> {
        let started_at = Utc::now();
        let problems = with_ids(dataset.load().await.context("Failed to load dataset")?);
        self.load_libraries().await?;

        let mut epochs = Vec::with_capacity(self.settings.epochs as usize);
        for epoch in 1..=self.settings.epochs {
            epochs.push(self.run_epoch(epoch, &problems).await?);
        }

        Ok(TrainingReport {
            started_at,
            finished_at: Utc::now(),
            epochs,
        })
    }

    pub async fn run_epoch(&self, epoch: u32, problems: &[Problem]) -> Result<EpochReport> {
        info!(epoch, problems = problems.len(), "Starting epoch");
        self.event_bus.publish_training_event(TrainingEvent::EpochStarted {
            epoch,
            problems: problems.len(),
            started_at: Utc::now(),
        });

        let mut report = EpochReport::new(epoch, problems.len());
        for problem in problems {
            let span = info_span!("training_step", problem_id = %problem.id, epoch);
            let outcome = self.train_step(epoch, problem).instrument(span).await?;
            report.record(outcome);
        }

        self.experience
            .checkpoint(epoch)
            .await
            .with_context(|| format!("Failed to checkpoint libraries for epoch {}", epoch))?;
        self.event_bus.publish_training_event(TrainingEvent::CheckpointWritten {
            epoch,
            written_at: Utc::now(),
        });
        self.event_bus.publish_training_event(TrainingEvent::EpochCompleted {
            epoch,
            accuracy: report.accuracy,
            completed_at: Utc::now(),
        });
        info!(
            epoch,
            accuracy = report.accuracy,
            skipped = report.skipped.len(),
            distilled = report.distillations_applied,
            "Epoch complete"
        );
        Ok(report)
    }

    async fn retrieve(&self, problem: &Problem) -> (String, Option<RetrievalMode>, usize) {
        match self.retriever.as_ref().filter(|_| self.settings.retrieval_enabled) {
            Some(retriever) => {
                let outcome = retriever
                    .retrieve(&problem.text, self.settings.top_k, self.settings.similarity_threshold)
                    .await;
                (outcome.render(), Some(outcome.mode), outcome.rules.len())
            }
            None => (NO_KNOWLEDGE.to_string(), None, 0),
        }
    }

    fn skip(&self, epoch: u32, problem: &Problem, reason: String) -> StepOutcome {
        warn!(problem_id = %problem.id, "Skipping problem: {}", reason);
        metrics::counter!("praxis_problems_skipped_total").increment(1);
        self.event_bus.publish_training_event(TrainingEvent::ProblemSkipped {
            epoch,
            problem_id: problem.id.clone(),
            reason: reason.clone(),
            skipped_at: Utc::now(),
        });
        StepOutcome::Skipped(SkippedProblem {
            problem_id: problem.id.clone(),
            reason,
        })
    }

    /// One full step. Errors are fatal to the run; a problem that cannot be
    /// worked on is returned as [`StepOutcome::Skipped`].
    pub async fn train_step(&self, epoch: u32, problem: &Problem) -> Result<StepOutcome> {
        let Some(truth) = problem.ground_truth.as_deref() else {
            return Ok(self.skip(epoch, problem, "no ground truth".to_string()));
        };

        let (knowledge, retrieval_mode, rules_retrieved) = self.retrieve(problem).await;
        let groups = self.generator.generate_group(problem, &knowledge).await;

        let rollouts: usize = groups.iter().map(|g| g.len()).sum();
        let failed_rollouts: usize = groups.iter().map(|g| g.failures.len()).sum();
        if rollouts == 0 {
            let model_failures: usize = groups.iter().map(|g| g.model_failures()).sum();
            if failed_rollouts > 0 && model_failures == failed_rollouts {
                let detail = groups
                    .iter()
                    .flat_map(|g| g.failures.iter())
                    .next()
                    .map(|f| format!("{:?}", f.failure))
                    .unwrap_or_default();
                error!(problem_id = %problem.id, failed_rollouts, "Every rollout failed at the model service");
                anyhow::bail!(
                    "Model service unavailable: all {} rollouts for '{}' failed ({})",
                    failed_rollouts,
                    problem.id,
                    detail
                );
            }
            let timeouts: usize = groups.iter().map(|g| g.timeouts()).sum();
            let reason = if timeouts > 0 {
                format!(
                    "none of {} rollouts produced a valid plan ({} timed out)",
                    failed_rollouts, timeouts
                )
            } else {
                format!("none of {} rollouts produced a valid plan", failed_rollouts)
            };
            return Ok(self.skip(epoch, problem, reason));
        }

        let mut trackers: Vec<(ExperienceOwner, PhaseTracker)> = Vec::new();

        // Fuse and score every group
        let group_refs: Vec<&RolloutGroup> = groups.iter().collect();
        let scored: Vec<ScoredGroup> = fan_out(self.settings.generator_execution, group_refs, |group| {
            self.fuse_and_score(problem, &knowledge, truth, group)
        })
        .await;

        // Per-generator gates on that generator's rollout rewards
        let mut records = Vec::new();
        let mut pending = PendingChanges::default();
        let mut distill_jobs: Vec<(ExperienceOwner, Vec<Attempt>, GateDecision)> = Vec::new();

        for entry in &scored {
            let owner = ExperienceOwner::Generator(entry.group.generator);
            let mut tracker = PhaseTracker::new();
            tracker.advance(StepPhase::Fused)?;
            tracker.advance(StepPhase::Evaluated)?;

            let rewards: Vec<f64> = entry.scored.iter().map(|s| s.reward).collect();
            let decision = self.gate.decide(&rewards);
            tracker.gate(&decision)?;
            trackers.push((owner, tracker));

            for score in &entry.scored {
                for (library, ids) in &entry.group.experiences_shown {
                    if !ids.is_empty() {
                        pending.push_usage(*library, ids.clone(), score.reward >= 1.0);
                    }
                }
            }

            if decision.should_distill() {
                let attempts = entry
                    .group
                    .rollouts
                    .iter()
                    .zip(&entry.scored)
                    .map(|(rollout, score)| Attempt {
                        label: format!("Attempt {}", rollout.index),
                        answer: score.answer.clone(),
                        reward: score.reward,
                        plan: rollout.plan.to_json_pretty(),
                    })
                    .collect();
                distill_jobs.push((owner, attempts, decision));
            } else {
                records.push(self.skipped_record(problem, owner, &decision));
            }
        }

        // Critic gate on fused rewards across generators
        let fused: Vec<&FusedResult> = scored.iter().filter_map(|s| s.fused.as_ref()).collect();
        if !fused.is_empty() {
            let mut tracker = PhaseTracker::new();
            tracker.advance(StepPhase::Fused)?;
            tracker.advance(StepPhase::Evaluated)?;
            let rewards: Vec<f64> = fused.iter().filter_map(|f| f.reward).collect();
            let decision = self.gate.decide(&rewards);
            tracker.gate(&decision)?;
            trackers.push((ExperienceOwner::Critic, tracker));

            for result in &fused {
                if !result.critic_experiences.is_empty() {
                    pending.push_usage(
                        ExperienceOwner::Critic,
                        result.critic_experiences.clone(),
                        result.reward == Some(1.0),
                    );
                }
            }

            if decision.should_distill() {
                let attempts = fused
                    .iter()
                    .map(|f| Attempt {
                        label: format!("Fused plan of generator {} ({}; {})", f.generator, f.method.as_str(), f.rationale),
                        answer: f.answer.clone(),
                        reward: f.reward.unwrap_or(0.0),
                        plan: f.plan.to_json_pretty(),
                    })
                    .collect();
                distill_jobs.push((ExperienceOwner::Critic, attempts, decision));
            } else {
                records.push(self.skipped_record(problem, ExperienceOwner::Critic, &decision));
            }
        }

        let distilled = fan_out(self.settings.generator_execution, distill_jobs, |(owner, attempts, decision)| async move {
            let result = self.distiller.distill(owner, &problem.text, truth, &attempts).await;
            (owner, decision, result)
        })
        .await;

        // (proposer, std dev, operations, batch source)
        let mut staged: Vec<(ExperienceOwner, f64, usize, String)> = Vec::new();
        for (owner, decision, result) in distilled {
            let std_dev = decision.stats().std_dev;
            match result {
                Ok(distillation) => {
                    let operations = distillation.len();
                    let source = format!("{} epoch {} {}", problem.id, epoch, owner);
                    distillation.stage(owner, &mut pending, &source);
                    staged.push((owner, std_dev, operations, source));
                }
                Err(e) => records.push(self.rejected_record(problem, owner, std_dev, e.to_string())),
            }
        }

        // One write for the whole step
        let commit = self
            .experience
            .commit(pending)
            .await
            .with_context(|| format!("Failed to commit experience changes for '{}'", problem.id))?;

        // A proposal counts as rejected if any of its batches was, including
        // the lessons it routed to the shared library
        for (owner, std_dev, operations, source) in staged {
            let rejections: Vec<String> = commit
                .rejected_from(&source)
                .map(|r| format!("{} library: {}", r.owner, r.reason))
                .collect();
            if !rejections.is_empty() {
                records.push(self.rejected_record(problem, owner, std_dev, rejections.join("; ")));
                continue;
            }
            metrics::counter!("praxis_distillations_applied_total").increment(1);
            self.event_bus.publish_training_event(TrainingEvent::DistillationApplied {
                problem_id: problem.id.clone(),
                owner,
                operations,
                applied_at: Utc::now(),
            });
            records.push(DistillationRecord {
                owner,
                std_dev,
                outcome: DistillationOutcome::Applied { operations },
            });
        }

        records.sort_by_key(|r| r.owner);

        let mut phases = Vec::with_capacity(trackers.len());
        for (owner, mut tracker) in trackers {
            if tracker.phase() == StepPhase::HighVarianceDistill {
                tracker.advance(StepPhase::Applied)?;
            }
            tracker.advance(StepPhase::Done)?;
            phases.push((owner, tracker.history().to_vec()));
        }

        let fused_summaries: Vec<FusedSummary> = scored
            .iter()
            .filter_map(|s| s.fused.as_ref())
            .map(|f| FusedSummary {
                generator: f.generator,
                method: f.method,
                answer: f.answer.clone(),
                reward: f.reward,
            })
            .collect();

        self.event_bus.publish_training_event(TrainingEvent::StepCompleted {
            epoch,
            problem_id: problem.id.clone(),
            fused_rewards: fused_summaries.iter().filter_map(|f| f.reward).collect(),
            rollouts,
            failed_rollouts,
            completed_at: Utc::now(),
        });
        metrics::counter!("praxis_training_steps_total").increment(1);
        info!(
            rollouts,
            failed_rollouts,
            correct = fused_summaries.iter().filter(|f| f.reward == Some(1.0)).count(),
            fused = fused_summaries.len(),
            "Step complete"
        );

        Ok(StepOutcome::Completed(StepReport {
            problem_id: problem.id.clone(),
            epoch,
            retrieval_mode,
            rules_retrieved,
            rollouts,
            failed_rollouts,
            fused: fused_summaries,
            distillations: records,
            phases,
        }))
    }

    async fn fuse_and_score<'a>(
        &self,
        problem: &Problem,
        knowledge: &str,
        truth: &str,
        group: &'a RolloutGroup,
    ) -> ScoredGroup<'a> {
        let fused = self.fusion.fuse(problem, knowledge, group).await;

        let scored = fan_out(self.settings.rollout_execution, group.rollouts.iter().collect(), |rollout| async move {
            let evaluation = self.evaluator.evaluate(&rollout.plan, &problem.text, truth).await;
            ScoredRollout {
                generator: rollout.generator,
                index: rollout.index,
                answer: evaluation.answer,
                reward: evaluation.reward,
            }
        })
        .await;

        let fused = match fused {
            Some(mut result) => {
                let evaluation = self.evaluator.evaluate(&result.plan, &problem.text, truth).await;
                result.answer = evaluation.answer;
                result.reward = Some(evaluation.reward);
                Some(result)
            }
            None => None,
        };

        ScoredGroup { group, scored, fused }
    }

    fn skipped_record(&self, problem: &Problem, owner: ExperienceOwner, decision: &GateDecision) -> DistillationRecord {
        let std_dev = decision.stats().std_dev;
        metrics::counter!("praxis_distillations_skipped_total").increment(1);
        self.event_bus.publish_training_event(TrainingEvent::DistillationSkipped {
            problem_id: problem.id.clone(),
            owner,
            std_dev,
            skipped_at: Utc::now(),
        });
        DistillationRecord {
            owner,
            std_dev,
            outcome: DistillationOutcome::Skipped,
        }
    }

    fn rejected_record(&self, problem: &Problem, owner: ExperienceOwner, std_dev: f64, reason: String) -> DistillationRecord {
        self.event_bus.publish_training_event(TrainingEvent::DistillationRejected {
            problem_id: problem.id.clone(),
            owner,
            reason: reason.clone(),
            rejected_at: Utc::now(),
        });
        DistillationRecord {
            owner,
            std_dev,
            outcome: DistillationOutcome::Rejected { reason },
        }
    }

    /// Inference only: generate, fuse and vote, without touching libraries
    pub async fn solve(&self, problem: &Problem) -> Result<SolveOutcome> {
        let (knowledge, _, _) = self.retrieve(problem).await;
        let knowledge = knowledge.as_str();
        let groups = self.generator.generate_group(problem, knowledge).await;
        if groups.iter().all(|g| g.is_empty()) {
            let failed: usize = groups.iter().map(|g| g.failures.len()).sum();
            anyhow::bail!("No valid plan for '{}' ({} rollouts failed)", problem.id, failed);
        }

        let group_refs: Vec<&RolloutGroup> = groups.iter().collect();
        let fused: Vec<FusedResult> = fan_out(self.settings.generator_execution, group_refs, |group| async move {
            let mut result = self.fusion.fuse(problem, knowledge, group).await?;
            match self.evaluator.answer(&result.plan, &problem.text).await {
                Ok(answer) => result.answer = Some(answer),
                Err(e) => warn!(generator = result.generator, "Could not compute an answer: {}", e),
            }
            Some(result)
        })
        .await
        .into_iter()
        .flatten()
        .collect();

        let answers: Vec<&str> = fused.iter().filter_map(|f| f.answer.as_deref()).collect();
        let vote = plurality(&answers, self.settings.answer_tolerance);

        let reward = match (&vote, problem.ground_truth.as_deref()) {
            (Some((answer, _)), Some(truth)) => {
                let comparison = self.evaluator.compare(&problem.text, truth, answer).await;
                Some(if comparison.matched { 1.0 } else { 0.0 })
            }
            (None, Some(_)) => Some(0.0),
            _ => None,
        };

        Ok(SolveOutcome {
            problem_id: problem.id.clone(),
            answer: vote.as_ref().map(|(a, _)| a.clone()),
            votes: vote.map(|(_, n)| n).unwrap_or(0),
            fused,
            reward,
        })
    }
}

/// Give unnamed problems a stable positional id
pub fn with_ids(problems: Vec<Problem>) -> Vec<Problem> {
    problems
        .into_iter()
        .enumerate()
        .map(|(i, mut p)| {
            if p.id.trim().is_empty() {
                p.id = format!("problem_{}", i + 1);
            }
            p
        })
        .collect()
}

/// Most common answer, treating numerically or textually equivalent answers
/// as one; ties go to the earliest.
pub fn plurality(answers: &[&str], tolerance: f64) -> Option<(String, usize)> {
    let mut buckets: Vec<(&str, usize)> = Vec::new();
    for answer in answers {
        let same = |rep: &str| match numeric_equivalent(rep, answer, tolerance) {
            Some(matched) => matched,
            None => exact_equivalent(rep, answer),
        };
        match buckets.iter_mut().find(|(rep, _)| same(rep)) {
            Some((_, count)) => *count += 1,
            None => buckets.push((answer, 1)),
        }
    }
    let best = buckets.iter().map(|(_, n)| *n).max()?;
    buckets
        .into_iter()
        .find(|(_, n)| *n == best)
        .map(|(a, n)| (a.to_string(), n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plurality_groups_equivalent_answers() {
        let answers = ["25", "24", "25.0 m/s", "24"];
        assert_eq!(plurality(&answers, 1e-3), Some(("25".to_string(), 2)));
        assert_eq!(plurality(&["north", "North."], 1e-3), Some(("north".to_string(), 2)));
        assert_eq!(plurality(&[], 1e-3), None);
    }

    #[test]
    fn test_with_ids_fills_only_missing() {
        let problems = with_ids(vec![
            Problem::new("", "a", None),
            Problem::new("named", "b", None),
            Problem::new(" ", "c", None),
        ]);
        let ids: Vec<&str> = problems.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["problem_1", "named", "problem_3"]);
    }

    #[test]
    fn test_epoch_report_accuracy() {
        let mut report = EpochReport::new(1, 2);
        report.record(StepOutcome::Completed(StepReport {
            problem_id: "p1".into(),
            epoch: 1,
            retrieval_mode: None,
            rules_retrieved: 0,
            rollouts: 4,
            failed_rollouts: 0,
            fused: vec![
                FusedSummary {
                    generator: 1,
                    method: FusionMethod::Model,
                    answer: Some("25".into()),
                    reward: Some(1.0),
                },
                FusedSummary {
                    generator: 2,
                    method: FusionMethod::Deterministic,
                    answer: None,
                    reward: Some(0.0),
                },
            ],
            distillations: vec![DistillationRecord {
                owner: ExperienceOwner::Critic,
                std_dev: 0.5,
                outcome: DistillationOutcome::Applied { operations: 1 },
            }],
            phases: vec![],
        }));
        report.record(StepOutcome::Skipped(SkippedProblem {
            problem_id: "p2".into(),
            reason: "none of 4 rollouts produced a valid plan".into(),
        }));

        assert_eq!(report.accuracy, 0.5);
        assert_eq!(report.distillations_applied, 1);
        assert_eq!(report.skipped.len(), 1);
    }
}
