// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Multi-agent scaffold generation.
//!
//! `num_generators` agents each sample `rollouts_per_generator` candidate
//! plans for a problem. Every agent sees the shared experience library plus
//! its own. Rollouts are keyed by `(generator, index)` and carry a seed
//! derived from the problem text, so the same mocked model yields the same
//! groups whichever execution mode is configured.

use praxis_cortex::application::ExperienceService;
use praxis_cortex::{ExperienceId, ExperienceLibrary, ExperienceOwner};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::fanout::{fan_out, fan_out_with_timeout, ExecutionMode};
use crate::domain::answer::Problem;
use crate::domain::config::TrainingConfig;
use crate::domain::llm::{GenerationOptions, LLMProvider};
use crate::domain::rollout::{FailedRollout, Rollout, RolloutFailure, RolloutGroup, ShownExperiences};
use crate::infrastructure::plan_parser::parse_plan;
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptKind, PromptTemplateEngine};

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub num_generators: u32,
    pub rollouts_per_generator: u32,
    pub generator_execution: ExecutionMode,
    pub rollout_execution: ExecutionMode,
    pub temperature: f32,
    pub max_prior_items: usize,
    pub rollout_timeout: Duration,
}

impl From<&TrainingConfig> for GeneratorSettings {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            num_generators: config.num_generators,
            rollouts_per_generator: config.rollouts_per_generator,
            generator_execution: config.generator_execution,
            rollout_execution: config.rollout_execution,
            temperature: config.generator_temperature,
            max_prior_items: config.max_prior_items,
            rollout_timeout: config.rollout_timeout,
        }
    }
}

/// Sampling seed for one rollout; stable across runs and execution modes
pub fn derive_seed(problem: &str, generator: u32, index: u32) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(problem.as_bytes());
    hasher.update(&generator.to_le_bytes());
    hasher.update(&index.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

/// Short hash of a prompt for correlating debug logs
pub(crate) fn prompt_fingerprint(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    hex::encode(&digest[..6])
}

/// Bulleted prior from one or more libraries, plus the ids that were shown
pub(crate) fn render_prior(sections: &[(&str, &ExperienceLibrary)], max_items: usize) -> (String, ShownExperiences) {
    let mut text = Vec::new();
    let mut shown = Vec::new();
    for (title, library) in sections {
        let top = library.top(max_items);
        if top.is_empty() {
            continue;
        }
        text.push(format!("{}:", title));
        text.extend(top.iter().map(|e| format!("- {}", e.content)));
        shown.push((library.owner(), top.iter().map(|e| e.id).collect::<Vec<ExperienceId>>()));
    }
    (text.join("\n"), shown)
}

pub struct ScaffoldGenerator {
    llm: Arc<dyn LLMProvider>,
    templates: Arc<PromptTemplateEngine>,
    experience: Arc<dyn ExperienceService>,
    settings: GeneratorSettings,
}

impl ScaffoldGenerator {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        templates: Arc<PromptTemplateEngine>,
        experience: Arc<dyn ExperienceService>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            llm,
            templates,
            experience,
            settings,
        }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// One [`RolloutGroup`] per generator, ordered by generator id
    pub async fn generate_group(&self, problem: &Problem, knowledge: &str) -> Vec<RolloutGroup> {
        let generators: Vec<u32> = (1..=self.settings.num_generators).collect();
        let groups = fan_out(self.settings.generator_execution, generators, |generator| {
            self.generate_for(generator, problem, knowledge)
        })
        .await;

        let produced: usize = groups.iter().map(|g| g.len()).sum();
        let failed: usize = groups.iter().map(|g| g.failures.len()).sum();
        info!(
            problem_id = %problem.id,
            rollouts = produced,
            failed,
            "Generated rollout groups"
        );
        groups
    }

    async fn generate_for(&self, generator: u32, problem: &Problem, knowledge: &str) -> RolloutGroup {
        let shared = self.experience.snapshot(ExperienceOwner::Shared);
        let own = self.experience.snapshot(ExperienceOwner::Generator(generator));
        let (prior, experiences_shown) = render_prior(
            &[("Shared lessons", &shared), ("Your own lessons", &own)],
            self.settings.max_prior_items,
        );

        let context = PromptContext::new()
            .problem(problem.text.as_str())
            .knowledge(knowledge)
            .experience(prior)
            .extra("generator", generator);

        let prompt = match self.templates.render(PromptKind::Generation, &context) {
            Ok(prompt) => prompt,
            Err(e) => {
                warn!(generator, "Failed to render generation prompt: {:#}", e);
                let failures = (0..self.settings.rollouts_per_generator)
                    .map(|index| FailedRollout {
                        generator,
                        index,
                        failure: RolloutFailure::Prompt(e.to_string()),
                    })
                    .collect();
                return RolloutGroup {
                    generator,
                    rollouts: Vec::new(),
                    failures,
                    experiences_shown,
                };
            }
        };
        debug!(generator, fingerprint = %prompt_fingerprint(&prompt), "Generation prompt:\n{}", prompt);

        let indices: Vec<u32> = (0..self.settings.rollouts_per_generator).collect();
        let outcomes = fan_out_with_timeout(
            self.settings.rollout_execution,
            indices.clone(),
            self.settings.rollout_timeout,
            |index| self.generate_rollout(generator, index, &problem.text, &prompt),
        )
        .await;

        let mut rollouts = Vec::new();
        let mut failures = Vec::new();
        for (index, outcome) in indices.into_iter().zip(outcomes) {
            match outcome {
                Ok(Ok(rollout)) => rollouts.push(rollout),
                Ok(Err(failure)) => failures.push(failure),
                Err(timeout) => {
                    warn!(generator, index, "Rollout abandoned: {}", timeout);
                    metrics::counter!("praxis_rollouts_total", "outcome" => "timeout").increment(1);
                    failures.push(FailedRollout {
                        generator,
                        index,
                        failure: RolloutFailure::Timeout(timeout.to_string()),
                    });
                }
            }
        }

        RolloutGroup {
            generator,
            rollouts,
            failures,
            experiences_shown,
        }
    }

    async fn generate_rollout(
        &self,
        generator: u32,
        index: u32,
        problem_text: &str,
        prompt: &str,
    ) -> Result<Rollout, FailedRollout> {
        let seed = derive_seed(problem_text, generator, index);
        let options = GenerationOptions::with_temperature(self.settings.temperature)
            .seed(seed)
            .json_output();

        let response = self.llm.generate(prompt, &options).await.map_err(|e| {
            warn!(generator, index, "Generation call failed: {}", e);
            metrics::counter!("praxis_rollouts_total", "outcome" => "model_failure").increment(1);
            FailedRollout {
                generator,
                index,
                failure: RolloutFailure::Model(e.to_string()),
            }
        })?;

        match parse_plan(&response.text) {
            Ok(plan) => {
                debug!(generator, index, target = plan.target_variable(), "Parsed rollout plan");
                metrics::counter!("praxis_rollouts_total", "outcome" => "ok").increment(1);
                Ok(Rollout {
                    generator,
                    index,
                    seed,
                    plan,
                })
            }
            Err(e) => {
                warn!(generator, index, "Dropping unparseable rollout: {}", e);
                debug!(generator, index, "Unparseable response:\n{}", response.text);
                metrics::counter!("praxis_rollout_parse_failures_total").increment(1);
                metrics::counter!("praxis_rollouts_total", "outcome" => "parse_failure").increment(1);
                Err(FailedRollout {
                    generator,
                    index,
                    failure: RolloutFailure::Parse(e.to_string()),
                })
            }
        }
    }
}
