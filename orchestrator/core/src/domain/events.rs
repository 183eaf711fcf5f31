// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use praxis_cortex::ExperienceOwner;
use serde::{Deserialize, Serialize};

/// Events emitted by the training loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrainingEvent {
    EpochStarted {
        epoch: u32,
        problems: usize,
        started_at: DateTime<Utc>,
    },
    StepCompleted {
        epoch: u32,
        problem_id: String,
        fused_rewards: Vec<f64>,
        rollouts: usize,
        failed_rollouts: usize,
        completed_at: DateTime<Utc>,
    },
    ProblemSkipped {
        epoch: u32,
        problem_id: String,
        reason: String,
        skipped_at: DateTime<Utc>,
    },
    FusionDegraded {
        problem_id: String,
        generator: u32,
        reason: String,
        degraded_at: DateTime<Utc>,
    },
    DistillationApplied {
        problem_id: String,
        owner: ExperienceOwner,
        operations: usize,
        applied_at: DateTime<Utc>,
    },
    DistillationSkipped {
        problem_id: String,
        owner: ExperienceOwner,
        std_dev: f64,
        skipped_at: DateTime<Utc>,
    },
    DistillationRejected {
        problem_id: String,
        owner: ExperienceOwner,
        reason: String,
        rejected_at: DateTime<Utc>,
    },
    CheckpointWritten {
        epoch: u32,
        written_at: DateTime<Utc>,
    },
    EpochCompleted {
        epoch: u32,
        accuracy: f64,
        completed_at: DateTime<Utc>,
    },
}

impl TrainingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            TrainingEvent::EpochStarted { .. } => "epoch_started",
            TrainingEvent::StepCompleted { .. } => "step_completed",
            TrainingEvent::ProblemSkipped { .. } => "problem_skipped",
            TrainingEvent::FusionDegraded { .. } => "fusion_degraded",
            TrainingEvent::DistillationApplied { .. } => "distillation_applied",
            TrainingEvent::DistillationSkipped { .. } => "distillation_skipped",
            TrainingEvent::DistillationRejected { .. } => "distillation_rejected",
            TrainingEvent::CheckpointWritten { .. } => "checkpoint_written",
            TrainingEvent::EpochCompleted { .. } => "epoch_completed",
        }
    }
}
