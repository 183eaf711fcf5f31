// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod fanout;
pub mod generator;
pub mod fusion;
pub mod evaluator;
pub mod distillation;
pub mod training;

// Re-export the use cases for convenience
pub use distillation::{Attempt, Distillation, DistillationError, ExperienceDistiller};
pub use evaluator::{Comparison, ComparisonMethod, Evaluation, RewardEvaluator};
pub use fanout::{fan_out, fan_out_with_timeout, ExecutionMode, FanOutError};
pub use fusion::{merge_candidates, CriticFusion};
pub use generator::ScaffoldGenerator;
pub use training::{EpochReport, SolveOutcome, StepOutcome, StepReport, Trainer, TrainingReport};
