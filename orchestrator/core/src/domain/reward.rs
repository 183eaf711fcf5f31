// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reward statistics, the distillation gate, and the per-step phase machine.

use serde::{Deserialize, Serialize};

/// Default spread above which a group is worth learning from
pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardStats {
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl RewardStats {
    pub fn from_rewards(rewards: &[f64]) -> Self {
        if rewards.is_empty() {
            return Self {
                count: 0,
                mean: 0.0,
                std_dev: 0.0,
            };
        }
        let n = rewards.len() as f64;
        let mean = rewards.iter().sum::<f64>() / n;
        let variance = rewards.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        Self {
            count: rewards.len(),
            mean,
            std_dev: variance.sqrt(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DistillationPolicy {
    /// Distill only when rewards within the group disagree
    #[default]
    VarianceGated,
    /// Distill after every evaluated group
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistillationGate {
    pub policy: DistillationPolicy,
    pub threshold: f64,
}

impl Default for DistillationGate {
    fn default() -> Self {
        Self {
            policy: DistillationPolicy::VarianceGated,
            threshold: DEFAULT_VARIANCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Distill { stats: RewardStats },
    Skip { stats: RewardStats },
}

impl GateDecision {
    pub fn should_distill(&self) -> bool {
        matches!(self, GateDecision::Distill { .. })
    }

    pub fn stats(&self) -> RewardStats {
        match self {
            GateDecision::Distill { stats } | GateDecision::Skip { stats } => *stats,
        }
    }
}

impl DistillationGate {
    pub fn new(policy: DistillationPolicy, threshold: f64) -> Self {
        Self { policy, threshold }
    }

    pub fn decide(&self, rewards: &[f64]) -> GateDecision {
        let stats = RewardStats::from_rewards(rewards);
        if stats.count == 0 {
            return GateDecision::Skip { stats };
        }
        match self.policy {
            DistillationPolicy::Always => GateDecision::Distill { stats },
            DistillationPolicy::VarianceGated if stats.std_dev > self.threshold => GateDecision::Distill { stats },
            DistillationPolicy::VarianceGated => GateDecision::Skip { stats },
        }
    }
}

/// Where one analysed group is in a training step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepPhase {
    RolloutsCollected,
    Fused,
    Evaluated,
    LowVarianceSkip,
    HighVarianceDistill,
    Applied,
    Done,
}

impl StepPhase {
    pub fn can_transition_to(&self, next: StepPhase) -> bool {
        use StepPhase::*;
        matches!(
            (self, next),
            (RolloutsCollected, Fused)
                | (Fused, Evaluated)
                | (Evaluated, LowVarianceSkip)
                | (Evaluated, HighVarianceDistill)
                | (LowVarianceSkip, Done)
                | (HighVarianceDistill, Applied)
                | (Applied, Done)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid step transition {from:?} -> {to:?}")]
pub struct PhaseError {
    pub from: StepPhase,
    pub to: StepPhase,
}

#[derive(Debug, Clone)]
pub struct PhaseTracker {
    phase: StepPhase,
    history: Vec<StepPhase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            phase: StepPhase::RolloutsCollected,
            history: vec![StepPhase::RolloutsCollected],
        }
    }

    pub fn phase(&self) -> StepPhase {
        self.phase
    }

    pub fn history(&self) -> &[StepPhase] {
        &self.history
    }

    pub fn advance(&mut self, next: StepPhase) -> Result<(), PhaseError> {
        if !self.phase.can_transition_to(next) {
            return Err(PhaseError { from: self.phase, to: next });
        }
        tracing::trace!("step phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// Evaluated → skip/distill according to the gate decision
    pub fn gate(&mut self, decision: &GateDecision) -> Result<(), PhaseError> {
        self.advance(if decision.should_distill() {
            StepPhase::HighVarianceDistill
        } else {
            StepPhase::LowVarianceSkip
        })
    }
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}
