// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the Cortex bounded context
//! Published for observability whenever a library or the knowledge base changes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::experience::{ExperienceId, ExperienceOwner};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CortexEvent {
    /// A distillation batch was applied to a library
    ExperienceBatchApplied {
        owner: ExperienceOwner,
        added: Vec<ExperienceId>,
        modified: Vec<ExperienceId>,
        deleted: Vec<ExperienceId>,
        library_size: usize,
        timestamp: DateTime<Utc>,
    },

    /// A batch was rejected and the library left untouched
    ExperienceBatchRejected {
        owner: ExperienceOwner,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Usage counters were updated after a training step
    ExperienceUsageRecorded {
        owner: ExperienceOwner,
        experiences: usize,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// All libraries were written to an epoch checkpoint
    LibrariesCheckpointed {
        epoch: u32,
        owners: Vec<ExperienceOwner>,
        timestamp: DateTime<Utc>,
    },

    /// New rules were appended to the knowledge base
    KnowledgeAppended {
        rules: usize,
        newly_embedded: usize,
        timestamp: DateTime<Utc>,
    },

    /// Retrieval ran on the lexical fallback because embeddings were unavailable
    RetrievalDegraded {
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl CortexEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            CortexEvent::ExperienceBatchApplied { .. } => "experience_batch_applied",
            CortexEvent::ExperienceBatchRejected { .. } => "experience_batch_rejected",
            CortexEvent::ExperienceUsageRecorded { .. } => "experience_usage_recorded",
            CortexEvent::LibrariesCheckpointed { .. } => "libraries_checkpointed",
            CortexEvent::KnowledgeAppended { .. } => "knowledge_appended",
            CortexEvent::RetrievalDegraded { .. } => "retrieval_degraded",
        }
    }
}
