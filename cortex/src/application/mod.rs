// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::CortexEvent;

pub mod experience_service;
pub mod retriever;

pub use experience_service::{
    CommitReport, ExperienceService, LibraryBatch, PendingChanges, RejectedBatch, StandardExperienceService,
    UsageRecord,
};
pub use retriever::{RetrievalMode, RetrievalOutcome, SemanticRetriever};

/// Event bus trait for publishing cortex domain events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: CortexEvent) -> Result<()>;
}

/// Event bus that drops every event; for tools that only need the stores
pub struct NullEventBus;

#[async_trait]
impl EventBus for NullEventBus {
    async fn publish(&self, _event: CortexEvent) -> Result<()> {
        Ok(())
    }
}
