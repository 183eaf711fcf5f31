// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository interfaces for Cortex bounded context
//! Defines the contracts for experience library and knowledge base storage

use async_trait::async_trait;

use crate::domain::{ExperienceLibrary, ExperienceOwner, KnowledgeEntry, LibraryError};

/// Durable storage for experience libraries, one record per owner
#[async_trait]
pub trait ExperienceRepository: Send + Sync {
    /// Load an owner's library. `Ok(None)` means it was never saved;
    /// unreadable or inconsistent data is `LibraryError::Corrupted`.
    async fn load(&self, owner: ExperienceOwner) -> Result<Option<ExperienceLibrary>, LibraryError>;

    /// Replace the stored library for its owner
    async fn save(&self, library: &ExperienceLibrary) -> Result<(), LibraryError>;

    /// Write a full snapshot of the given libraries for an epoch boundary
    async fn checkpoint(&self, epoch: u32, libraries: &[ExperienceLibrary]) -> Result<(), LibraryError>;

    /// Load a previously written epoch checkpoint
    async fn load_checkpoint(
        &self,
        epoch: u32,
        owner: ExperienceOwner,
    ) -> Result<Option<ExperienceLibrary>, LibraryError>;
}

/// Ordered, append-only knowledge base
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    /// Load every entry in insertion order
    async fn load_all(&self) -> anyhow::Result<Vec<KnowledgeEntry>>;

    /// Append entries after the existing ones
    async fn append(&self, entries: &[KnowledgeEntry]) -> anyhow::Result<()>;
}
