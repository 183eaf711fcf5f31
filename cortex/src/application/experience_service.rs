// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # ExperienceService — Library Ownership, Batched Mutation & Checkpoints
//!
//! The service owns the live copy of every experience library for a run.
//! Readers take cheap snapshots; writers never touch libraries directly.
//! Instead the training loop accumulates a [`PendingChanges`] value while a
//! step runs and hands it to [`ExperienceService::commit`] once every rollout,
//! fusion and evaluation for that step has finished. That gives exactly one
//! batched write per step, so concurrent generators never observe a library
//! changing underneath them.
//!
//! ## Batches
//!
//! Each [`LibraryBatch`] is the operation list from one distillation call for
//! one library and is applied atomically. A rejected batch is reported and
//! logged; it does not abort the rest of the commit.
//!
//! ## Failure surface
//!
//! Loading a corrupted library is fatal and propagates to the caller, as does
//! failing to persist a committed change. Silent data loss is not an option.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::EventBus;
use crate::domain::{
    BatchOutcome, CortexEvent, ExperienceId, ExperienceLibrary, ExperienceOperation, ExperienceOwner, LibraryError,
};
use crate::infrastructure::ExperienceRepository;

/// Operations from one distillation call, destined for one library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryBatch {
    pub owner: ExperienceOwner,
    pub operations: Vec<ExperienceOperation>,
    /// Free-form description of what produced the batch, for logs
    pub source: String,
}

/// Experiences that were shown to an agent for one scored attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub owner: ExperienceOwner,
    pub ids: Vec<ExperienceId>,
    pub success: bool,
}

/// Everything a training step wants to change, applied in one commit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PendingChanges {
    pub batches: Vec<LibraryBatch>,
    pub usage: Vec<UsageRecord>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty() && self.usage.is_empty()
    }

    pub fn push_batch(&mut self, owner: ExperienceOwner, operations: Vec<ExperienceOperation>, source: impl Into<String>) {
        if !operations.is_empty() {
            self.batches.push(LibraryBatch {
                owner,
                operations,
                source: source.into(),
            });
        }
    }

    pub fn push_usage(&mut self, owner: ExperienceOwner, ids: Vec<ExperienceId>, success: bool) {
        if !ids.is_empty() {
            self.usage.push(UsageRecord { owner, ids, success });
        }
    }
}

/// A batch the target library refused; nothing from it was applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedBatch {
    pub owner: ExperienceOwner,
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitReport {
    pub applied: Vec<(ExperienceOwner, BatchOutcome)>,
    pub rejected: Vec<RejectedBatch>,
    pub usage_updates: usize,
}

impl CommitReport {
    /// Rejections of the batches pushed under `source`
    pub fn rejected_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a RejectedBatch> + 'a {
        self.rejected.iter().filter(move |r| r.source == source)
    }
}

#[async_trait]
pub trait ExperienceService: Send + Sync {
    /// Load (or initialise empty) libraries for the given owners
    async fn load(&self, owners: &[ExperienceOwner]) -> Result<(), LibraryError>;

    /// Read-only copy of one library; empty if the owner is unknown
    fn snapshot(&self, owner: ExperienceOwner) -> ExperienceLibrary;

    /// Apply a step's pending changes and persist every touched library
    async fn commit(&self, changes: PendingChanges) -> Result<CommitReport, LibraryError>;

    /// Persist a snapshot of every library for an epoch boundary
    async fn checkpoint(&self, epoch: u32) -> Result<(), LibraryError>;

    /// Replace the live libraries with an epoch checkpoint
    async fn restore_checkpoint(&self, epoch: u32) -> Result<usize, LibraryError>;
}

pub struct StandardExperienceService {
    repository: Arc<dyn ExperienceRepository>,
    event_bus: Arc<dyn EventBus>,
    libraries: RwLock<BTreeMap<ExperienceOwner, ExperienceLibrary>>,
}

impl StandardExperienceService {
    pub fn new(repository: Arc<dyn ExperienceRepository>, event_bus: Arc<dyn EventBus>) -> Self {
        Self {
            repository,
            event_bus,
            libraries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn owners(&self) -> Vec<ExperienceOwner> {
        self.libraries.read().keys().copied().collect()
    }

    async fn publish(&self, event: CortexEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            warn!("Failed to publish cortex event: {}", e);
        }
    }
}

#[async_trait]
impl ExperienceService for StandardExperienceService {
    async fn load(&self, owners: &[ExperienceOwner]) -> Result<(), LibraryError> {
        let mut loaded = BTreeMap::new();
        for owner in owners {
            let library = match self.repository.load(*owner).await? {
                Some(library) => {
                    info!("Loaded experience library '{}' ({} entries)", owner, library.len());
                    library
                }
                None => ExperienceLibrary::new(*owner),
            };
            loaded.insert(*owner, library);
        }
        self.libraries.write().extend(loaded);
        Ok(())
    }

    fn snapshot(&self, owner: ExperienceOwner) -> ExperienceLibrary {
        self.libraries
            .read()
            .get(&owner)
            .cloned()
            .unwrap_or_else(|| ExperienceLibrary::new(owner))
    }

    async fn commit(&self, changes: PendingChanges) -> Result<CommitReport, LibraryError> {
        if changes.is_empty() {
            return Ok(CommitReport::default());
        }

        let mut report = CommitReport::default();
        let mut touched = BTreeSet::new();
        let mut events = Vec::new();

        {
            let mut libraries = self.libraries.write();

            for batch in &changes.batches {
                let library = libraries
                    .entry(batch.owner)
                    .or_insert_with(|| ExperienceLibrary::new(batch.owner));

                match library.apply_batch(&batch.operations) {
                    Ok(outcome) => {
                        metrics::counter!("praxis_experience_batches_total", "outcome" => "applied").increment(1);
                        if !outcome.is_noop() {
                            touched.insert(batch.owner);
                        }
                        info!(
                            owner = %batch.owner,
                            source = %batch.source,
                            added = outcome.added.len(),
                            modified = outcome.modified.len(),
                            deleted = outcome.deleted.len(),
                            "Applied experience batch"
                        );
                        events.push(CortexEvent::ExperienceBatchApplied {
                            owner: batch.owner,
                            added: outcome.added.clone(),
                            modified: outcome.modified.clone(),
                            deleted: outcome.deleted.clone(),
                            library_size: library.len(),
                            timestamp: Utc::now(),
                        });
                        report.applied.push((batch.owner, outcome));
                    }
                    Err(e) => {
                        metrics::counter!("praxis_experience_batches_total", "outcome" => "rejected").increment(1);
                        warn!(owner = %batch.owner, source = %batch.source, "Experience batch rejected: {}", e);
                        events.push(CortexEvent::ExperienceBatchRejected {
                            owner: batch.owner,
                            reason: e.to_string(),
                            timestamp: Utc::now(),
                        });
                        report.rejected.push(RejectedBatch {
                            owner: batch.owner,
                            source: batch.source.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            for usage in &changes.usage {
                if let Some(library) = libraries.get_mut(&usage.owner) {
                    let updated = library.record_usage(&usage.ids, usage.success);
                    if updated > 0 {
                        touched.insert(usage.owner);
                        report.usage_updates += updated;
                        events.push(CortexEvent::ExperienceUsageRecorded {
                            owner: usage.owner,
                            experiences: updated,
                            success: usage.success,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        }

        let to_save: Vec<ExperienceLibrary> = {
            let libraries = self.libraries.read();
            touched.iter().filter_map(|owner| libraries.get(owner).cloned()).collect()
        };
        for library in &to_save {
            self.repository.save(library).await?;
        }

        for event in events {
            self.publish(event).await;
        }

        Ok(report)
    }

    async fn checkpoint(&self, epoch: u32) -> Result<(), LibraryError> {
        let libraries: Vec<ExperienceLibrary> = self.libraries.read().values().cloned().collect();
        self.repository.checkpoint(epoch, &libraries).await?;
        self.publish(CortexEvent::LibrariesCheckpointed {
            epoch,
            owners: libraries.iter().map(|l| l.owner()).collect(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(())
    }

    async fn restore_checkpoint(&self, epoch: u32) -> Result<usize, LibraryError> {
        let owners = self.owners();
        let mut restored = Vec::new();
        for owner in owners {
            if let Some(library) = self.repository.load_checkpoint(epoch, owner).await? {
                restored.push(library);
            }
        }

        let count = restored.len();
        for library in &restored {
            self.repository.save(library).await?;
        }
        let mut libraries = self.libraries.write();
        for library in restored {
            libraries.insert(library.owner(), library);
        }
        info!("Restored {} libraries from epoch {} checkpoint", count, epoch);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NullEventBus;
    use crate::infrastructure::InMemoryExperienceRepository;
    use std::sync::Mutex;

    struct MockEventBus {
        events: Mutex<Vec<CortexEvent>>,
    }

    impl MockEventBus {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
            }
        }

        fn types(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|e| e.event_type()).collect()
        }
    }

    #[async_trait]
    impl EventBus for MockEventBus {
        async fn publish(&self, event: CortexEvent) -> anyhow::Result<()> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn add(content: &str) -> ExperienceOperation {
        ExperienceOperation::Add {
            content: content.to_string(),
            category: None,
        }
    }

    #[tokio::test]
    async fn test_commit_applies_and_persists() {
        let repo = Arc::new(InMemoryExperienceRepository::new());
        let bus = Arc::new(MockEventBus::new());
        let service = StandardExperienceService::new(repo.clone(), bus.clone());
        service.load(&ExperienceOwner::all(2)).await.unwrap();

        let mut changes = PendingChanges::default();
        changes.push_batch(ExperienceOwner::Generator(1), vec![add("Check units")], "test");
        let report = service.commit(changes).await.unwrap();

        assert_eq!(report.applied.len(), 1);
        assert_eq!(service.snapshot(ExperienceOwner::Generator(1)).len(), 1);
        let stored = repo.load(ExperienceOwner::Generator(1)).await.unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(bus.types(), vec!["experience_batch_applied"]);
    }

    #[tokio::test]
    async fn test_rejected_batch_leaves_library_and_others_proceed() {
        let repo = Arc::new(InMemoryExperienceRepository::new());
        let service = StandardExperienceService::new(repo, Arc::new(NullEventBus));
        service.load(&ExperienceOwner::all(1)).await.unwrap();

        let mut changes = PendingChanges::default();
        changes.push_batch(ExperienceOwner::Shared, vec![add("ok"), add("")], "bad");
        changes.push_batch(ExperienceOwner::Critic, vec![add("Prefer majority edges")], "good");
        let report = service.commit(changes).await.unwrap();

        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].owner, ExperienceOwner::Shared);
        assert_eq!(report.rejected_from("bad").count(), 1);
        assert_eq!(report.rejected_from("good").count(), 0);
        assert_eq!(report.applied.len(), 1);
        assert!(service.snapshot(ExperienceOwner::Shared).is_empty());
        assert_eq!(service.snapshot(ExperienceOwner::Critic).len(), 1);
    }

    #[tokio::test]
    async fn test_usage_is_recorded_in_commit() {
        let repo = Arc::new(InMemoryExperienceRepository::new());
        let service = StandardExperienceService::new(repo, Arc::new(NullEventBus));
        service.load(&[ExperienceOwner::Generator(1)]).await.unwrap();

        let mut first = PendingChanges::default();
        first.push_batch(ExperienceOwner::Generator(1), vec![add("Lesson")], "seed");
        service.commit(first).await.unwrap();

        let mut second = PendingChanges::default();
        second.push_usage(ExperienceOwner::Generator(1), vec![ExperienceId(1)], true);
        second.push_usage(ExperienceOwner::Generator(1), vec![ExperienceId(1)], false);
        let report = service.commit(second).await.unwrap();

        assert_eq!(report.usage_updates, 2);
        let exp = service.snapshot(ExperienceOwner::Generator(1)).get(ExperienceId(1)).cloned().unwrap();
        assert_eq!(exp.usage_count, 2);
        assert_eq!(exp.success_count, 1);
    }

    #[tokio::test]
    async fn test_checkpoint_and_restore() {
        let repo = Arc::new(InMemoryExperienceRepository::new());
        let service = StandardExperienceService::new(repo.clone(), Arc::new(NullEventBus));
        service.load(&[ExperienceOwner::Shared]).await.unwrap();

        let mut changes = PendingChanges::default();
        changes.push_batch(ExperienceOwner::Shared, vec![add("Epoch one lesson")], "e1");
        service.commit(changes).await.unwrap();
        service.checkpoint(1).await.unwrap();

        let mut later = PendingChanges::default();
        later.push_batch(ExperienceOwner::Shared, vec![add("Epoch two lesson")], "e2");
        service.commit(later).await.unwrap();
        assert_eq!(service.snapshot(ExperienceOwner::Shared).len(), 2);

        assert_eq!(service.restore_checkpoint(1).await.unwrap(), 1);
        assert_eq!(service.snapshot(ExperienceOwner::Shared).len(), 1);
        assert_eq!(repo.checkpointed_epochs(), vec![1]);
    }
}
