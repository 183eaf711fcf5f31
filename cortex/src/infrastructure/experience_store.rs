// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Experience Library Stores
//!
//! File-backed storage keeps one pretty-printed JSON document per owner so
//! libraries stay human-readable and diff cleanly between epochs:
//!
//! ```text
//! <root>/
//!   shared.json
//!   generator_1.json
//!   critic.json
//!   checkpoints/
//!     epoch_0001/
//!       shared.json
//!       ...
//! ```
//!
//! Writes go to a temporary sibling file which is then renamed over the
//! target, so a crash mid-write never leaves a half-written library behind.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::domain::{ExperienceLibrary, ExperienceOwner, LibraryError};
use crate::infrastructure::repository::ExperienceRepository;

pub struct FileExperienceRepository {
    root: PathBuf,
}

impl FileExperienceRepository {
    /// Create a repository rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            LibraryError::Io(format!("Failed to create experience directory {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn library_path(&self, owner: ExperienceOwner) -> PathBuf {
        self.root.join(format!("{}.json", owner.key()))
    }

    fn checkpoint_dir(&self, epoch: u32) -> PathBuf {
        self.root.join("checkpoints").join(format!("epoch_{:04}", epoch))
    }

    async fn read_library(path: &Path, owner: ExperienceOwner) -> Result<Option<ExperienceLibrary>, LibraryError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LibraryError::Io(format!("Failed to read {}: {}", path.display(), e))),
        };

        let library: ExperienceLibrary = serde_json::from_str(&content).map_err(|e| LibraryError::Corrupted {
            owner: owner.key(),
            reason: format!("{}: {}", path.display(), e),
        })?;

        if library.owner() != owner {
            return Err(LibraryError::Corrupted {
                owner: owner.key(),
                reason: format!("{} holds the library of '{}'", path.display(), library.owner()),
            });
        }
        library.check_integrity()?;
        Ok(Some(library))
    }

    async fn write_library(path: &Path, library: &ExperienceLibrary) -> Result<(), LibraryError> {
        let json = serde_json::to_string_pretty(library)
            .map_err(|e| LibraryError::Io(format!("Failed to serialize library '{}': {}", library.owner(), e)))?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LibraryError::Io(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| LibraryError::Io(format!("Failed to write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| LibraryError::Io(format!("Failed to replace {}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[async_trait]
impl ExperienceRepository for FileExperienceRepository {
    async fn load(&self, owner: ExperienceOwner) -> Result<Option<ExperienceLibrary>, LibraryError> {
        let path = self.library_path(owner);
        let library = Self::read_library(&path, owner).await?;
        if let Some(ref lib) = library {
            debug!("Loaded library '{}' with {} experiences", owner, lib.len());
        }
        Ok(library)
    }

    async fn save(&self, library: &ExperienceLibrary) -> Result<(), LibraryError> {
        Self::write_library(&self.library_path(library.owner()), library).await
    }

    async fn checkpoint(&self, epoch: u32, libraries: &[ExperienceLibrary]) -> Result<(), LibraryError> {
        let dir = self.checkpoint_dir(epoch);
        for library in libraries {
            let path = dir.join(format!("{}.json", library.owner().key()));
            Self::write_library(&path, library).await?;
        }
        info!("Checkpointed {} libraries to {}", libraries.len(), dir.display());
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        epoch: u32,
        owner: ExperienceOwner,
    ) -> Result<Option<ExperienceLibrary>, LibraryError> {
        let path = self.checkpoint_dir(epoch).join(format!("{}.json", owner.key()));
        Self::read_library(&path, owner).await
    }
}

/// In-memory repository for tests and dry runs
#[derive(Default)]
pub struct InMemoryExperienceRepository {
    libraries: RwLock<HashMap<ExperienceOwner, ExperienceLibrary>>,
    checkpoints: RwLock<HashMap<(u32, ExperienceOwner), ExperienceLibrary>>,
}

impl InMemoryExperienceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Epochs that have at least one checkpointed library
    pub fn checkpointed_epochs(&self) -> Vec<u32> {
        let mut epochs: Vec<u32> = self.checkpoints.read().keys().map(|(epoch, _)| *epoch).collect();
        epochs.sort_unstable();
        epochs.dedup();
        epochs
    }
}

#[async_trait]
impl ExperienceRepository for InMemoryExperienceRepository {
    async fn load(&self, owner: ExperienceOwner) -> Result<Option<ExperienceLibrary>, LibraryError> {
        Ok(self.libraries.read().get(&owner).cloned())
    }

    async fn save(&self, library: &ExperienceLibrary) -> Result<(), LibraryError> {
        self.libraries.write().insert(library.owner(), library.clone());
        Ok(())
    }

    async fn checkpoint(&self, epoch: u32, libraries: &[ExperienceLibrary]) -> Result<(), LibraryError> {
        let mut checkpoints = self.checkpoints.write();
        for library in libraries {
            checkpoints.insert((epoch, library.owner()), library.clone());
        }
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        epoch: u32,
        owner: ExperienceOwner,
    ) -> Result<Option<ExperienceLibrary>, LibraryError> {
        Ok(self.checkpoints.read().get(&(epoch, owner)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExperienceId, ExperienceOperation};

    fn library_with_history() -> ExperienceLibrary {
        let mut lib = ExperienceLibrary::new(ExperienceOwner::Generator(2));
        lib.apply_batch(&[
            ExperienceOperation::Add {
                content: "List knowns with units before planning".to_string(),
                category: Some("planning".to_string()),
            },
            ExperienceOperation::Add {
                content: "Acceleration comes from net force over mass".to_string(),
                category: None,
            },
        ])
        .unwrap();
        lib.apply_batch(&[ExperienceOperation::Delete { id: ExperienceId(1) }]).unwrap();
        lib.record_usage(&[ExperienceId(2)], true);
        lib
    }

    #[tokio::test]
    async fn test_round_trip_reproduces_records() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileExperienceRepository::new(dir.path()).unwrap();
        let library = library_with_history();

        repo.save(&library).await.unwrap();
        let loaded = repo.load(ExperienceOwner::Generator(2)).await.unwrap().unwrap();

        assert_eq!(loaded, library);
        assert!(dir.path().join("generator_2.json").exists());
    }

    #[tokio::test]
    async fn test_reload_keeps_deleted_ids_retired() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileExperienceRepository::new(dir.path()).unwrap();
        repo.save(&library_with_history()).await.unwrap();

        let mut loaded = repo.load(ExperienceOwner::Generator(2)).await.unwrap().unwrap();
        let outcome = loaded
            .apply_batch(&[ExperienceOperation::Add {
                content: "New".to_string(),
                category: None,
            }])
            .unwrap();
        assert_eq!(outcome.added, vec![ExperienceId(3)]);
    }

    #[tokio::test]
    async fn test_missing_library_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileExperienceRepository::new(dir.path()).unwrap();
        assert!(repo.load(ExperienceOwner::Critic).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_library_surfaces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shared.json"), "{ not json").unwrap();
        let repo = FileExperienceRepository::new(dir.path()).unwrap();

        let result = repo.load(ExperienceOwner::Shared).await;
        assert!(matches!(result, Err(LibraryError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn test_checkpoint_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = FileExperienceRepository::new(dir.path()).unwrap();
        let library = library_with_history();

        repo.checkpoint(3, std::slice::from_ref(&library)).await.unwrap();

        assert!(dir.path().join("checkpoints/epoch_0003/generator_2.json").exists());
        let restored = repo
            .load_checkpoint(3, ExperienceOwner::Generator(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored, library);
    }
}
