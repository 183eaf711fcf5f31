// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge base stores.
//!
//! The on-disk format is JSON lines, one `{"rule": ..., "category": ...}` per
//! line, so enrichment can append without rewriting the file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::domain::KnowledgeEntry;
use crate::infrastructure::repository::KnowledgeRepository;

pub struct JsonlKnowledgeStore {
    path: PathBuf,
}

impl JsonlKnowledgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl KnowledgeRepository for JsonlKnowledgeStore {
    async fn load_all(&self) -> Result<Vec<KnowledgeEntry>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Knowledge base {} not found, starting empty", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read knowledge base {}", self.path.display()))
            }
        };

        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Invalid knowledge entry at {}:{}", self.path.display(), n + 1))
            })
            .collect()
    }

    async fn append(&self, entries: &[KnowledgeEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry)?);
            buf.push('\n');
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open knowledge base {}", self.path.display()))?;
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    entries: RwLock<Vec<KnowledgeEntry>>,
}

impl InMemoryKnowledgeStore {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryKnowledgeStore {
    async fn load_all(&self) -> Result<Vec<KnowledgeEntry>> {
        Ok(self.entries.read().clone())
    }

    async fn append(&self, entries: &[KnowledgeEntry]) -> Result<()> {
        self.entries.write().extend_from_slice(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlKnowledgeStore::new(dir.path().join("kb.jsonl"));

        store.append(&[KnowledgeEntry::new("F=ma", "mechanics")]).await.unwrap();
        store
            .append(&[KnowledgeEntry::new("v=v0+at", "kinematics")])
            .await
            .unwrap();

        let entries = store.load_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].rule, "F=ma");
        assert_eq!(entries[1].category, "kinematics");
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlKnowledgeStore::new(dir.path().join("absent.jsonl"));
        assert!(store.load_all().await.unwrap().is_empty());
    }
}
