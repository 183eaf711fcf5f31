// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! On-disk embedding cache.
//!
//! Vectors are keyed by [`KnowledgeEntry::content_hash`](crate::domain::KnowledgeEntry::content_hash)
//! and tagged with the embedding model id; a cache written by another model
//! is discarded on load. The cache is append-only: reads take a shared lock,
//! inserts and flushes are serialized. File IO goes through `tokio::fs`.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    model_id: String,
    vectors: BTreeMap<String, Vec<f32>>,
}

pub struct EmbeddingCache {
    path: Option<PathBuf>,
    model_id: String,
    vectors: RwLock<BTreeMap<String, Vec<f32>>>,
    dirty: Mutex<bool>,
    writer: tokio::sync::Mutex<()>,
}

impl EmbeddingCache {
    /// Cache that lives only for the process lifetime
    pub fn in_memory(model_id: impl Into<String>) -> Self {
        Self {
            path: None,
            model_id: model_id.into(),
            vectors: RwLock::new(BTreeMap::new()),
            dirty: Mutex::new(false),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    /// Open (or start) a cache file. An unreadable file or one written by a
    /// different model starts an empty cache rather than failing, since every
    /// vector can be recomputed.
    pub async fn open(path: impl Into<PathBuf>, model_id: impl Into<String>) -> Self {
        let path = path.into();
        let model_id = model_id.into();

        let vectors = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str::<CacheFile>(&content) {
                Ok(file) if file.model_id == model_id => {
                    debug!("Loaded {} cached embeddings from {}", file.vectors.len(), path.display());
                    file.vectors
                }
                Ok(file) => {
                    warn!(
                        "Embedding cache {} was built with '{}', current model is '{}'; recomputing",
                        path.display(),
                        file.model_id,
                        model_id
                    );
                    BTreeMap::new()
                }
                Err(e) => {
                    warn!("Embedding cache {} unreadable ({}); recomputing", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path: Some(path),
            model_id,
            vectors: RwLock::new(vectors),
            dirty: Mutex::new(false),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn len(&self) -> usize {
        self.vectors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.read().is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.vectors.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vectors.read().contains_key(key)
    }

    /// Add vectors; existing keys are left untouched
    pub fn insert_many(&self, entries: impl IntoIterator<Item = (String, Vec<f32>)>) -> usize {
        let mut dirty = self.dirty.lock();
        let mut vectors = self.vectors.write();
        let mut inserted = 0;
        for (key, vector) in entries {
            if let std::collections::btree_map::Entry::Vacant(slot) = vectors.entry(key) {
                slot.insert(vector);
                inserted += 1;
            }
        }
        if inserted > 0 {
            *dirty = true;
        }
        inserted
    }

    /// Write the cache to disk if anything was added since the last flush
    pub async fn flush(&self) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _writer = self.writer.lock().await;

        let file = {
            let mut dirty = self.dirty.lock();
            if !*dirty {
                return Ok(());
            }
            *dirty = false;
            CacheFile {
                model_id: self.model_id.clone(),
                vectors: self.vectors.read().clone(),
            }
        };
        if let Err(e) = write_atomically(path, &file).await {
            *self.dirty.lock() = true;
            return Err(e);
        }
        debug!("Flushed {} embeddings to {}", file.vectors.len(), path.display());
        Ok(())
    }
}

async fn write_atomically(path: &Path, file: &CacheFile) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, serde_json::to_vec(file)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
