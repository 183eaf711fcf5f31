// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One rule of the knowledge base, e.g. `F=ma` in category `mechanics`.
///
/// Entries are append-only; once embedded their vector is cached under
/// [`KnowledgeEntry::content_hash`] and never recomputed unless the text changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub rule: String,
    #[serde(default = "default_category")]
    pub category: String,
}

impl KnowledgeEntry {
    pub fn new(rule: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            category: category.into(),
        }
    }

    /// Hex SHA-256 over `category \0 rule`; the embedding cache key.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.category.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.rule.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Text handed to the embedding backend.
    pub fn embedding_text(&self) -> String {
        if self.category.is_empty() || self.category == default_category() {
            self.rule.clone()
        } else {
            format!("{}: {}", self.category, self.rule)
        }
    }
}

/// A knowledge entry returned by retrieval, with the score that ranked it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedRule {
    pub entry: KnowledgeEntry,
    pub score: f64,
    /// Position in the knowledge base; breaks score ties deterministically.
    pub position: usize,
}

fn default_category() -> String {
    "general".to_string()
}
