// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Experience Library Aggregate
//!
//! An [`ExperienceLibrary`] is the aggregate root for one owner's experiences.
//! All mutation goes through [`ExperienceLibrary::apply_batch`]:
//!
//! - `add` appends a new experience with a freshly allocated id.
//! - `modify` replaces content by id and degrades to `add` when the id is
//!   unknown, so the supplied content is never lost.
//! - `delete` removes by id and is a no-op when the id is absent.
//! - `keep` never mutates.
//!
//! A batch is validated before anything is touched and is applied to a copy
//! that replaces the live state only on success, so a rejected batch leaves
//! the library exactly as it was.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::experience::{cap_words, Experience, ExperienceId, ExperienceOperation, ExperienceOwner, MAX_EXPERIENCE_WORDS};

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("Operation {index} ({action}) rejected: {reason}")]
    InvalidOperation {
        index: usize,
        action: &'static str,
        reason: String,
    },

    #[error("Experience library '{owner}' is corrupted: {reason}")]
    Corrupted { owner: String, reason: String },

    #[error("Experience library I/O failed: {0}")]
    Io(String),
}

/// Summary of what a successfully applied batch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub added: Vec<ExperienceId>,
    pub modified: Vec<ExperienceId>,
    pub deleted: Vec<ExperienceId>,
    /// `modify` operations whose id was unknown and were applied as `add`.
    pub modify_fallbacks: usize,
    /// `delete` operations whose id was unknown.
    pub missing_deletes: usize,
    pub kept: usize,
}

impl BatchOutcome {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceLibrary {
    owner: ExperienceOwner,
    /// Next id to allocate. Persisted so deleted ids stay retired across restarts.
    next_id: u64,
    experiences: Vec<Experience>,
}

impl ExperienceLibrary {
    pub fn new(owner: ExperienceOwner) -> Self {
        Self {
            owner,
            next_id: 1,
            experiences: Vec::new(),
        }
    }

    pub fn owner(&self) -> ExperienceOwner {
        self.owner
    }

    pub fn experiences(&self) -> &[Experience] {
        &self.experiences
    }

    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    pub fn get(&self, id: ExperienceId) -> Option<&Experience> {
        self.experiences.iter().find(|e| e.id == id)
    }

    /// Check the invariants a persisted library must satisfy before it is trusted.
    pub fn check_integrity(&self) -> Result<(), LibraryError> {
        let corrupted = |reason: String| LibraryError::Corrupted {
            owner: self.owner.key(),
            reason,
        };

        let mut seen = std::collections::HashSet::new();
        for exp in &self.experiences {
            if !seen.insert(exp.id) {
                return Err(corrupted(format!("duplicate experience id {}", exp.id)));
            }
            if exp.id.0 >= self.next_id {
                return Err(corrupted(format!(
                    "experience id {} is not below next_id {}",
                    exp.id, self.next_id
                )));
            }
            if exp.owner != self.owner {
                return Err(corrupted(format!(
                    "experience {} belongs to '{}'",
                    exp.id, exp.owner
                )));
            }
            if exp.success_count > exp.usage_count {
                return Err(corrupted(format!(
                    "experience {} has more successes than uses",
                    exp.id
                )));
            }
        }
        Ok(())
    }

    /// Apply all operations as one atomic batch.
    pub fn apply_batch(&mut self, operations: &[ExperienceOperation]) -> Result<BatchOutcome, LibraryError> {
        for (index, op) in operations.iter().enumerate() {
            if let Some(content) = op.content() {
                if content.trim().is_empty() {
                    return Err(LibraryError::InvalidOperation {
                        index,
                        action: op.action(),
                        reason: "content is empty".to_string(),
                    });
                }
            }
        }

        let mut staged = self.clone();
        let mut outcome = BatchOutcome::default();

        for op in operations {
            match op {
                ExperienceOperation::Add { content, category } => {
                    let id = staged.push(content, category.as_deref());
                    outcome.added.push(id);
                }
                ExperienceOperation::Modify { id, content, category } => {
                    match staged.experiences.iter_mut().find(|e| e.id == *id) {
                        Some(existing) => {
                            existing.content = cap_words(content, MAX_EXPERIENCE_WORDS);
                            if let Some(category) = category.as_deref().filter(|c| !c.trim().is_empty()) {
                                existing.category = category.trim().to_string();
                            }
                            existing.updated_at = Utc::now();
                            outcome.modified.push(*id);
                        }
                        None => {
                            let new_id = staged.push(content, category.as_deref());
                            outcome.added.push(new_id);
                            outcome.modify_fallbacks += 1;
                        }
                    }
                }
                ExperienceOperation::Delete { id } => {
                    let before = staged.experiences.len();
                    staged.experiences.retain(|e| e.id != *id);
                    if staged.experiences.len() < before {
                        outcome.deleted.push(*id);
                    } else {
                        outcome.missing_deletes += 1;
                    }
                }
                ExperienceOperation::Keep { .. } => {
                    outcome.kept += 1;
                }
            }
        }

        *self = staged;
        Ok(outcome)
    }

    /// Count one use of each listed experience; ids deleted in the meantime are skipped.
    pub fn record_usage(&mut self, ids: &[ExperienceId], success: bool) -> usize {
        let mut touched = 0;
        for exp in self.experiences.iter_mut().filter(|e| ids.contains(&e.id)) {
            exp.usage_count += 1;
            if success {
                exp.success_count += 1;
            }
            touched += 1;
        }
        touched
    }

    /// The experiences worth showing in a prompt: best success rate first,
    /// most recently updated breaking ties.
    pub fn top(&self, max_items: usize) -> Vec<&Experience> {
        let mut ranked: Vec<&Experience> = self.experiences.iter().collect();
        ranked.sort_by(|a, b| {
            b.success_rate()
                .partial_cmp(&a.success_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.updated_at.cmp(&a.updated_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        ranked.truncate(max_items);
        ranked
    }

    /// Render as a short bulleted prior, `- [id] content`.
    pub fn render_prior(&self, max_items: usize) -> String {
        let top = self.top(max_items);
        if top.is_empty() {
            return "(none yet)".to_string();
        }
        top.iter()
            .map(|e| format!("- [{}] {}", e.id, e.content))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn push(&mut self, content: &str, category: Option<&str>) -> ExperienceId {
        let id = ExperienceId(self.next_id);
        self.next_id += 1;
        self.experiences.push(Experience::new(id, self.owner, content, category));
        id
    }
}
