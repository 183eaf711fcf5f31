// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `praxis-cortex` — Learning & Memory Layer
//!
//! Holds everything the training loop remembers between steps:
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Experience`, `ExperienceLibrary`, `ExperienceOperation`, `KnowledgeEntry`, events |
//! | [`application`] | Application | `ExperienceService` (batched library mutation, checkpoints), `SemanticRetriever` |
//! | [`infrastructure`] | Infrastructure | file-backed stores, embedding clients, on-disk embedding cache |
//!
//! Experience libraries are owner-scoped (`shared`, `generator_k`, `critic`).
//! They are only mutated through [`ExperienceLibrary::apply_batch`], which either
//! applies a whole batch of operations or none of them.

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use infrastructure::*;
