// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer for Cortex bounded context

pub mod repository;
pub mod experience_store;
pub mod knowledge_store;
pub mod embedding_client;
pub mod embedding_cache;

pub use repository::{ExperienceRepository, KnowledgeRepository};
pub use experience_store::{FileExperienceRepository, InMemoryExperienceRepository};
pub use knowledge_store::{InMemoryKnowledgeStore, JsonlKnowledgeStore};
pub use embedding_client::{cosine_similarity, tokenize, Embedder, EmbeddingApi, EmbeddingError, HashingEmbedder, HttpEmbeddingClient};
pub use embedding_cache::EmbeddingCache;
