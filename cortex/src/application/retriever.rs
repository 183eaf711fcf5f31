// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Semantic knowledge retrieval.
//!
//! Problem text and knowledge rules go through one [`Embedder`]; entries are
//! ranked by cosine similarity. Entry vectors live in the shared
//! [`EmbeddingCache`] so only new or edited rules are ever sent to the
//! backend. When the backend is missing or failing the retriever switches to
//! token-set Jaccard overlap with the same `top_k`/threshold contract, so the
//! pipeline never stalls on embeddings.

use anyhow::Result;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::EventBus;
use crate::domain::{CortexEvent, KnowledgeEntry, RetrievedRule};
use crate::infrastructure::{cosine_similarity, tokenize, Embedder, EmbeddingCache, EmbeddingError, KnowledgeRepository};

const EMBED_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Semantic,
    Lexical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub rules: Vec<RetrievedRule>,
    pub mode: RetrievalMode,
}

impl RetrievalOutcome {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Bulleted list for prompt injection
    pub fn render(&self) -> String {
        if self.rules.is_empty() {
            return "(no relevant rules)".to_string();
        }
        self.rules
            .iter()
            .map(|r| format!("- [{}] {}", r.entry.category, r.entry.rule))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SemanticRetriever {
    repository: Arc<dyn KnowledgeRepository>,
    embedder: Option<Arc<dyn Embedder>>,
    cache: Arc<EmbeddingCache>,
    event_bus: Arc<dyn EventBus>,
    entries: RwLock<Vec<KnowledgeEntry>>,
}

impl SemanticRetriever {
    pub fn new(
        repository: Arc<dyn KnowledgeRepository>,
        embedder: Option<Arc<dyn Embedder>>,
        cache: Arc<EmbeddingCache>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            repository,
            embedder,
            cache,
            event_bus,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Load the knowledge base and embed anything the cache does not hold.
    /// An embedding failure here is not fatal; retrieval degrades instead.
    pub async fn load(&self) -> Result<usize> {
        let entries = self.repository.load_all().await?;
        let count = entries.len();
        *self.entries.write() = entries;
        info!("Loaded {} knowledge entries", count);

        if let Err(e) = self.embed_missing().await {
            warn!("Could not pre-embed knowledge base: {}", e);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn entries(&self) -> Vec<KnowledgeEntry> {
        self.entries.read().clone()
    }

    /// Up to `top_k` rules scoring at least `threshold`, best first; equal
    /// scores keep knowledge-base order.
    pub async fn retrieve(&self, problem: &str, top_k: usize, threshold: f64) -> RetrievalOutcome {
        if top_k == 0 || self.is_empty() {
            return RetrievalOutcome {
                rules: Vec::new(),
                mode: if self.embedder.is_some() {
                    RetrievalMode::Semantic
                } else {
                    RetrievalMode::Lexical
                },
            };
        }

        let Some(embedder) = &self.embedder else {
            return self.lexical(problem, top_k, threshold);
        };

        match self.semantic(embedder.as_ref(), problem, top_k, threshold).await {
            Ok(rules) => RetrievalOutcome {
                rules,
                mode: RetrievalMode::Semantic,
            },
            Err(e) => {
                warn!("Embedding retrieval failed, using lexical overlap: {}", e);
                metrics::counter!("praxis_retrieval_fallback_total").increment(1);
                if let Err(publish_err) = self
                    .event_bus
                    .publish(CortexEvent::RetrievalDegraded {
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    })
                    .await
                {
                    warn!("Failed to publish cortex event: {}", publish_err);
                }
                self.lexical(problem, top_k, threshold)
            }
        }
    }

    /// Append new rules to the knowledge base, skipping exact duplicates.
    /// Only the appended rules are embedded.
    pub async fn append_rules(&self, rules: Vec<KnowledgeEntry>) -> Result<usize> {
        let new_rules: Vec<KnowledgeEntry> = {
            let entries = self.entries.read();
            let mut seen: HashSet<String> = entries.iter().map(|e| e.content_hash()).collect();
            rules
                .into_iter()
                .filter(|r| !r.rule.trim().is_empty())
                .filter(|r| seen.insert(r.content_hash()))
                .collect()
        };
        if new_rules.is_empty() {
            return Ok(0);
        }

        self.repository.append(&new_rules).await?;
        let appended = new_rules.len();
        self.entries.write().extend(new_rules);

        let newly_embedded = match self.embed_missing().await {
            Ok(n) => n,
            Err(e) => {
                warn!("Appended rules were not embedded: {}", e);
                0
            }
        };

        if let Err(e) = self
            .event_bus
            .publish(CortexEvent::KnowledgeAppended {
                rules: appended,
                newly_embedded,
                timestamp: Utc::now(),
            })
            .await
        {
            warn!("Failed to publish cortex event: {}", e);
        }
        Ok(appended)
    }

    async fn embed_missing(&self) -> Result<usize, EmbeddingError> {
        let Some(embedder) = &self.embedder else {
            return Ok(0);
        };

        let missing: Vec<(String, String)> = {
            let entries = self.entries.read();
            let mut seen = BTreeSet::new();
            entries
                .iter()
                .map(|e| (e.content_hash(), e.embedding_text()))
                .filter(|(hash, _)| !self.cache.contains(hash) && seen.insert(hash.clone()))
                .collect()
        };
        if missing.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0;
        for chunk in missing.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            inserted += self
                .cache
                .insert_many(chunk.iter().map(|(hash, _)| hash.clone()).zip(vectors));
        }

        debug!("Embedded {} knowledge entries", inserted);
        if let Err(e) = self.cache.flush().await {
            warn!("Failed to persist embedding cache: {}", e);
        }
        Ok(inserted)
    }

    async fn semantic(
        &self,
        embedder: &dyn Embedder,
        problem: &str,
        top_k: usize,
        threshold: f64,
    ) -> Result<Vec<RetrievedRule>, EmbeddingError> {
        self.embed_missing().await?;

        let query = embedder
            .embed(&[problem.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Malformed("no vector for query".to_string()))?;

        let entries = self.entries.read().clone();
        let mut scored = Vec::with_capacity(entries.len());
        for (position, entry) in entries.into_iter().enumerate() {
            let vector = self
                .cache
                .get(&entry.content_hash())
                .ok_or_else(|| EmbeddingError::Malformed(format!("no cached vector for rule '{}'", entry.rule)))?;
            scored.push(RetrievedRule {
                score: cosine_similarity(&query, &vector),
                entry,
                position,
            });
        }
        Ok(rank(scored, top_k, threshold))
    }

    fn lexical(&self, problem: &str, top_k: usize, threshold: f64) -> RetrievalOutcome {
        let query: HashSet<String> = tokenize(problem).into_iter().collect();
        let entries = self.entries.read();
        let scored = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                let tokens: HashSet<String> = tokenize(&entry.embedding_text()).into_iter().collect();
                RetrievedRule {
                    entry: entry.clone(),
                    score: jaccard(&query, &tokens),
                    position,
                }
            })
            .collect();
        RetrievalOutcome {
            rules: rank(scored, top_k, threshold),
            mode: RetrievalMode::Lexical,
        }
    }
}

fn rank(mut scored: Vec<RetrievedRule>, top_k: usize, threshold: f64) -> Vec<RetrievedRule> {
    scored.retain(|r| r.score >= threshold);
    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.position.cmp(&b.position)));
    scored.truncate(top_k);
    scored
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::NullEventBus;
    use crate::infrastructure::{HashingEmbedder, InMemoryKnowledgeStore, JsonlKnowledgeStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
        texts: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                inner: HashingEmbedder::new(256),
                calls: AtomicUsize::new(0),
                texts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed(texts).await
        }

        fn model_id(&self) -> String {
            self.inner.model_id()
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::Unavailable("connection refused".to_string()))
        }

        fn model_id(&self) -> String {
            "down".to_string()
        }
    }

    fn physics_kb() -> Vec<KnowledgeEntry> {
        vec![
            KnowledgeEntry::new("F=ma: net force equals mass times acceleration", "mechanics"),
            KnowledgeEntry::new("v=v0+at: final velocity from initial velocity acceleration and time", "kinematics"),
            KnowledgeEntry::new("PV=nRT ideal gas law relates pressure volume temperature", "thermodynamics"),
        ]
    }

    fn retriever_with(embedder: Option<Arc<dyn Embedder>>, cache: Arc<EmbeddingCache>) -> SemanticRetriever {
        SemanticRetriever::new(
            Arc::new(InMemoryKnowledgeStore::new(physics_kb())),
            embedder,
            cache,
            Arc::new(NullEventBus),
        )
    }

    const PROBLEM: &str = "A block of mass 10 kg at rest is pushed by a force of 50 N for 5 s. \
                           What is its final velocity?";

    #[tokio::test]
    async fn test_retrieval_is_deterministic_and_cached() {
        let embedder = Arc::new(CountingEmbedder::new());
        let cache = Arc::new(EmbeddingCache::in_memory(embedder.model_id()));
        let retriever = retriever_with(Some(embedder.clone()), cache.clone());
        retriever.load().await.unwrap();
        assert_eq!(cache.len(), 3);

        let first = retriever.retrieve(PROBLEM, 2, -1.0).await;
        let second = retriever.retrieve(PROBLEM, 2, -1.0).await;

        assert_eq!(first, second);
        assert_eq!(first.mode, RetrievalMode::Semantic);
        assert_eq!(first.rules.len(), 2);
        assert!(first.rules[0].score >= first.rules[1].score);
        // one load batch, then one query embedding per retrieval
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 3 + 2);
    }

    #[tokio::test]
    async fn test_nothing_above_threshold_is_empty() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256));
        let cache = Arc::new(EmbeddingCache::in_memory(embedder.model_id()));
        let retriever = retriever_with(Some(embedder), cache);
        retriever.load().await.unwrap();

        let outcome = retriever.retrieve("poetry of the romantic era", 5, 0.99).await;
        assert!(outcome.is_empty());
        assert_eq!(outcome.render(), "(no relevant rules)");
    }

    #[tokio::test]
    async fn test_backend_down_falls_back_to_lexical() {
        let cache = Arc::new(EmbeddingCache::in_memory("down"));
        let retriever = retriever_with(Some(Arc::new(DownEmbedder)), cache);
        retriever.load().await.unwrap();

        let outcome = retriever.retrieve("final velocity from acceleration and time", 1, 0.0).await;
        assert_eq!(outcome.mode, RetrievalMode::Lexical);
        assert_eq!(outcome.rules.len(), 1);
        assert_eq!(outcome.rules[0].entry.category, "kinematics");
    }

    #[tokio::test]
    async fn test_lexical_ties_keep_knowledge_base_order() {
        let store = InMemoryKnowledgeStore::new(vec![
            KnowledgeEntry::new("alpha beta", "general"),
            KnowledgeEntry::new("alpha gamma", "general"),
        ]);
        let retriever = SemanticRetriever::new(
            Arc::new(store),
            None,
            Arc::new(EmbeddingCache::in_memory("none")),
            Arc::new(NullEventBus),
        );
        retriever.load().await.unwrap();

        let outcome = retriever.retrieve("alpha", 2, 0.0).await;
        assert_eq!(outcome.rules[0].score, outcome.rules[1].score);
        assert_eq!(outcome.rules[0].position, 0);
        assert_eq!(outcome.rules[1].position, 1);
    }

    #[tokio::test]
    async fn test_append_embeds_only_new_rules() {
        let dir = tempfile::tempdir().unwrap();
        let kb_path = dir.path().join("knowledge.jsonl");
        let cache_path = dir.path().join("embeddings.json");

        let embedder = Arc::new(CountingEmbedder::new());
        let cache = Arc::new(EmbeddingCache::open(&cache_path, embedder.model_id()).await);
        let store = Arc::new(JsonlKnowledgeStore::new(&kb_path));
        store.append(&physics_kb()).await.unwrap();

        let retriever = SemanticRetriever::new(store.clone(), Some(embedder.clone()), cache, Arc::new(NullEventBus));
        retriever.load().await.unwrap();
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 3);

        let appended = retriever
            .append_rules(vec![
                KnowledgeEntry::new("p=mv momentum", "mechanics"),
                physics_kb()[0].clone(),
            ])
            .await
            .unwrap();
        assert_eq!(appended, 1);
        assert_eq!(embedder.texts.load(Ordering::SeqCst), 4);
        assert_eq!(store.load_all().await.unwrap().len(), 4);

        // a fresh process reuses the persisted cache
        let fresh = Arc::new(CountingEmbedder::new());
        let reopened = Arc::new(EmbeddingCache::open(&cache_path, fresh.model_id()).await);
        let second = SemanticRetriever::new(store, Some(fresh.clone()), reopened, Arc::new(NullEventBus));
        second.load().await.unwrap();
        assert_eq!(fresh.calls.load(Ordering::SeqCst), 0);
    }
}
