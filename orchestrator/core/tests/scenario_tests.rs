// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The reference kinematics problem, end to end through retrieval,
//! generation, fusion and answer computation.

mod common;

use common::*;
use praxis_core::domain::config::ExecutionMode;
use praxis_core::infrastructure::event_bus::EventBus;
use praxis_cortex::application::SemanticRetriever;
use praxis_cortex::{
    Embedder, EmbeddingCache, HashingEmbedder, InMemoryExperienceRepository, InMemoryKnowledgeStore, KnowledgeEntry,
};
use std::sync::Arc;

const NEWTON: &str = "F=ma: the net force on an object equals its mass times its acceleration";
const KINEMATICS: &str = "v=v0+at: under constant acceleration the final velocity equals the initial velocity plus acceleration times time";

async fn physics_retriever(event_bus: Arc<EventBus>) -> Arc<SemanticRetriever> {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(256));
    let cache = Arc::new(EmbeddingCache::in_memory(embedder.model_id()));
    let knowledge = Arc::new(InMemoryKnowledgeStore::new(vec![
        KnowledgeEntry {
            rule: NEWTON.to_string(),
            category: "dynamics".to_string(),
        },
        KnowledgeEntry {
            rule: KINEMATICS.to_string(),
            category: "kinematics".to_string(),
        },
    ]));
    let retriever = Arc::new(SemanticRetriever::new(knowledge, Some(embedder), cache, event_bus));
    retriever.load().await.unwrap();
    retriever
}

fn edge(causes: &[&str], effect: &str) -> (Vec<String>, String) {
    (causes.iter().map(|c| c.to_string()).collect(), effect.to_string())
}

#[tokio::test]
async fn test_reference_problem_fuses_newtonian_plan() {
    let mut spec = spec(ExecutionMode::Parallel { max_concurrency: 2 });
    spec.retrieval.enabled = true;
    spec.retrieval.top_k = 2;
    // admit every rule regardless of score
    spec.retrieval.similarity_threshold = -1.0;

    let event_bus = Arc::new(EventBus::with_default_capacity());
    let retriever = physics_retriever(event_bus.clone()).await;
    let h = build_harness(
        &spec,
        ScriptedLlm::replying("generator", CORRECT_PLAN),
        ScriptedLlm::new("critic", |_, _| Ok(critic_verdict())),
        Arc::new(InMemoryExperienceRepository::new()),
        event_bus,
        Some(retriever),
    );
    h.trainer.load_libraries().await.unwrap();

    let outcome = h.trainer.solve(&problem()).await.unwrap();
    assert_eq!(outcome.answer.as_deref(), Some("25"));
    assert_eq!(outcome.votes, 2);
    assert_eq!(outcome.reward, Some(1.0));

    let plan = &outcome.fused[0].plan;
    assert_eq!(plan.target_variable(), "final_velocity");
    let edges = plan.edge_signatures();
    assert!(edges.contains(&edge(&["force", "mass"], "acceleration")));
    assert!(edges.contains(&edge(&["acceleration", "initial_velocity", "time"], "final_velocity")));

    let prompts = h.generator.prompts();
    assert_eq!(prompts.len(), 6);
    assert!(prompts.iter().all(|p| p.contains(NEWTON) && p.contains(KINEMATICS)));
}

#[tokio::test]
async fn test_strict_threshold_retrieves_nothing() {
    let retriever = physics_retriever(Arc::new(EventBus::with_default_capacity())).await;
    let outcome = retriever.retrieve("Name the capital of France.", 3, 0.99).await;
    assert!(outcome.rules.is_empty());
    assert_eq!(outcome.render(), "(no relevant rules)");
}
