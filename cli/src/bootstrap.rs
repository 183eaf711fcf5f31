// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-process service wiring
//!
//! Every command builds the services it needs from the loaded configuration:
//! the provider registry, the file-backed experience libraries, the knowledge
//! retriever and, for `train` and `solve`, the [`Trainer`].

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use praxis_core::application::Trainer;
use praxis_core::domain::config::{PraxisConfigManifest, PraxisConfigSpec};
use praxis_core::infrastructure::event_bus::EventBus;
use praxis_core::infrastructure::llm::{ProviderRegistry, RoleProviders};
use praxis_cortex::application::{ExperienceService, SemanticRetriever, StandardExperienceService};
use praxis_cortex::{
    Embedder, EmbeddingCache, ExperienceOwner, FileExperienceRepository, HashingEmbedder, HttpEmbeddingClient,
    JsonlKnowledgeStore,
};

pub struct Bootstrap {
    pub config: PraxisConfigManifest,
    pub event_bus: Arc<EventBus>,
}

impl Bootstrap {
    /// Discover, load and validate configuration
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = PraxisConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
        config.validate().context("Configuration validation failed")?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: PraxisConfigManifest) -> Self {
        Self {
            config,
            event_bus: Arc::new(EventBus::with_default_capacity()),
        }
    }

    pub fn spec(&self) -> &PraxisConfigSpec {
        &self.config.spec
    }

    pub fn owners(&self) -> Vec<ExperienceOwner> {
        ExperienceOwner::all(self.spec().training.num_generators)
    }

    /// File-backed libraries for every configured agent, loaded from disk
    pub async fn experience(&self) -> Result<Arc<StandardExperienceService>> {
        let dir = &self.spec().storage.experience_dir;
        let repository = FileExperienceRepository::new(dir)
            .with_context(|| format!("Failed to open experience directory {:?}", dir))?;
        let service = Arc::new(StandardExperienceService::new(Arc::new(repository), self.event_bus.clone()));
        service
            .load(&self.owners())
            .await
            .context("Failed to load experience libraries")?;
        Ok(service)
    }

    pub fn providers(&self) -> Result<(Arc<ProviderRegistry>, RoleProviders)> {
        let registry = Arc::new(ProviderRegistry::from_config(self.spec()).context("Failed to initialize LLM providers")?);
        let roles = RoleProviders::from_registry(registry.clone(), &self.spec().roles);
        Ok((registry, roles))
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let retrieval = &self.spec().retrieval;
        Ok(match &retrieval.embedding {
            Some(embedding) => Arc::new(HttpEmbeddingClient::new(
                embedding.endpoint.clone(),
                embedding.model.clone(),
                embedding.api,
                resolve_secret(&embedding.api_key)?,
                self.spec().llm_selection.request_timeout,
            )),
            None => {
                info!(dimension = retrieval.hashing_dimension, "No embedding endpoint configured, using hashed features");
                Arc::new(HashingEmbedder::new(retrieval.hashing_dimension))
            }
        })
    }

    /// Knowledge retriever, or `None` when retrieval is disabled
    pub async fn retriever(&self) -> Result<Option<Arc<SemanticRetriever>>> {
        let retrieval = &self.spec().retrieval;
        if !retrieval.enabled {
            return Ok(None);
        }
        Ok(Some(self.open_retriever().await?))
    }

    /// Knowledge retriever regardless of the `enabled` switch
    pub async fn open_retriever(&self) -> Result<Arc<SemanticRetriever>> {
        let retrieval = &self.spec().retrieval;
        let embedder = self.embedder()?;
        let cache = Arc::new(EmbeddingCache::open(retrieval.cache_path(), embedder.model_id()).await);
        let retriever = Arc::new(SemanticRetriever::new(
            Arc::new(JsonlKnowledgeStore::new(&retrieval.knowledge_path)),
            Some(embedder),
            cache,
            self.event_bus.clone(),
        ));
        retriever
            .load()
            .await
            .with_context(|| format!("Failed to load knowledge base {:?}", retrieval.knowledge_path))?;
        Ok(retriever)
    }

    pub async fn trainer(&self, roles: &RoleProviders) -> Result<(Trainer, Arc<StandardExperienceService>)> {
        let experience = self.experience().await?;
        let retriever = self.retriever().await?;
        let trainer = Trainer::from_config(self.spec(), roles, experience.clone(), retriever, None, self.event_bus.clone())?;
        Ok((trainer, experience))
    }
}

/// Resolve an optional secret, supporting the `env:VAR_NAME` form
pub fn resolve_secret(value: &Option<String>) -> Result<Option<String>> {
    match value.as_deref() {
        None => Ok(None),
        Some(raw) => match raw.strip_prefix("env:") {
            Some(var) => std::env::var(var)
                .map(Some)
                .with_context(|| format!("Environment variable '{}' is not set", var)),
            None => Ok(Some(raw.to_string())),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_secret() {
        assert_eq!(resolve_secret(&None).unwrap(), None);
        assert_eq!(resolve_secret(&Some("sk-plain".into())).unwrap(), Some("sk-plain".into()));
        assert!(resolve_secret(&Some("env:PRAXIS_TEST_SURELY_UNSET_VAR".into())).is_err());
    }

    #[tokio::test]
    async fn test_experience_libraries_start_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PraxisConfigManifest::default();
        config.spec.storage.experience_dir = dir.path().join("libraries");
        config.spec.retrieval.knowledge_path = dir.path().join("knowledge.jsonl");
        config.spec.training.num_generators = 2;

        let bootstrap = Bootstrap::from_config(config);
        let experience = bootstrap.experience().await.unwrap();
        assert_eq!(experience.owners().len(), 4);
        assert!(bootstrap.retriever().await.is_ok());
    }
}
