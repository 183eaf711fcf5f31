// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Model Alias Resolution and Provider Management
//
// Manages LLM providers and resolves model aliases to actual providers.
// Every call is bounded by a deadline, retried with exponential backoff and,
// on the last attempt, handed to the fallback provider if one is configured.

use crate::domain::config::{LLMProviderConfig, LLMSelection, PraxisConfigSpec};
use crate::domain::llm::{GenerationOptions, GenerationResponse, LLMError, LLMProvider, ModelRole, TokenUsage};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::anthropic::AnthropicAdapter;
use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

/// Per-alias call accounting, reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AliasUsage {
    pub calls: u64,
    pub failures: u64,
    pub tokens: TokenUsage,
}

struct AliasBinding {
    provider_name: String,
    provider: Arc<dyn LLMProvider>,
}

/// Registry for managing LLM providers and resolving model aliases
pub struct ProviderRegistry {
    aliases: HashMap<String, AliasBinding>,
    /// provider name -> adapter for that provider's first model
    fallbacks: HashMap<String, Arc<dyn LLMProvider>>,
    fallback_provider: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
    request_timeout: Duration,
    usage: Mutex<BTreeMap<String, AliasUsage>>,
}

impl ProviderRegistry {
    /// Registry with no providers; adapters are added with [`ProviderRegistry::register`]
    pub fn new(selection: &LLMSelection) -> Self {
        Self {
            aliases: HashMap::new(),
            fallbacks: HashMap::new(),
            fallback_provider: selection.fallback_provider.clone(),
            max_retries: selection.max_retries.max(1),
            retry_delay: selection.retry_delay,
            request_timeout: selection.request_timeout,
            usage: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create provider registry from the configuration spec
    pub fn from_config(config: &PraxisConfigSpec) -> anyhow::Result<Self> {
        let mut registry = Self::new(&config.llm_selection);

        info!("Initializing LLM provider registry");

        for provider_config in &config.llm_providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }

            info!("Initializing provider: {}", provider_config.name);

            if let Err(e) = registry.add_provider(provider_config) {
                warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
            }
        }

        if registry.aliases.is_empty() {
            warn!("No LLM providers configured - every model call will fail");
        }

        Ok(registry)
    }

    fn add_provider(&mut self, config: &LLMProviderConfig) -> anyhow::Result<()> {
        let api_key = Self::resolve_api_key(&config.api_key)?;

        for (position, model_config) in config.models.iter().enumerate() {
            let adapter = Self::create_adapter(config, &api_key, &model_config.model)?;
            info!(
                "Mapping alias '{}' -> {} ({})",
                model_config.alias, model_config.model, config.name
            );
            if position == 0 {
                self.fallbacks.insert(config.name.clone(), adapter.clone());
            }
            self.register(&config.name, &model_config.alias, adapter);
        }
        Ok(())
    }

    /// Create a provider instance for one model of a provider
    fn create_adapter(config: &LLMProviderConfig, api_key: &str, model: &str) -> anyhow::Result<Arc<dyn LLMProvider>> {
        let provider: Arc<dyn LLMProvider> = match config.provider_type.as_str() {
            // OpenAI-compatible APIs (LM Studio, vLLM, etc.) share the adapter
            "openai" | "openai-compatible" => Arc::new(OpenAIAdapter::new(
                config.name.clone(),
                config.endpoint.clone(),
                api_key.to_string(),
                model.to_string(),
            )),
            "ollama" => Arc::new(OllamaAdapter::new(
                config.name.clone(),
                config.endpoint.clone(),
                model.to_string(),
            )),
            "anthropic" => Arc::new(AnthropicAdapter::new(
                config.name.clone(),
                config.endpoint.clone(),
                api_key.to_string(),
                model.to_string(),
            )),
            _ => anyhow::bail!("Unsupported provider type: {}", config.provider_type),
        };

        Ok(provider)
    }

    /// Resolve API key from config (supports "env:VAR_NAME" syntax)
    fn resolve_api_key(key: &Option<String>) -> anyhow::Result<String> {
        match key {
            Some(k) => match k.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name)
                    .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
                None => Ok(k.clone()),
            },
            None => Ok(String::new()), // For local providers without auth
        }
    }

    /// Bind an alias to an adapter
    pub fn register(&mut self, provider_name: &str, alias: &str, provider: Arc<dyn LLMProvider>) {
        self.fallbacks
            .entry(provider_name.to_string())
            .or_insert_with(|| provider.clone());
        self.aliases.insert(
            alias.to_string(),
            AliasBinding {
                provider_name: provider_name.to_string(),
                provider,
            },
        );
    }

    /// Generate text using a model alias
    /// Includes retry logic and fallback to secondary provider
    pub async fn generate(
        &self,
        alias: &str,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let binding = self
            .aliases
            .get(alias)
            .ok_or_else(|| LLMError::ModelNotFound(format!("Model alias '{}' not found", alias)))?;

        let deadline = options.timeout.unwrap_or(self.request_timeout);
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            match Self::call_with_deadline(binding.provider.as_ref(), prompt, options, deadline).await {
                Ok(response) => {
                    debug!(alias, attempt = attempt + 1, "Generation successful");
                    self.record(alias, Some(&response.usage));
                    metrics::counter!("praxis_llm_requests_total", "alias" => alias.to_string(), "outcome" => "success")
                        .increment(1);
                    return Ok(response);
                }
                Err(e) => {
                    warn!(
                        "Generation failed on '{}' (attempt {}/{}): {}",
                        alias,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    let permanent = e.is_permanent();
                    last_error = Some(e);

                    // Try fallback provider on last attempt
                    if attempt + 1 == self.max_retries || permanent {
                        if let Some(response) = self.try_fallback(binding, prompt, options, deadline).await {
                            self.record(alias, Some(&response.usage));
                            metrics::counter!("praxis_llm_requests_total", "alias" => alias.to_string(), "outcome" => "fallback")
                                .increment(1);
                            return Ok(response);
                        }
                        if permanent {
                            break;
                        }
                    }

                    if attempt + 1 < self.max_retries {
                        // Exponential backoff
                        tokio::time::sleep(self.retry_delay * 2_u32.saturating_pow(attempt)).await;
                    }
                }
            }
        }

        self.record(alias, None);
        metrics::counter!("praxis_llm_requests_total", "alias" => alias.to_string(), "outcome" => "failure").increment(1);
        Err(last_error.unwrap_or_else(|| LLMError::Provider("Unknown error".into())))
    }

    async fn call_with_deadline(
        provider: &dyn LLMProvider,
        prompt: &str,
        options: &GenerationOptions,
        deadline: Duration,
    ) -> Result<GenerationResponse, LLMError> {
        match tokio::time::timeout(deadline, provider.generate(prompt, options)).await {
            Ok(result) => result,
            Err(_) => Err(LLMError::Timeout(deadline)),
        }
    }

    async fn try_fallback(
        &self,
        binding: &AliasBinding,
        prompt: &str,
        options: &GenerationOptions,
        deadline: Duration,
    ) -> Option<GenerationResponse> {
        let fallback = self.fallback_provider.as_ref()?;
        if fallback == &binding.provider_name {
            return None;
        }
        let provider = self.fallbacks.get(fallback)?;
        info!("Trying fallback provider: {}", fallback);
        match Self::call_with_deadline(provider.as_ref(), prompt, options, deadline).await {
            Ok(response) => Some(response),
            Err(e) => {
                warn!("Fallback provider '{}' failed: {}", fallback, e);
                None
            }
        }
    }

    fn record(&self, alias: &str, usage: Option<&TokenUsage>) {
        let mut stats = self.usage.lock();
        let entry = stats.entry(alias.to_string()).or_default();
        entry.calls += 1;
        match usage {
            Some(tokens) => entry.tokens.accumulate(tokens),
            None => entry.failures += 1,
        }
    }

    /// Check health of all providers
    pub async fn health_check_all(&self) -> BTreeMap<String, Result<(), LLMError>> {
        let mut results = BTreeMap::new();

        for (name, provider) in &self.fallbacks {
            info!("Health checking provider: {}", name);
            results.insert(name.clone(), provider.health_check().await);
        }

        results
    }

    /// Get list of available model aliases
    pub fn available_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.aliases.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    /// Check if a model alias exists
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    pub fn usage(&self) -> BTreeMap<String, AliasUsage> {
        self.usage.lock().clone()
    }
}

/// A provider bound to one alias of a shared registry
pub struct RoutedProvider {
    registry: Arc<ProviderRegistry>,
    alias: String,
}

impl RoutedProvider {
    pub fn new(registry: Arc<ProviderRegistry>, alias: impl Into<String>) -> Self {
        Self {
            registry,
            alias: alias.into(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

#[async_trait]
impl LLMProvider for RoutedProvider {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        self.registry.generate(&self.alias, prompt, options).await
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        if self.registry.has_alias(&self.alias) {
            Ok(())
        } else {
            Err(LLMError::ModelNotFound(self.alias.clone()))
        }
    }
}

/// One routed provider per agent role
#[derive(Clone)]
pub struct RoleProviders {
    providers: [Arc<dyn LLMProvider>; 5],
}

impl RoleProviders {
    fn slot(role: ModelRole) -> usize {
        match role {
            ModelRole::Generator => 0,
            ModelRole::Critic => 1,
            ModelRole::Distiller => 2,
            ModelRole::Comparator => 3,
            ModelRole::Calculator => 4,
        }
    }

    pub fn from_registry(registry: Arc<ProviderRegistry>, roles: &crate::domain::config::RoleAliases) -> Self {
        Self {
            providers: ModelRole::all().map(|role| {
                let provider: Arc<dyn LLMProvider> =
                    Arc::new(RoutedProvider::new(registry.clone(), roles.alias_for(role)));
                provider
            }),
        }
    }

    /// Every role served by the same provider
    pub fn uniform(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            providers: ModelRole::all().map(|_| provider.clone()),
        }
    }

    pub fn with(mut self, role: ModelRole, provider: Arc<dyn LLMProvider>) -> Self {
        self.providers[Self::slot(role)] = provider;
        self
    }

    pub fn get(&self, role: ModelRole) -> Arc<dyn LLMProvider> {
        self.providers[Self::slot(role)].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{ModelConfig, PraxisConfigManifest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures_left: AtomicUsize,
        error: LLMError,
        calls: AtomicUsize,
    }

    impl Flaky {
        fn new(failures: usize, error: LLMError) -> Self {
            Self {
                failures_left: AtomicUsize::new(failures),
                error,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LLMProvider for Flaky {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(self.error.clone());
            }
            Ok(GenerationResponse::text("ok", "flaky"))
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    struct Slow;

    #[async_trait]
    impl LLMProvider for Slow {
        async fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(GenerationResponse::text("late", "slow"))
        }

        async fn health_check(&self) -> Result<(), LLMError> {
            Ok(())
        }
    }

    fn selection(retries: u32, fallback: Option<&str>) -> LLMSelection {
        LLMSelection {
            fallback_provider: fallback.map(String::from),
            max_retries: retries,
            retry_delay: Duration::from_millis(1),
            request_timeout: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_registry_creation() {
        let mut spec = PraxisConfigManifest::default().spec;
        spec.llm_providers[0].models.push(ModelConfig {
            alias: "smart".to_string(),
            model: "qwen2.5:14b".to_string(),
            context_window: 32768,
            cost_per_1k_tokens: 0.0,
        });

        let registry = ProviderRegistry::from_config(&spec).unwrap();
        assert!(registry.has_alias("default"));
        assert_eq!(registry.available_aliases(), vec!["default".to_string(), "smart".to_string()]);
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let flaky = Arc::new(Flaky::new(2, LLMError::Network("reset".into())));
        let mut registry = ProviderRegistry::new(&selection(3, None));
        registry.register("local", "default", flaky.clone());

        let response = registry.generate("default", "p", &GenerationOptions::default()).await.unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert_eq!(registry.usage()["default"].calls, 1);
    }

    #[tokio::test]
    async fn test_permanent_error_goes_straight_to_fallback() {
        let broken = Arc::new(Flaky::new(usize::MAX, LLMError::Authentication("bad key".into())));
        let backup = Arc::new(Flaky::new(0, LLMError::RateLimit));
        let mut registry = ProviderRegistry::new(&selection(3, Some("backup")));
        registry.register("primary", "default", broken.clone());
        registry.register("backup", "spare", backup.clone());

        let response = registry.generate("default", "p", &GenerationOptions::default()).await.unwrap();
        assert_eq!(response.text, "ok");
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_turns_into_timeout_error() {
        let mut registry = ProviderRegistry::new(&selection(1, None));
        registry.register("slow", "default", Arc::new(Slow));

        let err = registry
            .generate("default", "p", &GenerationOptions::default().timeout(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::Timeout(d) if d == Duration::from_millis(10)));
        assert_eq!(registry.usage()["default"].failures, 1);
    }

    #[tokio::test]
    async fn test_unknown_alias() {
        let registry = ProviderRegistry::new(&selection(1, None));
        let routed = RoutedProvider::new(Arc::new(registry), "ghost");
        assert!(routed.health_check().await.is_err());
        let err = routed.generate("p", &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, LLMError::ModelNotFound(_)));
    }
}
