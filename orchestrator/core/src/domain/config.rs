// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Praxis Configuration Types
//
// Defines the configuration schema for a Praxis training run, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - LLM provider configuration and model aliases
// - Role → model alias mapping (generator, critic, distiller, comparator, calculator)
// - Training, retrieval and storage settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::llm::ModelRole;
use super::reward::{DistillationPolicy, DEFAULT_VARIANCE_THRESHOLD};

pub const API_VERSION: &str = "praxis.dev/v1";
pub const KIND: &str = "TrainingConfig";

const SUPPORTED_PROVIDER_TYPES: [&str; 4] = ["openai", "openai-compatible", "ollama", "anthropic"];

/// Top-level Kubernetes-style configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PraxisConfigManifest {
    /// API version (must be "praxis.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "TrainingConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: PraxisConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable run name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PraxisConfigSpec {
    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    #[serde(default)]
    pub llm_selection: LLMSelection,

    #[serde(default)]
    pub roles: RoleAliases,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local", "openai")
    pub name: String,

    /// "ollama", "openai", "anthropic", "openai-compatible"
    #[serde(rename = "type")]
    pub provider_type: String,

    /// API endpoint URL
    #[serde(default)]
    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alias referenced from `roles` (e.g., "default", "fast", "smart")
    pub alias: String,

    /// Actual model identifier for the provider API
    pub model: String,

    #[serde(default = "default_context_window")]
    pub context_window: u32,

    #[serde(default)]
    pub cost_per_1k_tokens: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMSelection {
    /// Fallback provider if primary fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,

    /// Maximum attempts per call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between attempts; doubles each retry
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,

    /// Deadline for a single model request
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

/// Model alias used for each agent role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAliases {
    #[serde(default = "default_alias")]
    pub generator: String,
    #[serde(default = "default_alias")]
    pub critic: String,
    #[serde(default = "default_alias")]
    pub distiller: String,
    #[serde(default = "default_alias")]
    pub comparator: String,
    #[serde(default = "default_alias")]
    pub calculator: String,
}

impl RoleAliases {
    pub fn alias_for(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Generator => &self.generator,
            ModelRole::Critic => &self.critic,
            ModelRole::Distiller => &self.distiller,
            ModelRole::Comparator => &self.comparator,
            ModelRole::Calculator => &self.calculator,
        }
    }
}

/// How a fan-out level runs its work items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ExecutionMode {
    Serial,
    Parallel {
        #[serde(default = "default_concurrency")]
        max_concurrency: usize,
    },
}

impl ExecutionMode {
    pub fn concurrency(&self) -> usize {
        match self {
            ExecutionMode::Serial => 1,
            ExecutionMode::Parallel { max_concurrency } => (*max_concurrency).max(1),
        }
    }
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Parallel {
            max_concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistillationConfig {
    #[serde(default)]
    pub policy: DistillationPolicy,

    /// Reward standard deviation above which a group is distilled
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,

    /// Upper bound on operations accepted from one distillation call
    #[serde(default = "default_max_operations")]
    pub max_operations: usize,

    #[serde(default = "default_distill_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: u32,

    #[serde(default = "default_num_generators")]
    pub num_generators: u32,

    #[serde(default = "default_rollouts_per_generator")]
    pub rollouts_per_generator: u32,

    #[serde(default)]
    pub generator_execution: ExecutionMode,

    #[serde(default)]
    pub rollout_execution: ExecutionMode,

    #[serde(default = "default_generator_temperature")]
    pub generator_temperature: f32,

    #[serde(default)]
    pub critic_temperature: f32,

    /// Wall-clock budget for one rollout, retries included
    #[serde(with = "humantime_serde", default = "default_rollout_timeout")]
    pub rollout_timeout: Duration,

    /// Most-successful experiences rendered into a prompt, per library
    #[serde(default = "default_max_prior_items")]
    pub max_prior_items: usize,

    #[serde(default)]
    pub distillation: DistillationConfig,

    /// Relative tolerance for numeric answer comparison
    #[serde(default = "default_answer_tolerance")]
    pub answer_tolerance: f64,

    /// Ask the comparator model about non-numeric answers
    #[serde(default = "default_true")]
    pub semantic_comparison: bool,

    /// Where the training report is written (JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(default = "default_embedding_api")]
    pub api: praxis_cortex::EmbeddingApi,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// JSON-lines knowledge base
    #[serde(default = "default_knowledge_path")]
    pub knowledge_path: PathBuf,

    /// Embedding cache file; defaults next to the knowledge base
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,

    /// Remote embedding backend; the offline hashing embedder is used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingConfig>,

    #[serde(default = "default_hashing_dimension")]
    pub hashing_dimension: usize,
}

impl RetrievalConfig {
    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.knowledge_path.with_extension("embeddings.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `<owner>.json` libraries and `checkpoints/`
    #[serde(default = "default_experience_dir")]
    pub experience_dir: PathBuf,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_context_window() -> u32 {
    8192
}

fn default_alias() -> String {
    "default".to_string()
}

fn default_concurrency() -> usize {
    4
}

fn default_variance_threshold() -> f64 {
    DEFAULT_VARIANCE_THRESHOLD
}

fn default_max_operations() -> usize {
    4
}

fn default_distill_temperature() -> f32 {
    0.3
}

fn default_epochs() -> u32 {
    1
}

fn default_num_generators() -> u32 {
    3
}

fn default_rollouts_per_generator() -> u32 {
    4
}

fn default_generator_temperature() -> f32 {
    0.7
}

fn default_rollout_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_prior_items() -> usize {
    8
}

fn default_answer_tolerance() -> f64 {
    1e-3
}

fn default_embedding_api() -> praxis_cortex::EmbeddingApi {
    praxis_cortex::EmbeddingApi::Ollama
}

fn default_top_k() -> usize {
    5
}

fn default_similarity_threshold() -> f64 {
    0.2
}

fn default_knowledge_path() -> PathBuf {
    PathBuf::from("knowledge.jsonl")
}

fn default_hashing_dimension() -> usize {
    384
}

fn default_experience_dir() -> PathBuf {
    PathBuf::from("experience")
}

impl Default for LLMSelection {
    fn default() -> Self {
        Self {
            fallback_provider: None,
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for RoleAliases {
    fn default() -> Self {
        Self {
            generator: default_alias(),
            critic: default_alias(),
            distiller: default_alias(),
            comparator: default_alias(),
            calculator: default_alias(),
        }
    }
}

impl Default for DistillationConfig {
    fn default() -> Self {
        Self {
            policy: DistillationPolicy::default(),
            variance_threshold: default_variance_threshold(),
            max_operations: default_max_operations(),
            temperature: default_distill_temperature(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            num_generators: default_num_generators(),
            rollouts_per_generator: default_rollouts_per_generator(),
            generator_execution: ExecutionMode::default(),
            rollout_execution: ExecutionMode::default(),
            generator_temperature: default_generator_temperature(),
            critic_temperature: 0.0,
            rollout_timeout: default_rollout_timeout(),
            max_prior_items: default_max_prior_items(),
            distillation: DistillationConfig::default(),
            answer_tolerance: default_answer_tolerance(),
            semantic_comparison: true,
            report_path: None,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            knowledge_path: default_knowledge_path(),
            cache_path: None,
            embedding: None,
            hashing_dimension: default_hashing_dimension(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            experience_dir: default_experience_dir(),
        }
    }
}

impl Default for PraxisConfigSpec {
    fn default() -> Self {
        Self {
            llm_providers: vec![LLMProviderConfig {
                name: "ollama-local".to_string(),
                provider_type: "ollama".to_string(),
                endpoint: "http://localhost:11434".to_string(),
                api_key: None,
                enabled: true,
                models: vec![ModelConfig {
                    alias: default_alias(),
                    model: "llama3.2".to_string(),
                    context_window: default_context_window(),
                    cost_per_1k_tokens: 0.0,
                }],
            }],
            llm_selection: LLMSelection::default(),
            roles: RoleAliases::default(),
            training: TrainingConfig::default(),
            retrieval: RetrievalConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for PraxisConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "praxis".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: PraxisConfigSpec::default(),
        }
    }
}

impl PraxisConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. PRAXIS_CONFIG_PATH environment variable
    /// 2. ./praxis-config.yaml (working directory)
    /// 3. ~/.praxis/config.yaml (user home)
    /// 4. /etc/praxis/config.yaml (system, Unix) or C:\ProgramData\Praxis\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PRAXIS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./praxis-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".praxis").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/praxis/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Praxis\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("PRAXIS_EXPERIENCE_DIR") {
            tracing::info!("Environment override: PRAXIS_EXPERIENCE_DIR={}", dir);
            self.spec.storage.experience_dir = PathBuf::from(dir);
        }

        let training = &mut self.spec.training;
        override_number("PRAXIS_EPOCHS", &mut training.epochs);
        override_number("PRAXIS_NUM_GENERATORS", &mut training.num_generators);
        override_number("PRAXIS_ROLLOUTS_PER_GENERATOR", &mut training.rollouts_per_generator);
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        for provider in &self.spec.llm_providers {
            if provider.name.is_empty() {
                anyhow::bail!("LLM provider name cannot be empty");
            }

            if !SUPPORTED_PROVIDER_TYPES.contains(&provider.provider_type.as_str()) {
                anyhow::bail!(
                    "Unsupported provider type '{}' for provider '{}'",
                    provider.provider_type,
                    provider.name
                );
            }

            if provider.endpoint.is_empty() && provider.provider_type != "anthropic" {
                anyhow::bail!("LLM provider endpoint cannot be empty for: {}", provider.name);
            }

            if provider.models.is_empty() {
                anyhow::bail!("LLM provider must have at least one model: {}", provider.name);
            }

            for model in &provider.models {
                if model.alias.is_empty() {
                    anyhow::bail!("Model alias cannot be empty in provider: {}", provider.name);
                }

                if model.model.is_empty() {
                    anyhow::bail!("Model identifier cannot be empty for alias: {}", model.alias);
                }
            }
        }

        if let Some(fallback_provider) = &self.spec.llm_selection.fallback_provider {
            if !self.spec.llm_providers.iter().any(|p| &p.name == fallback_provider) {
                anyhow::bail!("Fallback provider '{}' not found in llm_providers", fallback_provider);
            }
        }

        if self.spec.llm_selection.max_retries == 0 {
            anyhow::bail!("llm_selection.max_retries must be at least 1");
        }

        for role in ModelRole::all() {
            let alias = self.spec.roles.alias_for(role);
            let defined = self
                .spec
                .llm_providers
                .iter()
                .filter(|p| p.enabled)
                .flat_map(|p| p.models.iter())
                .any(|m| m.alias == alias);
            if !defined {
                anyhow::bail!("Role '{}' uses model alias '{}', which no enabled provider defines", role, alias);
            }
        }

        let training = &self.spec.training;
        if training.epochs == 0 {
            anyhow::bail!("training.epochs must be at least 1");
        }
        if training.num_generators == 0 {
            anyhow::bail!("training.num_generators must be at least 1");
        }
        if training.rollouts_per_generator == 0 {
            anyhow::bail!("training.rollouts_per_generator must be at least 1");
        }
        for (name, mode) in [
            ("generator_execution", training.generator_execution),
            ("rollout_execution", training.rollout_execution),
        ] {
            if let ExecutionMode::Parallel { max_concurrency: 0 } = mode {
                anyhow::bail!("training.{}.max_concurrency must be at least 1", name);
            }
        }
        if training.distillation.variance_threshold < 0.0 {
            anyhow::bail!("training.distillation.variance_threshold cannot be negative");
        }
        if training.distillation.max_operations == 0 {
            anyhow::bail!("training.distillation.max_operations must be at least 1");
        }
        if training.answer_tolerance < 0.0 {
            anyhow::bail!("training.answer_tolerance cannot be negative");
        }

        if self.spec.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be at least 1");
        }

        Ok(())
    }
}

fn override_number<T: std::str::FromStr + std::fmt::Display>(var: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(var) {
        match val.trim().parse::<T>() {
            Ok(parsed) => {
                tracing::info!("Environment override: {}={}", var, parsed);
                *slot = parsed;
            }
            Err(_) => {
                tracing::warn!("Invalid value for {}: '{}'. Expected a number. Ignoring.", var, val);
            }
        }
    }
}
