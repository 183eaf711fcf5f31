// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Llm
//!
//! Domain port for every model call Praxis makes.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Anti-corruption boundary between the training loop and vendor APIs

// Generation, fusion, distillation, answer computation and semantic answer
// comparison all go through `LLMProvider::generate`. Adapters live in
// infrastructure/llm/; tests substitute scripted providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Domain interface for LLM providers
/// Anti-Corruption Layer that isolates business logic from vendor APIs
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError>;

    /// Check if provider is healthy and accessible
    async fn health_check(&self) -> Result<(), LLMError>;
}

/// The agent a model call is made on behalf of. Each role maps to a model
/// alias in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelRole {
    Generator,
    Critic,
    Distiller,
    Comparator,
    Calculator,
}

impl ModelRole {
    pub fn all() -> [ModelRole; 5] {
        [
            ModelRole::Generator,
            ModelRole::Critic,
            ModelRole::Distiller,
            ModelRole::Comparator,
            ModelRole::Calculator,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelRole::Generator => "generator",
            ModelRole::Critic => "critic",
            ModelRole::Distiller => "distiller",
            ModelRole::Comparator => "comparator",
            ModelRole::Calculator => "calculator",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for LLM generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: Option<f32>,

    /// Sequences that stop generation
    pub stop_sequences: Option<Vec<String>>,

    /// Sampling seed; forwarded by providers that support one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Per-call deadline; overrides the registry's request timeout
    #[serde(skip)]
    pub timeout: Option<Duration>,

    /// Ask the provider to constrain output to a JSON object
    #[serde(default)]
    pub json_output: bool,
}

impl GenerationOptions {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..Self::default()
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(4096),
            temperature: Some(0.7),
            stop_sequences: None,
            seed: None,
            timeout: None,
            json_output: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    /// Generated text
    pub text: String,

    /// Token usage stats
    pub usage: TokenUsage,

    /// Usage provider name (e.g., "openai", "ollama")
    pub provider: String,

    /// Model used (e.g., "gpt-4o", "llama3.2")
    pub model: String,

    /// Why generation stopped
    pub finish_reason: FinishReason,
}

impl GenerationResponse {
    /// Response carrying only text; used by scripted providers
    pub fn text(text: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: TokenUsage::default(),
            provider: provider.into(),
            model: "scripted".to_string(),
            finish_reason: FinishReason::Stop,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Reason why generation stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural completion (model decided to stop)
    Stop,

    /// Hit max_tokens limit
    Length,

    /// Blocked by content filter
    ContentFilter,
}

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum LLMError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

impl LLMError {
    /// Errors that no amount of retrying will fix
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            LLMError::Authentication(_) | LLMError::ModelNotFound(_) | LLMError::InvalidInput(_)
        )
    }
}
