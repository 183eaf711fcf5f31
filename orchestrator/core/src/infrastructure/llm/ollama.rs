// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ollama adapter for locally served models.
//
// Uses the non-streaming /api/generate endpoint. The rollout seed goes into
// `options.seed`, and JSON-constrained calls set `format: "json"`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{decode, join_url, transport_error};
use crate::domain::llm::{FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage};

pub struct OllamaAdapter {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: SamplingOptions<'a>,
}

#[derive(Debug, Serialize)]
struct SamplingOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    prompt_eval_count: u32,
}

impl OllamaAdapter {
    pub fn new(name: String, endpoint: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            name,
            endpoint,
            model,
        }
    }

    fn request<'a>(&'a self, prompt: &'a str, options: &'a GenerationOptions) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: options.json_output.then_some("json"),
            options: SamplingOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
                seed: options.seed,
                stop: options.stop_sequences.as_deref(),
            },
        }
    }
}

#[async_trait]
impl LLMProvider for OllamaAdapter {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        let response = self
            .client
            .post(join_url(&self.endpoint, "api/generate"))
            .json(&self.request(prompt, options))
            .send()
            .await
            .map_err(transport_error)?;
        let body: GenerateResponse = decode(response, &self.model).await?;

        let finish_reason = if !body.done || body.done_reason.as_deref() == Some("length") {
            FinishReason::Length
        } else {
            FinishReason::Stop
        };
        Ok(GenerationResponse {
            text: body.response,
            usage: TokenUsage::new(body.prompt_eval_count, body.eval_count),
            provider: self.name.clone(),
            model: self.model.clone(),
            finish_reason,
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let response = self
            .client
            .get(join_url(&self.endpoint, "api/tags"))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(LLMError::Network(format!("Ollama answered HTTP {}", response.status())))
        }
    }
}
