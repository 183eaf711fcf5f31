// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Anthropic Messages API adapter.
//
// The Messages API takes no sampling seed, so `options.seed` is dropped and
// rollouts from this provider are not reproducible. JSON-constrained calls
// get a system instruction instead of a response format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{decode, join_url, transport_error};
use crate::domain::llm::{FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage};

pub const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const JSON_SYSTEM_PROMPT: &str = "Reply with a single JSON object and nothing else.";

pub struct AnthropicAdapter {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicAdapter {
    /// An empty endpoint selects the public API
    pub fn new(name: String, endpoint: String, api_key: String, model: String) -> Self {
        let endpoint = if endpoint.is_empty() {
            DEFAULT_ANTHROPIC_ENDPOINT.to_string()
        } else {
            endpoint
        };
        Self {
            client: reqwest::Client::new(),
            name,
            endpoint,
            api_key,
            model,
        }
    }

    fn messages_url(&self) -> String {
        join_url(&self.endpoint, "messages")
    }

    fn request<'a>(&'a self, prompt: &'a str, options: &'a GenerationOptions) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: [Message {
                role: "user",
                content: prompt,
            }],
            system: options.json_output.then_some(JSON_SYSTEM_PROMPT),
            temperature: options.temperature,
            stop_sequences: options.stop_sequences.as_deref(),
        }
    }
}

#[async_trait]
impl LLMProvider for AnthropicAdapter {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&self.request(prompt, options))
            .send()
            .await
            .map_err(transport_error)?;
        let body: MessagesResponse = decode(response, &self.model).await?;

        let text: String = body.content.iter().map(|block| block.text.as_str()).collect();
        Ok(GenerationResponse {
            text,
            usage: TokenUsage::new(body.usage.input_tokens, body.usage.output_tokens),
            provider: self.name.clone(),
            model: self.model.clone(),
            finish_reason: match body.stop_reason.as_deref() {
                Some("max_tokens") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        // There is no health endpoint; a GET on messages is rejected with 405
        // once the key has been accepted.
        let response = self
            .client
            .get(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .send()
            .await
            .map_err(transport_error)?;
        match response.status().as_u16() {
            200..=299 | 404 | 405 => Ok(()),
            401 | 403 => Err(LLMError::Authentication("API key rejected".into())),
            status => Err(LLMError::Network(format!("messages endpoint answered HTTP {}", status))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_joins_content_blocks() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"system": JSON_SYSTEM_PROMPT})))
            .with_status(200)
            .with_body(
                r#"{"content":[{"type":"text","text":"{\"a\":"},{"type":"text","text":"1}"}],
                    "usage":{"input_tokens":10,"output_tokens":2},"stop_reason":"end_turn"}"#,
            )
            .create_async()
            .await;

        let adapter = AnthropicAdapter::new("claude".into(), server.url(), "key".into(), "claude-test".into());
        let response = adapter
            .generate("q", &GenerationOptions::default().json_output())
            .await
            .unwrap();
        assert_eq!(response.text, "{\"a\":1}");
        assert_eq!(response.usage.total_tokens, 12);
    }

    #[test]
    fn test_seed_is_not_sent() {
        let adapter = AnthropicAdapter::new("claude".into(), String::new(), "k".into(), "m".into());
        let options = GenerationOptions::default().seed(3);
        let body = serde_json::to_value(adapter.request("q", &options)).unwrap();
        assert!(body.get("seed").is_none());
        assert!(body.get("system").is_none());
        assert_eq!(adapter.messages_url(), "https://api.anthropic.com/v1/messages");
    }
}
