// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Chat-completions adapter for OpenAI and compatible servers (vLLM, LM
// Studio, llama.cpp server). The prompt is sent as a single user message.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::http::{decode, join_url, transport_error};
use crate::domain::llm::{FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage};

pub struct OpenAIAdapter {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl OpenAIAdapter {
    pub fn new(name: String, endpoint: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            name,
            endpoint,
            api_key,
            model,
        }
    }

    fn request<'a>(&'a self, prompt: &'a str, options: &'a GenerationOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: options.stop_sequences.as_deref(),
            seed: options.seed,
            response_format: options.json_output.then_some(ResponseFormat { kind: "json_object" }),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        // Local compatible servers usually run without a key
        if self.api_key.is_empty() {
            builder
        } else {
            builder.bearer_auth(&self.api_key)
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIAdapter {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<GenerationResponse, LLMError> {
        let response = self
            .authorized(self.client.post(join_url(&self.endpoint, "chat/completions")))
            .json(&self.request(prompt, options))
            .send()
            .await
            .map_err(transport_error)?;
        let body: ChatResponse = decode(response, &self.model).await?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::Provider("Response contained no choices".into()))?;
        let usage = body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(GenerationResponse {
            text: choice.message.content.unwrap_or_default(),
            usage,
            provider: self.name.clone(),
            model: self.model.clone(),
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let response = self
            .authorized(self.client.get(join_url(&self.endpoint, "models")))
            .send()
            .await
            .map_err(transport_error)?;
        match response.status() {
            s if s.is_success() => Ok(()),
            s if s == reqwest::StatusCode::UNAUTHORIZED || s == reqwest::StatusCode::FORBIDDEN => {
                Err(LLMError::Authentication("API key rejected".into()))
            }
            s => Err(LLMError::Network(format!("models endpoint answered HTTP {}", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_output_sets_response_format() {
        let adapter = OpenAIAdapter::new("openai".into(), "http://x/v1".into(), String::new(), "gpt-test".into());
        let options = GenerationOptions::with_temperature(0.0).json_output();
        let body = serde_json::to_value(adapter.request("hi", &options)).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn test_generate_forwards_seed_and_reads_usage() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"seed": 7, "temperature": 0.0})))
            .with_status(200)
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"{\"ok\":true}"},"finish_reason":"stop"}],
                    "usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#,
            )
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new("openai".into(), server.url(), "sk-test".into(), "gpt-test".into());
        let response = adapter
            .generate("hi", &GenerationOptions::with_temperature(0.0).seed(7))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.text, "{\"ok\":true}");
        assert_eq!(response.usage.total_tokens, 7);
        assert_eq!(response.provider, "openai");
    }

    #[tokio::test]
    async fn test_rate_limit_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new("openai".into(), server.url(), "sk-test".into(), "gpt-test".into());
        let err = adapter.generate("hi", &GenerationOptions::default()).await.unwrap_err();
        assert!(matches!(err, LLMError::RateLimit));
    }
}
