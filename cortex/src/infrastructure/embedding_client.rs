// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedding backends.
//!
//! Two backends sit behind the [`Embedder`] trait:
//!
//! - [`HttpEmbeddingClient`] talks to an Ollama (`/api/embed`) or
//!   OpenAI-compatible (`/embeddings`) server.
//! - [`HashingEmbedder`] is a deterministic, offline feature-hashing embedder
//!   used in tests and when no embedding server is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding backend unreachable: {0}")]
    Unavailable(String),

    #[error("Embedding backend returned an error: {0}")]
    Backend(String),

    #[error("Embedding response malformed: {0}")]
    Malformed(String),
}

/// Shared embedding function for queries and knowledge entries
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts; output order matches input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Identifier recorded in the embedding cache so vectors from different
    /// models are never mixed
    fn model_id(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingApi {
    Ollama,
    OpenaiCompatible,
}

pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api: EmbeddingApi,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct OpenAIEmbedResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl HttpEmbeddingClient {
    pub fn new(endpoint: String, model: String, api: EmbeddingApi, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            endpoint,
            model,
            api,
            api_key,
        }
    }

    fn url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match self.api {
            EmbeddingApi::Ollama => format!("{}/api/embed", base),
            EmbeddingApi::OpenaiCompatible => format!("{}/embeddings", base),
        }
    }
}

#[async_trait]
impl Embedder for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(self.url()).json(&EmbedRequest {
            model: &self.model,
            input: texts,
        });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Backend(format!("HTTP {}: {}", status, body)));
        }

        let vectors = match self.api {
            EmbeddingApi::Ollama => {
                let parsed: OllamaEmbedResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
                parsed.embeddings
            }
            EmbeddingApi::OpenaiCompatible => {
                let mut parsed: OpenAIEmbedResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbeddingError::Malformed(e.to_string()))?;
                parsed.data.sort_by_key(|d| d.index);
                parsed.data.into_iter().map(|d| d.embedding).collect()
            }
        };

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Malformed(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    fn model_id(&self) -> String {
        format!("{:?}:{}", self.api, self.model).to_lowercase()
    }
}

/// Deterministic bag-of-tokens embedder (signed feature hashing over
/// unigrams and bigrams, L2-normalised).
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];

        let bigrams = tokens.windows(2).map(|w| format!("{} {}", w[0], w[1]));
        for feature in tokens.iter().cloned().chain(bigrams) {
            let hash = blake3::hash(feature.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) as usize
                % self.dimension;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn model_id(&self) -> String {
        format!("hashing:{}", self.dimension)
    }
}

/// Lowercased alphanumeric tokens; single-letter symbols are kept because
/// formulas like `F=ma` are mostly single letters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Cosine similarity in `[-1, 1]`; zero for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::new(128);
        let texts = vec!["same text".to_string(), "same text".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap();

        assert_eq!(vectors[0].len(), 128);
        assert_eq!(vectors[0], vectors[1]);
    }

    #[test]
    fn test_related_texts_score_higher() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder.embed_one("force mass acceleration of a block");
        let related = embedder.embed_one("net force equals mass times acceleration");
        let unrelated = embedder.embed_one("photosynthesis in chloroplasts");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_cosine_edge_cases() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_ollama_client_parses_embeddings() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/embed")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"embeddings": [[0.1, 0.2], [0.3, 0.4]]}"#)
            .create_async()
            .await;

        let client = HttpEmbeddingClient::new(
            server.url(),
            "nomic-embed-text".to_string(),
            EmbeddingApi::Ollama,
            None,
            Duration::from_secs(5),
        );
        let vectors = client
            .embed(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn test_openai_client_reorders_by_index() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data": [{"embedding": [2.0], "index": 1}, {"embedding": [1.0], "index": 0}]}"#)
            .create_async()
            .await;

        let client = HttpEmbeddingClient::new(
            server.url(),
            "text-embedding-3-small".to_string(),
            EmbeddingApi::OpenaiCompatible,
            Some("key".to_string()),
            Duration::from_secs(5),
        );
        let vectors = client.embed(&["x".to_string(), "y".to_string()]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn test_server_error_is_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/api/embed").with_status(500).create_async().await;

        let client = HttpEmbeddingClient::new(
            server.url(),
            "m".to_string(),
            EmbeddingApi::Ollama,
            None,
            Duration::from_secs(5),
        );
        let result = client.embed(&["x".to_string()]).await;
        assert!(matches!(result, Err(EmbeddingError::Backend(_))));
    }
}
