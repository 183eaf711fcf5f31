// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Plumbing shared by the HTTP provider adapters: URL joining, status code
//! translation and response decoding into [`LLMError`].

use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::domain::llm::LLMError;

/// Bodies longer than this are cut before they land in an error message
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn join_url(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn transport_error(error: reqwest::Error) -> LLMError {
    if error.is_timeout() {
        LLMError::Network(format!("request timed out: {}", error))
    } else {
        LLMError::Network(error.to_string())
    }
}

/// Map a provider status code onto the domain error taxonomy
pub(crate) fn status_error(status: StatusCode, body: &str, model: &str) -> LLMError {
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LLMError::Authentication(body),
        StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimit,
        StatusCode::NOT_FOUND => LLMError::ModelNotFound(model.to_string()),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            LLMError::InvalidInput(format!("HTTP {}: {}", status, body))
        }
        _ => LLMError::Provider(format!("HTTP {}: {}", status, body)),
    }
}

/// Fail on a non-success status, otherwise decode the JSON body
pub(crate) async fn decode<T: DeserializeOwned>(response: Response, model: &str) -> Result<T, LLMError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body, model));
    }
    response
        .json()
        .await
        .map_err(|e| LLMError::Provider(format!("Failed to parse response: {}", e)))
}
