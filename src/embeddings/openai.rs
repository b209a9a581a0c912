// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI-compatible embedding adapter.
//!
//! Serves OpenAI itself and every provider exposing the same `/embeddings`
//! shape (Ollama behind `/v1`, OpenRouter, Grok).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::EmbeddingError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::base::EmbeddingAdapter;

/// Embedding request body.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Embedding response body.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Adapter for providers using the OpenAI embeddings API shape.
pub struct OpenAiCompatibleAdapter {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    provider_name: String,
}

impl OpenAiCompatibleAdapter {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: Option<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            provider_name: provider_name.into(),
        }
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn create_embeddings(
        &self,
        model: &str,
        texts: &[String],
        dimensions: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();

        let request = EmbeddingRequest {
            model,
            input: texts,
            dimensions,
        };

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        } else {
            builder = builder.header("Authorization", "Bearer ollama");
        }

        let response = builder
            .send()
            .await
            .map_err(|e| EmbeddingError::Api(format!("embedding request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EmbeddingError::Api(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|r| r.error.message)
                .unwrap_or(body);
            return Err(EmbeddingError::from_provider_body(status.as_u16(), &message));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| EmbeddingError::Api(format!("failed to parse embedding response: {}", e)))?;

        // Sort by index to maintain order
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(EmbeddingError::Api(format!(
                "provider returned {} embeddings for {} texts",
                data.len(),
                texts.len()
            )));
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("embeddings.openai.request", start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_dimensions_only_when_set() {
        let texts = vec!["a".to_string()];
        let with_dims = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &texts,
            dimensions: Some(768),
        };
        let json = serde_json::to_string(&with_dims).unwrap();
        assert!(json.contains("\"dimensions\":768"));

        let without = EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &texts,
            dimensions: None,
        };
        let json = serde_json::to_string(&without).unwrap();
        assert!(!json.contains("dimensions"));
    }

    #[test]
    fn test_response_parses_out_of_order_indices() {
        let body = r#"{"data":[{"embedding":[2.0],"index":1},{"embedding":[1.0],"index":0}]}"#;
        let mut parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        parsed.data.sort_by_key(|d| d.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0]);
        assert_eq!(parsed.data[1].embedding, vec![2.0]);
    }
}
