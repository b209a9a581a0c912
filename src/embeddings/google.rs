// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Google native embedding adapter.
//!
//! Google's `embedContent` endpoint takes one text per request, so the
//! adapter fans out one POST per text and preserves order. Dimensions below
//! the model's native 3072 come back unnormalized and must be L2-normalized
//! before cosine search is meaningful.

use async_trait::async_trait;
use futures_util::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;

use super::base::EmbeddingAdapter;

const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: ContentParts<'a>,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ContentParts<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Adapter for Google's native embedding endpoint.
pub struct GoogleEmbeddingAdapter {
    client: Client,
    api_key: String,
}

impl GoogleEmbeddingAdapter {
    pub fn new(client: Client, api_key: String) -> Self {
        Self { client, api_key }
    }

    /// Output dimensionalities the model accepts.
    fn supported_dimensions(model: &str) -> &'static [usize] {
        if model.starts_with("textembedding-gecko") {
            &[128, 256, 512, 768]
        } else {
            &[128, 256, 512, 768, 1024, 1536, 2048, 3072]
        }
    }

    async fn fetch_single(
        &self,
        model: &str,
        text: &str,
        dimensions: Option<usize>,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let bare_model = model.strip_prefix("models/").unwrap_or(model);
        let payload_model = format!("models/{}", bare_model);

        let output_dimensionality = dimensions.filter(|d| {
            let supported = Self::supported_dimensions(bare_model).contains(d);
            if !supported {
                tracing::warn!(
                    "Requested dimension {} is not supported by Google model '{}', using provider default",
                    d,
                    bare_model
                );
            }
            supported
        });

        let url = format!("{}/models/{}:embedContent", GOOGLE_API_BASE, bare_model);
        let request = EmbedContentRequest {
            model: &payload_model,
            content: ContentParts {
                parts: [TextPart { text }],
            },
            output_dimensionality,
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EmbeddingError::Api(format!("Google embedding request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| EmbeddingError::Api(format!("failed to read Google response: {}", e)))?;

        if !status.is_success() {
            return Err(EmbeddingError::from_provider_body(status.as_u16(), &body));
        }

        let parsed: EmbedContentResponse = serde_json::from_str(&body)
            .map_err(|_| EmbeddingError::Api(format!("invalid embedding payload from Google: {}", body)))?;

        let mut values = parsed.embedding.values;
        if !values.is_empty() && values.len() < 3072 {
            values = l2_normalize(values);
        }
        Ok(values)
    }
}

#[async_trait]
impl EmbeddingAdapter for GoogleEmbeddingAdapter {
    fn name(&self) -> &str {
        "google"
    }

    async fn create_embeddings(
        &self,
        model: &str,
        texts: &[String],
        dimensions: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        try_join_all(
            texts
                .iter()
                .map(|text| self.fetch_single(model, text, dimensions)),
        )
        .await
    }
}

/// L2-normalize a vector. Zero-norm vectors are returned unchanged.
fn l2_normalize(values: Vec<f32>) -> Vec<f32> {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.into_iter().map(|v| v / norm).collect()
    } else {
        tracing::warn!("Zero-norm embedding detected, returning unnormalized");
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize_unit_length() {
        let normalized = l2_normalize(vec![3.0, 4.0]);
        let norm: f32 = normalized.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector_unchanged() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_gecko_supports_fewer_dimensions() {
        assert!(GoogleEmbeddingAdapter::supported_dimensions("textembedding-gecko-001").contains(&768));
        assert!(!GoogleEmbeddingAdapter::supported_dimensions("textembedding-gecko-001").contains(&1536));
        assert!(GoogleEmbeddingAdapter::supported_dimensions("text-embedding-004").contains(&3072));
    }

    #[test]
    fn test_request_shape() {
        let req = EmbedContentRequest {
            model: "models/text-embedding-004",
            content: ContentParts {
                parts: [TextPart { text: "hello" }],
            },
            output_dimensionality: Some(768),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"outputDimensionality\":768"));
        assert!(json.contains("\"parts\":[{\"text\":\"hello\"}]"));
    }
}
