// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Batched embedding creation with partial-failure tracking.
//!
//! The service follows the "skip, don't corrupt" principle: a failed text is
//! recorded with its error and the batch keeps going, so callers always get
//! back a result where `success_count + failure_count == texts.len()` and
//! `embeddings[i]` corresponds to `texts_processed[i]`. Quota exhaustion is
//! the one hard stop - everything not yet processed is marked failed and the
//! partial result is returned immediately.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::config::ServiceType;
use crate::error::EmbeddingError;
use crate::llm::rate_limiter::{RateLimiter, WaitObserver};
use crate::llm::{LlmClientFactory, LlmProvider};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::base::EmbeddingAdapter;
use super::google::GoogleEmbeddingAdapter;
use super::openai::OpenAiCompatibleAdapter;

/// Retries per batch on transient rate limits.
const MAX_RETRIES: u32 = 3;

/// Callback for embedding progress (including rate-limit heartbeats).
#[async_trait]
pub trait EmbeddingProgress: Send + Sync {
    async fn report(&self, message: &str, percent: f64);
}

/// A failed text with its error details.
#[derive(Debug, Clone)]
pub struct FailedItem {
    /// First 200 chars of the failed text.
    pub text_preview: String,
    /// Human-readable error.
    pub error: String,
    /// Stable error type (`quota_exhausted`, `rate_limit`, `api_error`, ...).
    pub error_type: &'static str,
    /// Index of the batch the failure happened in, if known.
    pub batch_index: Option<usize>,
}

/// Result of batch embedding creation with success/failure tracking.
#[derive(Debug, Default)]
pub struct EmbeddingBatchResult {
    /// Successful embeddings, positionally aligned with `texts_processed`.
    pub embeddings: Vec<Vec<f32>>,
    /// Per-item failures.
    pub failed_items: Vec<FailedItem>,
    pub success_count: usize,
    pub failure_count: usize,
    /// Successfully processed texts, positionally aligned with `embeddings`.
    pub texts_processed: Vec<String>,
}

impl EmbeddingBatchResult {
    fn add_success(&mut self, embedding: Vec<f32>, text: String) {
        self.embeddings.push(embedding);
        self.texts_processed.push(text);
        self.success_count += 1;
    }

    fn add_failure(&mut self, text: &str, error: &EmbeddingError, batch_index: Option<usize>) {
        self.failed_items.push(FailedItem {
            text_preview: text.chars().take(200).collect(),
            error: error.to_string(),
            error_type: error.error_type(),
            batch_index,
        });
        self.failure_count += 1;
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count > 0
    }

    pub fn total_requested(&self) -> usize {
        self.success_count + self.failure_count
    }
}

/// Bridges rate-limiter waits into the caller's progress callback.
struct RateLimitHeartbeat<'a> {
    progress: &'a dyn EmbeddingProgress,
    processed: usize,
    total: usize,
}

#[async_trait]
impl WaitObserver for RateLimitHeartbeat<'_> {
    async fn on_wait(&self, remaining_seconds: f64) {
        let percent = if self.total > 0 {
            (self.processed as f64 / self.total as f64) * 100.0
        } else {
            0.0
        };
        self.progress
            .report(
                &format!("Rate limited: waiting {:.1}s more...", remaining_seconds),
                percent,
            )
            .await;
    }
}

/// Batched, rate-limited embedding creation.
pub struct EmbeddingService {
    factory: LlmClientFactory,
    limiter: Arc<RateLimiter>,
}

impl EmbeddingService {
    pub fn new(factory: LlmClientFactory, limiter: Arc<RateLimiter>) -> Self {
        Self { factory, limiter }
    }

    /// The model name embeddings are created with (recorded on stored rows).
    pub fn embedding_model(&self, provider_override: Option<&str>) -> String {
        self.factory
            .resolve(ServiceType::Embedding, provider_override)
            .embedding_model
    }

    fn build_adapter(
        &self,
        provider: LlmProvider,
        base_url: &str,
        api_key: Option<String>,
    ) -> Result<Box<dyn EmbeddingAdapter>, EmbeddingError> {
        match provider {
            LlmProvider::Google => {
                let key = api_key.ok_or_else(|| EmbeddingError::AuthenticationFailed {
                    provider: "google".to_string(),
                    message: "Google API key not found".to_string(),
                })?;
                Ok(Box::new(GoogleEmbeddingAdapter::new(
                    self.factory.http().clone(),
                    key,
                )))
            }
            _ => Ok(Box::new(OpenAiCompatibleAdapter::new(
                self.factory.http().clone(),
                base_url,
                api_key,
                provider.as_str(),
            ))),
        }
    }

    /// Create an embedding for a single text.
    ///
    /// Used by the query path and the ingest API-key probe; failures surface
    /// as the specific error from the underlying batch result.
    pub async fn create_embedding(
        &self,
        text: &str,
        provider_override: Option<&str>,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let result = self
            .create_embeddings_batch(vec![text.to_string()], None, provider_override)
            .await;
        if let Some(embedding) = result.embeddings.into_iter().next() {
            return Ok(embedding);
        }
        match result.failed_items.into_iter().next() {
            Some(item) => Err(match item.error_type {
                "quota_exhausted" => EmbeddingError::QuotaExhausted(item.error),
                "rate_limit" => EmbeddingError::RateLimited(item.error),
                "authentication_failed" => EmbeddingError::AuthenticationFailed {
                    provider: "unknown".to_string(),
                    message: item.error,
                },
                _ => EmbeddingError::Api(item.error),
            }),
            None => Err(EmbeddingError::Api(
                "no embeddings returned from batch creation".to_string(),
            )),
        }
    }

    /// Create embeddings for multiple texts with graceful failure handling.
    pub async fn create_embeddings_batch(
        &self,
        texts: Vec<String>,
        progress: Option<&dyn EmbeddingProgress>,
        provider_override: Option<&str>,
    ) -> EmbeddingBatchResult {
        let mut result = EmbeddingBatchResult::default();
        if texts.is_empty() {
            return result;
        }

        let started = Instant::now();
        let settings = self.factory.settings();
        let batch_size = settings.get_clamped("EMBEDDING_BATCH_SIZE", 100);
        let configured_dims = settings.get_i64("EMBEDDING_DIMENSIONS", 1536);
        let dimensions = (configured_dims > 0).then_some(configured_dims as usize);

        let resolved = self.factory.resolve(ServiceType::Embedding, provider_override);
        tracing::info!(
            "Creating embeddings for {} texts with provider '{}' model '{}'",
            texts.len(),
            resolved.provider.as_str(),
            resolved.embedding_model
        );

        let adapter = match self.build_adapter(
            resolved.provider,
            &resolved.base_url,
            resolved.api_key.clone(),
        ) {
            Ok(adapter) => adapter,
            Err(e) => {
                for text in &texts {
                    result.add_failure(text, &e, None);
                }
                return result;
            }
        };

        let total = texts.len();
        let mut start = 0usize;
        let mut batch_index = 0usize;

        while start < total {
            let end = (start + batch_size).min(total);
            let batch = &texts[start..end];

            // Estimate tokens for this batch
            let batch_tokens: u64 = batch
                .iter()
                .map(|t| (t.split_whitespace().count() as f64 * 1.3) as u64)
                .sum();

            let heartbeat = progress.map(|p| RateLimitHeartbeat {
                progress: p,
                processed: result.total_requested(),
                total,
            });

            let _permit = match self
                .limiter
                .acquire(
                    batch_tokens,
                    heartbeat.as_ref().map(|h| h as &dyn WaitObserver),
                )
                .await
            {
                Ok(permit) => permit,
                Err(e) => {
                    for text in batch {
                        result.add_failure(text, &e, Some(batch_index));
                    }
                    start = end;
                    batch_index += 1;
                    continue;
                }
            };

            let mut attempt = 0u32;
            loop {
                match adapter
                    .create_embeddings(&resolved.embedding_model, batch, dimensions)
                    .await
                {
                    Ok(embeddings) => {
                        for (text, vector) in batch.iter().zip(embeddings) {
                            result.add_success(vector, text.clone());
                        }
                        break;
                    }
                    Err(EmbeddingError::QuotaExhausted(message)) => {
                        // Quota exhausted is critical - stop everything and
                        // mark every unprocessed text failed.
                        tracing::error!(
                            "Quota exhausted at batch {}! Processed {} texts successfully.",
                            batch_index,
                            result.success_count
                        );
                        let error = EmbeddingError::QuotaExhausted(message);
                        for text in &texts[start..] {
                            result.add_failure(text, &error, Some(batch_index));
                        }
                        return result;
                    }
                    Err(e) if e.is_retryable() && attempt < MAX_RETRIES => {
                        attempt += 1;
                        let wait = Duration::from_secs(1u64 << (attempt - 1)); // 1s, 2s, 4s
                        tracing::warn!(
                            "Rate limit hit for batch {}, waiting {:?} before retry {}/{}",
                            batch_index,
                            wait,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(wait).await;
                    }
                    Err(e) => {
                        tracing::error!("Batch {} failed: {}", batch_index, e);
                        for text in batch {
                            result.add_failure(text, &e, Some(batch_index));
                        }
                        break;
                    }
                }
            }

            if let Some(p) = progress {
                let processed = result.total_requested();
                let mut message = format!("Processed {}/{} texts", processed, total);
                if result.has_failures() {
                    message.push_str(&format!(" ({} failed)", result.failure_count));
                }
                p.report(&message, (processed as f64 / total as f64) * 100.0)
                    .await;
            }

            start = end;
            batch_index += 1;

            // Yield control between batches
            tokio::task::yield_now().await;
        }

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation("embeddings.batch", started.elapsed());
            GLOBAL_METRICS.increment("embeddings.created", result.success_count as u64);
            GLOBAL_METRICS.increment("embeddings.failed", result.failure_count as u64);
        }
        #[cfg(not(feature = "telemetry"))]
        let _ = started;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_result_accounting() {
        let mut result = EmbeddingBatchResult::default();
        result.add_success(vec![0.1, 0.2], "first".to_string());
        result.add_failure(
            "second",
            &EmbeddingError::Api("boom".to_string()),
            Some(0),
        );

        assert_eq!(result.success_count, 1);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.total_requested(), 2);
        assert!(result.has_failures());
        assert_eq!(result.embeddings.len(), result.texts_processed.len());
        assert_eq!(result.failed_items[0].error_type, "api_error");
    }

    #[test]
    fn test_failure_preview_truncated_to_200_chars() {
        let mut result = EmbeddingBatchResult::default();
        let long_text = "x".repeat(500);
        result.add_failure(&long_text, &EmbeddingError::Api("e".to_string()), None);
        assert_eq!(result.failed_items[0].text_preview.len(), 200);
    }

    #[test]
    fn test_success_and_failure_counts_cover_all_texts() {
        // Invariant 6: success_count + failure_count == len(texts) regardless
        // of the mix.
        let mut result = EmbeddingBatchResult::default();
        let texts = ["a", "b", "c", "d"];
        for (i, t) in texts.iter().enumerate() {
            if i % 2 == 0 {
                result.add_success(vec![0.0], t.to_string());
            } else {
                result.add_failure(t, &EmbeddingError::RateLimited("slow".into()), Some(i));
            }
        }
        assert_eq!(result.total_requested(), texts.len());
    }
}
