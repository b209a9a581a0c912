// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Document chunk storage.
//!
//! Delete-then-insert keyed on URL gives re-ingests idempotence without
//! transactions. Within each write slice: optional contextual prefixes,
//! batched embeddings, positional re-pairing of vectors to chunks (duplicate
//! texts handled by per-text index queues), dimension-routed rows, and a
//! retry-then-row-by-row insert. Chunks without a `source_id` are dropped to
//! protect the foreign key.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use serde_json::Value;
use sqlx::PgPool;

use crate::config::ServiceType;
use crate::embeddings::{generate_contextual_embeddings_batch, EmbeddingProgress, EmbeddingService};
use crate::llm::LlmClientFactory;
use crate::progress::{CancellationToken, ProgressReporter, ProgressUpdate};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::db::{delete_by_urls, insert_rows_with_retry, VectorRow};

const TABLE: &str = "archon_crawled_pages";

/// Aligned per-chunk inputs for a storage run.
pub struct DocumentStorageRequest {
    pub urls: Vec<String>,
    pub chunk_numbers: Vec<i32>,
    pub contents: Vec<String>,
    pub metadatas: Vec<Value>,
    pub url_to_full_document: HashMap<String, String>,
}

/// Outcome of a storage run.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentStorageResult {
    pub chunks_stored: usize,
}

/// Forwards embedding rate-limit heartbeats into the storage progress stream.
struct RateLimitForwarder<'a> {
    reporter: &'a dyn ProgressReporter,
    stage_progress: f64,
    current_batch: usize,
}

#[async_trait]
impl EmbeddingProgress for RateLimitForwarder<'_> {
    async fn report(&self, message: &str, _percent: f64) {
        if message.to_lowercase().contains("rate limit") {
            self.reporter
                .report(
                    ProgressUpdate::new("document_storage", self.stage_progress, message)
                        .with("current_batch", self.current_batch)
                        .with("event", "rate_limit_wait"),
                )
                .await;
        }
    }
}

/// Store document chunks with embeddings.
///
/// Returns the number of chunks actually written; callers compare against
/// the processed count to fail fast on silent storage loss.
pub async fn add_documents_to_storage(
    pool: &PgPool,
    embeddings: &EmbeddingService,
    factory: &LlmClientFactory,
    mut request: DocumentStorageRequest,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> crate::error::Result<DocumentStorageResult> {
    let settings = factory.settings();
    let batch_size = settings.get_clamped("DOCUMENT_STORAGE_BATCH_SIZE", 50);
    let delete_batch_size = settings.get_clamped("DELETE_BATCH_SIZE", 50);
    let use_contextual = settings.get_bool("USE_CONTEXTUAL_EMBEDDINGS", false);
    let contextual_batch_size = settings.get_clamped("CONTEXTUAL_EMBEDDING_BATCH_SIZE", 50);
    let max_workers = settings.get_clamped("CONTEXTUAL_EMBEDDINGS_MAX_WORKERS", 4);

    // Delete phase: clear prior rows for these URLs.
    let mut unique_urls: Vec<String> = request.urls.clone();
    unique_urls.sort();
    unique_urls.dedup();
    delete_by_urls(pool, TABLE, &unique_urls, delete_batch_size, cancel).await?;

    let embedding_model = embeddings.embedding_model(None);
    let llm_chat_model: Option<String> =
        use_contextual.then(|| factory.resolve(ServiceType::Llm, None).chat_model);

    let total_chunks = request.contents.len();
    let total_batches = total_chunks.div_ceil(batch_size).max(1);
    let mut completed_batches = 0usize;
    let mut total_stored = 0usize;

    let mut start = 0usize;
    let mut batch_num = 0usize;
    while start < total_chunks {
        cancel.check()?;
        batch_num += 1;
        let end = (start + batch_size).min(total_chunks);

        let batch_urls = &request.urls[start..end];
        let batch_chunk_numbers = &request.chunk_numbers[start..end];
        let batch_contents = &request.contents[start..end];

        let stage_progress = (completed_batches as f64 / total_batches as f64) * 100.0;
        reporter
            .report(
                ProgressUpdate::new(
                    "document_storage",
                    stage_progress,
                    format!(
                        "Processing batch {}/{} ({} chunks)",
                        batch_num,
                        total_batches,
                        batch_contents.len()
                    ),
                )
                .with("current_batch", batch_num)
                .with("total_batches", total_batches)
                .with("completed_batches", completed_batches)
                .with("chunks_in_batch", batch_contents.len())
                .with("active_workers", if use_contextual { max_workers } else { 1 }),
            )
            .await;

        // Contextual embedding stage, sub-batched to bound token use.
        let contextual_contents: Vec<String> = if use_contextual {
            match build_contextual_contents(
                factory,
                batch_urls,
                batch_contents,
                &request.url_to_full_document,
                &mut request.metadatas[start..end],
                contextual_batch_size,
                cancel,
            )
            .await
            {
                Ok(contents) => contents,
                Err(e) => {
                    if e.downcast_ref::<crate::error::OperationCancelled>().is_some() {
                        return Err(e);
                    }
                    tracing::error!("Error in batch contextual embedding: {}", e);
                    tracing::warn!(
                        "Batch {}: Falling back to original content due to error",
                        batch_num
                    );
                    batch_contents.to_vec()
                }
            }
        } else {
            batch_contents.to_vec()
        };

        // Embed the slice, forwarding rate-limit waits to the tracker.
        let forwarder = RateLimitForwarder {
            reporter,
            stage_progress,
            current_batch: batch_num,
        };
        let result = embeddings
            .create_embeddings_batch(contextual_contents.clone(), Some(&forwarder), None)
            .await;

        if result.has_failures() {
            tracing::error!(
                "Batch {}: Failed to create {} embeddings. Successful: {}",
                batch_num,
                result.failure_count,
                result.success_count
            );
        }

        if result.embeddings.is_empty() {
            tracing::warn!("Skipping batch {} - no successful embeddings created", batch_num);
            completed_batches += 1;
            start = end;
            continue;
        }

        // Map surviving vectors back to their original chunk indices. A
        // per-text queue of positions keeps duplicate texts paired correctly
        // where a naive zip would mis-align after failures.
        let mut positions_by_text: HashMap<&str, VecDeque<usize>> = HashMap::new();
        for (idx, text) in contextual_contents.iter().enumerate() {
            positions_by_text.entry(text.as_str()).or_default().push_back(idx);
        }

        let mut rows = Vec::with_capacity(result.embeddings.len());
        for (embedding, text) in result.embeddings.into_iter().zip(result.texts_processed) {
            let Some(j) = positions_by_text.get_mut(text.as_str()).and_then(VecDeque::pop_front)
            else {
                let preview: String = text.chars().take(50).collect();
                tracing::warn!(
                    "Could not map embedding back to original text (no remaining index for {:?}...)",
                    preview
                );
                continue;
            };

            let metadata = &request.metadatas[start + j];
            let Some(source_id) = metadata.get("source_id").and_then(Value::as_str) else {
                tracing::error!(
                    "Missing source_id, skipping chunk to prevent orphan records | url={} | chunk={}",
                    batch_urls[j],
                    batch_chunk_numbers[j]
                );
                continue;
            };

            let dimension = embedding.len();
            let mut row_metadata = metadata.clone();
            if let Some(object) = row_metadata.as_object_mut() {
                object.insert("chunk_size".to_string(), Value::from(text.len()));
            }

            rows.push(VectorRow {
                url: batch_urls[j].clone(),
                chunk_number: batch_chunk_numbers[j],
                content: text,
                summary: None,
                metadata: row_metadata,
                source_id: source_id.to_string(),
                embedding: Vector::from(embedding),
                dimension: dimension as i32,
                embedding_model: embedding_model.clone(),
                llm_chat_model: llm_chat_model.clone(),
            });
        }

        let row_count = rows.len();
        let stored = insert_rows_with_retry(pool, TABLE, rows, cancel).await?;
        total_stored += stored;
        completed_batches += 1;

        reporter
            .report(
                ProgressUpdate::new(
                    "document_storage",
                    (completed_batches as f64 / total_batches as f64) * 100.0,
                    format!(
                        "Completed batch {}/{} ({} chunks)",
                        batch_num, total_batches, row_count
                    ),
                )
                .with("completed_batches", completed_batches)
                .with("total_batches", total_batches)
                .with("current_batch", batch_num)
                .with("chunks_processed", row_count)
                .with("active_workers", if use_contextual { max_workers } else { 1 }),
            )
            .await;

        start = end;
        if start < total_chunks {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    reporter
        .report(
            ProgressUpdate::new(
                "document_storage",
                100.0,
                format!(
                    "Document storage completed: {} chunks stored in {} batches",
                    total_stored, total_batches
                ),
            )
            .with("completed_batches", total_batches)
            .with("total_batches", total_batches)
            .with("current_batch", total_batches)
            .with("chunks_processed", total_chunks),
        )
        .await;

    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.increment("storage.chunks_stored", total_stored as u64);

    Ok(DocumentStorageResult {
        chunks_stored: total_stored,
    })
}

/// Run the contextual embedder over a slice in sub-batches, marking
/// `metadata.contextual_embedding = true` on each chunk whose context call
/// succeeded.
async fn build_contextual_contents(
    factory: &LlmClientFactory,
    batch_urls: &[String],
    batch_contents: &[String],
    url_to_full_document: &HashMap<String, String>,
    batch_metadatas: &mut [Value],
    contextual_batch_size: usize,
    cancel: &CancellationToken,
) -> crate::error::Result<Vec<String>> {
    let client = factory.chat_client(None)?;

    let full_documents: Vec<String> = batch_urls
        .iter()
        .map(|url| url_to_full_document.get(url).cloned().unwrap_or_default())
        .collect();

    let mut contextual_contents = Vec::with_capacity(batch_contents.len());
    let mut successful = 0usize;

    let mut offset = 0usize;
    while offset < batch_contents.len() {
        cancel.check()?;
        let end = (offset + contextual_batch_size).min(batch_contents.len());

        let results = generate_contextual_embeddings_batch(
            &client,
            &full_documents[offset..end],
            &batch_contents[offset..end],
        )
        .await;

        for (idx, (text, applied)) in results.into_iter().enumerate() {
            contextual_contents.push(text);
            if applied {
                if let Some(object) = batch_metadatas[offset + idx].as_object_mut() {
                    object.insert("contextual_embedding".to_string(), Value::Bool(true));
                }
                successful += 1;
            }
        }

        offset = end;
    }

    tracing::info!(
        "Generated {}/{} contextual embeddings (sub-batch size: {})",
        successful,
        batch_contents.len(),
        contextual_batch_size
    );
    Ok(contextual_contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_texts_map_to_distinct_indices() {
        // Mirrors the writer's positional re-pairing: two identical texts
        // must consume two distinct queue entries.
        let contents = ["same", "same", "other"];
        let mut positions: HashMap<&str, VecDeque<usize>> = HashMap::new();
        for (idx, text) in contents.iter().enumerate() {
            positions.entry(text).or_default().push_back(idx);
        }

        assert_eq!(positions.get_mut("same").unwrap().pop_front(), Some(0));
        assert_eq!(positions.get_mut("same").unwrap().pop_front(), Some(1));
        assert_eq!(positions.get_mut("same").unwrap().pop_front(), None);
        assert_eq!(positions.get_mut("other").unwrap().pop_front(), Some(2));
    }
}
