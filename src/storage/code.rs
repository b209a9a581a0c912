// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code example storage.
//!
//! Mirrors the document writer for the `archon_code_examples` table. The
//! embedded text is `code + "\n\nSummary: " + summary` so retrieval can match
//! on intent as well as syntax; every row records the summarizer's chat model
//! alongside the embedding model.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use pgvector::Vector;
use serde_json::Value;
use sqlx::PgPool;

use crate::embeddings::EmbeddingService;
use crate::llm::LlmClientFactory;
use crate::config::ServiceType;
use crate::progress::{CancellationToken, ProgressReporter, ProgressUpdate};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::db::{delete_by_urls, insert_rows_with_retry, VectorRow};

const TABLE: &str = "archon_code_examples";

/// Aligned per-example inputs for a code storage run.
pub struct CodeStorageRequest {
    pub urls: Vec<String>,
    pub chunk_numbers: Vec<i32>,
    pub code_examples: Vec<String>,
    pub summaries: Vec<String>,
    pub metadatas: Vec<Value>,
}

/// Store code examples with embeddings. Returns the stored count.
pub async fn add_code_examples_to_storage(
    pool: &PgPool,
    embeddings: &EmbeddingService,
    factory: &LlmClientFactory,
    request: CodeStorageRequest,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> crate::error::Result<usize> {
    if request.urls.is_empty() {
        return Ok(0);
    }

    let settings = factory.settings();
    let batch_size = settings.get_clamped("DOCUMENT_STORAGE_BATCH_SIZE", 50);
    let delete_batch_size = settings.get_clamped("DELETE_BATCH_SIZE", 50);

    // Delete existing code examples for these URLs before re-extraction.
    let mut unique_urls: Vec<String> = request.urls.clone();
    unique_urls.sort();
    unique_urls.dedup();
    delete_by_urls(pool, TABLE, &unique_urls, delete_batch_size, cancel).await?;

    let embedding_model = embeddings.embedding_model(None);
    let llm_chat_model = factory.resolve(ServiceType::Llm, None).chat_model;

    // The embedding input pairs code with its generated summary.
    let combined_texts: Vec<String> = request
        .code_examples
        .iter()
        .zip(&request.summaries)
        .map(|(code, summary)| format!("{}\n\nSummary: {}", code, summary))
        .collect();

    let total = combined_texts.len();
    let total_batches = total.div_ceil(batch_size).max(1);
    let mut completed_batches = 0usize;
    let mut total_stored = 0usize;

    let mut start = 0usize;
    while start < total {
        cancel.check()?;
        let end = (start + batch_size).min(total);
        let batch_texts = combined_texts[start..end].to_vec();

        let result = embeddings
            .create_embeddings_batch(batch_texts.clone(), None, None)
            .await;

        if result.has_failures() {
            tracing::error!(
                "Code batch {}: {} embeddings failed, {} succeeded",
                completed_batches + 1,
                result.failure_count,
                result.success_count
            );
        }

        let mut positions_by_text: HashMap<&str, VecDeque<usize>> = HashMap::new();
        for (idx, text) in batch_texts.iter().enumerate() {
            positions_by_text.entry(text.as_str()).or_default().push_back(idx);
        }

        let mut rows = Vec::with_capacity(result.embeddings.len());
        for (embedding, text) in result.embeddings.into_iter().zip(result.texts_processed) {
            let Some(j) = positions_by_text.get_mut(text.as_str()).and_then(VecDeque::pop_front)
            else {
                tracing::warn!("Could not map code embedding back to its example");
                continue;
            };
            let index = start + j;

            let metadata = &request.metadatas[index];
            let Some(source_id) = metadata.get("source_id").and_then(Value::as_str) else {
                tracing::error!(
                    "Missing source_id, skipping code example to prevent orphan records | url={}",
                    request.urls[index]
                );
                continue;
            };

            let dimension = embedding.len();
            rows.push(VectorRow {
                url: request.urls[index].clone(),
                chunk_number: request.chunk_numbers[index],
                content: request.code_examples[index].clone(),
                summary: Some(request.summaries[index].clone()),
                metadata: metadata.clone(),
                source_id: source_id.to_string(),
                embedding: Vector::from(embedding),
                dimension: dimension as i32,
                embedding_model: embedding_model.clone(),
                llm_chat_model: Some(llm_chat_model.clone()),
            });
        }

        let row_count = rows.len();
        total_stored += insert_rows_with_retry(pool, TABLE, rows, cancel).await?;
        completed_batches += 1;

        reporter
            .report(
                ProgressUpdate::new(
                    "code_storage",
                    (completed_batches as f64 / total_batches as f64) * 100.0,
                    format!(
                        "Stored code example batch {}/{} ({} examples)",
                        completed_batches, total_batches, row_count
                    ),
                )
                .with("completed_batches", completed_batches)
                .with("total_batches", total_batches)
                .with("code_examples_stored", total_stored),
            )
            .await;

        start = end;
        if start < total {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[cfg(feature = "telemetry")]
    GLOBAL_METRICS.increment("storage.code_examples_stored", total_stored as u64);

    Ok(total_stored)
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_combined_text_shape() {
        let code = "fn main() {}";
        let summary = "Entry point.";
        let combined = format!("{}\n\nSummary: {}", code, summary);
        assert!(combined.starts_with(code));
        assert!(combined.ends_with("Summary: Entry point."));
    }
}
