// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Source record lifecycle.
//!
//! Every chunk and code row references a source row by foreign key, so the
//! source upsert MUST land before any chunk write. The upsert carries an
//! LLM-generated summary with a deterministic fallback; if both the full and
//! the minimal fallback upsert fail the operation aborts - anything else
//! would violate the foreign key downstream.

use serde_json::json;
use sqlx::PgPool;

use crate::error::StorageError;
use crate::llm::{ChatMessage, LlmClientFactory};

/// Cap on content fed into the source summary prompt.
const SUMMARY_INPUT_CHARS: usize = 15_000;

/// Fields for a source upsert.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source_id: String,
    pub summary: String,
    pub word_count: i64,
    pub content_preview: String,
    pub knowledge_type: String,
    pub tags: Vec<String>,
    pub update_frequency: i64,
    pub original_url: Option<String>,
    pub source_url: Option<String>,
    pub source_display_name: Option<String>,
    /// `url` or `file`.
    pub source_type: String,
}

/// Generate an AI summary for a source from its first chunks.
///
/// Falls back to a deterministic summary on any LLM failure - source
/// creation never blocks on the model.
pub async fn extract_source_summary(
    factory: &LlmClientFactory,
    source_id: &str,
    combined_content: &str,
    page_count: usize,
) -> String {
    let fallback = format!(
        "Documentation from {} - {} pages crawled",
        source_id, page_count
    );
    if combined_content.trim().is_empty() {
        return fallback;
    }

    let bounded = head_chars(combined_content, SUMMARY_INPUT_CHARS);
    let client = match factory.chat_client(None) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Failed to create LLM client for source summary: {}", e);
            return fallback;
        }
    };

    let mut request = client.request(vec![
        ChatMessage::system(
            "You are a helpful assistant that writes concise summaries of technical content.",
        ),
        ChatMessage::user(format!(
            "<content>\n{}\n</content>\n\nWrite a 3-5 sentence summary of what this source \
             covers. Answer with the summary only.",
            bounded
        )),
    ]);
    request.max_tokens = Some(300);
    request.temperature = Some(0.3);

    match client.complete(request).await {
        Ok(completion) if !completion.content.trim().is_empty() => {
            completion.content.trim().to_string()
        }
        Ok(_) => {
            tracing::warn!("Empty summary response for source '{}', using fallback", source_id);
            fallback
        }
        Err(e) => {
            tracing::error!("Failed to generate AI summary for '{}': {}", source_id, e);
            fallback
        }
    }
}

/// Create or update a source row, with a minimal-field fallback.
///
/// Returns `StorageError::SourceUpsertFailed` only when both attempts fail.
pub async fn update_source_info(pool: &PgPool, info: &SourceInfo) -> Result<(), StorageError> {
    let title = info
        .source_display_name
        .clone()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| info.source_id.clone());

    let metadata = json!({
        "knowledge_type": info.knowledge_type,
        "tags": info.tags,
        "original_url": info.original_url,
        "source_type": info.source_type,
        "update_frequency": info.update_frequency,
        "content_preview": head_chars(&info.content_preview, 500),
    });

    let full_upsert = sqlx::query(
        r#"
        INSERT INTO archon_sources
            (source_id, source_url, source_display_name, title, summary,
             total_word_count, metadata, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, now(), now())
        ON CONFLICT (source_id) DO UPDATE SET
            source_url = EXCLUDED.source_url,
            source_display_name = EXCLUDED.source_display_name,
            title = EXCLUDED.title,
            summary = EXCLUDED.summary,
            total_word_count = EXCLUDED.total_word_count,
            metadata = EXCLUDED.metadata,
            updated_at = now()
        "#,
    )
    .bind(&info.source_id)
    .bind(&info.source_url)
    .bind(&info.source_display_name)
    .bind(&title)
    .bind(&info.summary)
    .bind(info.word_count)
    .bind(&metadata)
    .execute(pool)
    .await;

    match full_upsert {
        Ok(_) => {
            tracing::info!("Created/updated source record for '{}'", info.source_id);
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                "Failed to create/update source record for '{}': {}, attempting fallback",
                info.source_id,
                e
            );
            let fallback_metadata = json!({
                "knowledge_type": info.knowledge_type,
                "tags": info.tags,
                "auto_generated": true,
                "fallback_creation": true,
                "original_url": info.original_url,
            });
            sqlx::query(
                r#"
                INSERT INTO archon_sources
                    (source_id, title, summary, total_word_count, metadata, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, now(), now())
                ON CONFLICT (source_id) DO UPDATE SET
                    summary = EXCLUDED.summary,
                    total_word_count = EXCLUDED.total_word_count,
                    updated_at = now()
                "#,
            )
            .bind(&info.source_id)
            .bind(&info.source_id)
            .bind(&info.summary)
            .bind(info.word_count)
            .bind(&fallback_metadata)
            .execute(pool)
            .await
            .map_err(|fallback_error| {
                tracing::error!(
                    "Both source creation attempts failed for '{}': {}",
                    info.source_id,
                    fallback_error
                );
                StorageError::SourceUpsertFailed {
                    source_id: info.source_id.clone(),
                    message: format!(
                        "upsert failed ({}) and fallback failed ({})",
                        e, fallback_error
                    ),
                }
            })?;
            tracing::info!("Fallback source creation succeeded for '{}'", info.source_id);
            Ok(())
        }
    }
}

/// Verify a source row exists (pre-write FK guard).
pub async fn source_exists(pool: &PgPool, source_id: &str) -> Result<bool, StorageError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT 1::bigint FROM archon_sources WHERE source_id = $1")
            .bind(source_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.is_some())
}

/// Load the stored fields needed to refresh a source.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredSource {
    pub source_id: String,
    pub source_url: Option<String>,
    pub source_display_name: Option<String>,
    pub metadata: serde_json::Value,
}

pub async fn get_source(pool: &PgPool, source_id: &str) -> Result<Option<StoredSource>, StorageError> {
    let row = sqlx::query_as::<_, StoredSource>(
        "SELECT source_id, source_url, source_display_name, metadata FROM archon_sources WHERE source_id = $1",
    )
    .bind(source_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

fn head_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_chars_bounds() {
        assert_eq!(head_chars("hello", 3), "hel");
        assert_eq!(head_chars("hi", 10), "hi");
    }

    #[test]
    fn test_source_info_title_defaults_to_source_id() {
        // The upsert derives title from display name with a source_id
        // fallback; exercised indirectly here through the same expression.
        let display: Option<String> = Some("  ".to_string());
        let title = display
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "abc123".to_string());
        assert_eq!(title, "abc123");
    }
}
