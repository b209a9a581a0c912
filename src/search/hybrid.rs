// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Hybrid search strategy.
//!
//! Delegates to the server-side Postgres functions that union vector cosine
//! similarity with full-text tsvector matching and annotate each row with
//! where it matched (`vector`, `text`, or `both`). Failures degrade to an
//! empty result set so the coordinator can fall back.

use pgvector::Vector;
use serde_json::Value;
use sqlx::{PgPool, Row};

use super::SearchResult;

/// Hybrid search over document chunks via
/// `hybrid_search_archon_crawled_pages`.
pub async fn hybrid_search_documents(
    pool: &PgPool,
    query_embedding: Vec<f32>,
    query_text: &str,
    match_count: usize,
    metadata_filter: Option<Value>,
    source_filter: Option<&str>,
) -> Vec<SearchResult> {
    let sql = r#"
        SELECT id::text AS id, url, chunk_number, content, metadata, source_id, similarity, match_type
        FROM hybrid_search_archon_crawled_pages($1, $2, $3, $4, $5)
    "#;

    let outcome = sqlx::query(sql)
        .bind(Vector::from(query_embedding))
        .bind(query_text)
        .bind(match_count as i64)
        .bind(metadata_filter.unwrap_or_else(|| Value::Object(Default::default())))
        .bind(source_filter)
        .fetch_all(pool)
        .await;

    match outcome {
        Ok(rows) => {
            let results: Vec<SearchResult> = rows
                .into_iter()
                .map(|row| SearchResult {
                    id: row.get("id"),
                    url: row.get("url"),
                    chunk_number: row.get("chunk_number"),
                    content: row.get("content"),
                    summary: None,
                    metadata: row.get("metadata"),
                    source_id: row.get("source_id"),
                    similarity: row.get::<f64, _>("similarity"),
                    match_type: row.try_get::<String, _>("match_type").ok(),
                    rerank_score: None,
                })
                .collect();
            log_match_types("documents", &results);
            results
        }
        Err(e) => {
            tracing::error!("Hybrid document search failed: {}", e);
            Vec::new()
        }
    }
}

/// Hybrid search over code examples via `hybrid_search_archon_code_examples`.
pub async fn hybrid_search_code(
    pool: &PgPool,
    query_embedding: Vec<f32>,
    query_text: &str,
    match_count: usize,
    metadata_filter: Option<Value>,
    source_filter: Option<&str>,
) -> Vec<SearchResult> {
    let sql = r#"
        SELECT id::text AS id, url, chunk_number, content, summary, metadata, source_id, similarity, match_type
        FROM hybrid_search_archon_code_examples($1, $2, $3, $4, $5)
    "#;

    let outcome = sqlx::query(sql)
        .bind(Vector::from(query_embedding))
        .bind(query_text)
        .bind(match_count as i64)
        .bind(metadata_filter.unwrap_or_else(|| Value::Object(Default::default())))
        .bind(source_filter)
        .fetch_all(pool)
        .await;

    match outcome {
        Ok(rows) => {
            let results: Vec<SearchResult> = rows
                .into_iter()
                .map(|row| SearchResult {
                    id: row.get("id"),
                    url: row.get("url"),
                    chunk_number: row.get("chunk_number"),
                    content: row.get("content"),
                    summary: row.try_get("summary").ok(),
                    metadata: row.get("metadata"),
                    source_id: row.get("source_id"),
                    similarity: row.get::<f64, _>("similarity"),
                    match_type: row.try_get::<String, _>("match_type").ok(),
                    rerank_score: None,
                })
                .collect();
            log_match_types("code examples", &results);
            results
        }
        Err(e) => {
            tracing::error!("Hybrid code example search failed: {}", e);
            Vec::new()
        }
    }
}

fn log_match_types(what: &str, results: &[SearchResult]) {
    let mut vector = 0;
    let mut text = 0;
    let mut both = 0;
    for result in results {
        match result.match_type.as_deref() {
            Some("vector") => vector += 1,
            Some("text") => text += 1,
            Some("both") => both += 1,
            _ => {}
        }
    }
    tracing::debug!(
        "Hybrid search returned {} {} (vector={}, text={}, both={})",
        results.len(),
        what,
        vector,
        text,
        both
    );
}
