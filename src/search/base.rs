// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Base vector search over the pgvector columns.
//!
//! The query embedding's length picks the column; similarity is cosine
//! (`1 - distance`). Optional filters: a JSONB containment match on chunk
//! metadata and an exact source id.

use pgvector::Vector;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::error::StorageError;
use crate::storage::embedding_column_for;

use super::SearchResult;

/// Vector search over document chunks.
pub async fn vector_search_documents(
    pool: &PgPool,
    query_embedding: Vec<f32>,
    match_count: usize,
    metadata_filter: Option<Value>,
    source_filter: Option<&str>,
) -> Result<Vec<SearchResult>, StorageError> {
    vector_search(
        pool,
        "archon_crawled_pages",
        false,
        query_embedding,
        match_count,
        metadata_filter,
        source_filter,
    )
    .await
}

/// Vector search over code examples.
pub async fn vector_search_code(
    pool: &PgPool,
    query_embedding: Vec<f32>,
    match_count: usize,
    metadata_filter: Option<Value>,
    source_filter: Option<&str>,
) -> Result<Vec<SearchResult>, StorageError> {
    vector_search(
        pool,
        "archon_code_examples",
        true,
        query_embedding,
        match_count,
        metadata_filter,
        source_filter,
    )
    .await
}

async fn vector_search(
    pool: &PgPool,
    table: &str,
    with_summary: bool,
    query_embedding: Vec<f32>,
    match_count: usize,
    metadata_filter: Option<Value>,
    source_filter: Option<&str>,
) -> Result<Vec<SearchResult>, StorageError> {
    let dimension = query_embedding.len();
    let Some(column) = embedding_column_for(dimension) else {
        tracing::error!("No embedding column for query dimension {}", dimension);
        return Ok(Vec::new());
    };

    let summary_select = if with_summary { "summary," } else { "" };
    let sql = format!(
        r#"
        SELECT id::text AS id, url, chunk_number, content, {summary} metadata, source_id,
               1 - ({column} <=> $1) AS similarity
        FROM {table}
        WHERE {column} IS NOT NULL
          AND ($2::jsonb IS NULL OR metadata @> $2)
          AND ($3::text IS NULL OR source_id = $3)
        ORDER BY {column} <=> $1
        LIMIT $4
        "#,
        summary = summary_select,
        column = column,
        table = table,
    );

    let rows = sqlx::query(&sql)
        .bind(Vector::from(query_embedding))
        .bind(metadata_filter)
        .bind(source_filter)
        .bind(match_count as i64)
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|row| SearchResult {
            id: row.get("id"),
            url: row.get("url"),
            chunk_number: row.get("chunk_number"),
            content: row.get("content"),
            summary: if with_summary { row.try_get("summary").ok() } else { None },
            metadata: row.get("metadata"),
            source_id: row.get("source_id"),
            similarity: row.get::<f64, _>("similarity"),
            match_type: None,
            rerank_score: None,
        })
        .collect())
}
