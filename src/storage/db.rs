// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Postgres plumbing shared by the storage writers: pool setup, dimension
//! routing, batched deletes with fallback, and batched inserts with retry
//! and per-row rescue.

use std::time::Duration;

use pgvector::Vector;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::StorageError;
use crate::progress::CancellationToken;

/// Connect to Postgres with sane pool bounds for a single-process server.
pub async fn connect(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Supported embedding dimensions and their column names.
pub const EMBEDDING_COLUMNS: &[(usize, &str)] = &[
    (768, "embedding_768"),
    (1024, "embedding_1024"),
    (1536, "embedding_1536"),
    (3072, "embedding_3072"),
];

/// Route a vector length to its storage column.
///
/// Returns `None` for unsupported dimensions; callers skip the row rather
/// than write a corrupted one.
pub fn embedding_column_for(dimension: usize) -> Option<&'static str> {
    EMBEDDING_COLUMNS
        .iter()
        .find(|(dim, _)| *dim == dimension)
        .map(|(_, col)| *col)
}

/// One row destined for a vector table.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub url: String,
    pub chunk_number: i32,
    pub content: String,
    /// Populated for code example rows only.
    pub summary: Option<String>,
    pub metadata: serde_json::Value,
    pub source_id: String,
    pub embedding: Vector,
    pub dimension: i32,
    pub embedding_model: String,
    pub llm_chat_model: Option<String>,
}

impl VectorRow {
    /// The embedding column this row's vector routes to, if supported.
    pub fn column(&self) -> Option<&'static str> {
        embedding_column_for(self.dimension as usize)
    }
}

/// Delete all rows for the given URLs in batches.
///
/// On a batch failure, re-attempts the full URL list at one fifth the batch
/// size - the delete is idempotent, so re-submitting already-deleted URLs is
/// safe. URLs that still fail are logged and skipped (the subsequent insert
/// for them simply accretes).
pub async fn delete_by_urls(
    pool: &PgPool,
    table: &str,
    unique_urls: &[String],
    batch_size: usize,
    cancel: &CancellationToken,
) -> crate::error::Result<()> {
    if unique_urls.is_empty() {
        return Ok(());
    }
    let batch_size = batch_size.max(1);
    let sql = format!("DELETE FROM {} WHERE url = ANY($1)", table);

    let mut batch_failed = false;
    for (index, batch) in unique_urls.chunks(batch_size).enumerate() {
        cancel.check()?;
        if let Err(e) = sqlx::query(&sql).bind(batch).execute(pool).await {
            tracing::warn!(
                "Batch delete failed on batch {}: {}. Trying smaller batches as fallback.",
                index,
                e
            );
            batch_failed = true;
            break;
        }
        if (index + 1) * batch_size < unique_urls.len() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    if batch_failed {
        let fallback_size = (batch_size / 5).max(1);
        let mut failed_urls: Vec<&String> = Vec::new();
        for batch in unique_urls.chunks(fallback_size) {
            cancel.check()?;
            if let Err(e) = sqlx::query(&sql).bind(batch).execute(pool).await {
                tracing::error!("Error deleting batch of {} URLs: {}", batch.len(), e);
                failed_urls.extend(batch);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        if !failed_urls.is_empty() {
            tracing::error!("Failed to delete {} URLs", failed_urls.len());
        }
    } else {
        tracing::info!(
            "Deleted existing records for {} URLs in batches",
            unique_urls.len()
        );
    }

    Ok(())
}

/// Insert rows with retry and per-row rescue. Returns the stored count.
///
/// Rows are grouped by embedding column so each INSERT hits exactly one
/// vector column; a group failing all retries degrades to row-by-row
/// inserts so one bad row cannot lose its batch.
pub async fn insert_rows_with_retry(
    pool: &PgPool,
    table: &str,
    rows: Vec<VectorRow>,
    cancel: &CancellationToken,
) -> crate::error::Result<usize> {
    const MAX_RETRIES: u32 = 3;
    let mut stored = 0usize;

    let mut by_column: std::collections::BTreeMap<&'static str, Vec<VectorRow>> =
        std::collections::BTreeMap::new();
    for row in rows {
        match row.column() {
            Some(column) => by_column.entry(column).or_default().push(row),
            None => {
                tracing::warn!(
                    "Unsupported embedding dimension {}, skipping row for {}",
                    row.dimension,
                    row.url
                );
            }
        }
    }

    for (column, group) in by_column {
        let mut retry_delay = Duration::from_secs(1);
        let mut inserted = false;

        for attempt in 0..MAX_RETRIES {
            cancel.check()?;
            match insert_group(pool, table, column, &group).await {
                Ok(()) => {
                    stored += group.len();
                    inserted = true;
                    break;
                }
                Err(e) if attempt + 1 < MAX_RETRIES => {
                    tracing::warn!(
                        "Error inserting batch (attempt {}/{}): {}",
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay *= 2;
                }
                Err(e) => {
                    tracing::error!("Failed to insert batch after {} attempts: {}", MAX_RETRIES, e);
                }
            }
        }

        if !inserted {
            // Last resort: individual inserts so one corrupt row cannot lose
            // the whole batch.
            let mut rescued = 0usize;
            for row in &group {
                cancel.check()?;
                match insert_group(pool, table, column, std::slice::from_ref(row)).await {
                    Ok(()) => {
                        rescued += 1;
                        stored += 1;
                    }
                    Err(e) => {
                        tracing::error!("Failed individual insert for {}: {}", row.url, e);
                    }
                }
            }
            tracing::info!("Individual inserts: {}/{} successful", rescued, group.len());
        }
    }

    Ok(stored)
}

async fn insert_group(
    pool: &PgPool,
    table: &str,
    column: &str,
    rows: &[VectorRow],
) -> Result<(), sqlx::Error> {
    if rows.is_empty() {
        return Ok(());
    }
    let with_summary = table == "archon_code_examples";
    let sql = build_insert_sql(table, column, with_summary, rows.len());

    let mut query = sqlx::query(&sql);
    for row in rows {
        query = query
            .bind(&row.url)
            .bind(row.chunk_number)
            .bind(&row.content);
        if with_summary {
            query = query.bind(row.summary.as_deref().unwrap_or_default());
        }
        query = query
            .bind(&row.metadata)
            .bind(&row.source_id)
            .bind(&row.embedding)
            .bind(row.dimension)
            .bind(&row.embedding_model)
            .bind(&row.llm_chat_model);
    }
    query.execute(pool).await?;
    Ok(())
}

fn build_insert_sql(table: &str, column: &str, with_summary: bool, row_count: usize) -> String {
    let mut columns = vec!["url", "chunk_number", "content"];
    if with_summary {
        columns.push("summary");
    }
    columns.extend([
        "metadata",
        "source_id",
        column,
        "embedding_dimension",
        "embedding_model",
        "llm_chat_model",
    ]);

    let width = columns.len();
    let mut values = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let params: Vec<String> = (1..=width).map(|i| format!("${}", row * width + i)).collect();
        values.push(format!("({})", params.join(", ")));
    }

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        values.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sql_shape() {
        let sql = build_insert_sql("archon_crawled_pages", "embedding_1536", false, 2);
        assert!(sql.starts_with("INSERT INTO archon_crawled_pages (url, chunk_number, content, metadata, source_id, embedding_1536, embedding_dimension, embedding_model, llm_chat_model) VALUES"));
        assert!(sql.contains("($1, $2, $3, $4, $5, $6, $7, $8, $9)"));
        assert!(sql.contains("($10, $11, $12, $13, $14, $15, $16, $17, $18)"));
    }

    #[test]
    fn test_insert_sql_with_summary_column() {
        let sql = build_insert_sql("archon_code_examples", "embedding_768", true, 1);
        assert!(sql.contains("summary"));
        assert!(sql.contains("($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"));
    }

    #[test]
    fn test_vector_row_column_routing() {
        let row = VectorRow {
            url: "https://x.com".into(),
            chunk_number: 0,
            content: "c".into(),
            summary: None,
            metadata: serde_json::json!({}),
            source_id: "abc".into(),
            embedding: Vector::from(vec![0.0; 3]),
            dimension: 3,
            embedding_model: "m".into(),
            llm_chat_model: None,
        };
        assert_eq!(row.column(), None);
    }

    #[test]
    fn test_dimension_routing() {
        assert_eq!(embedding_column_for(768), Some("embedding_768"));
        assert_eq!(embedding_column_for(1024), Some("embedding_1024"));
        assert_eq!(embedding_column_for(1536), Some("embedding_1536"));
        assert_eq!(embedding_column_for(3072), Some("embedding_3072"));
        assert_eq!(embedding_column_for(512), None);
        assert_eq!(embedding_column_for(0), None);
    }
}
