// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! RAG query coordinator.
//!
//! Pipeline: embed the query, search (hybrid when enabled, base vector
//! otherwise), rerank when a reranker is loaded (with 5x candidate
//! over-fetch), and optionally group chunk hits into parent pages. Older
//! rows without `page_id` silently downgrade a pages request to chunks.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Row};

use crate::config::SettingsCache;
use crate::embeddings::EmbeddingService;
use crate::error::Result;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::rerank::{HttpReranker, Reranker};
use super::{base, hybrid, SearchResult};

/// Over-fetch multiplier applied when reranking is enabled.
const RERANK_OVERFETCH: usize = 5;

/// Max characters of chunk content returned to clients.
const RESPONSE_CONTENT_CHARS: usize = 1000;

/// A page-level result produced by grouping chunk hits.
#[derive(Debug, Clone, Serialize)]
pub struct PageResultEntry {
    pub page_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    pub word_count: i64,
    pub chunk_matches: usize,
    pub aggregate_similarity: f64,
    pub average_similarity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

/// Either raw chunks or grouped pages.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RagResults {
    Chunks(Vec<SearchResult>),
    Pages(Vec<PageResultEntry>),
}

impl RagResults {
    pub fn len(&self) -> usize {
        match self {
            Self::Chunks(chunks) => chunks.len(),
            Self::Pages(pages) => pages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Response shape for RAG queries.
#[derive(Debug, Clone, Serialize)]
pub struct RagQueryResponse {
    pub results: RagResults,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub match_count: usize,
    pub total_found: usize,
    pub search_mode: &'static str,
    pub reranking_applied: bool,
    pub return_mode: &'static str,
}

/// Composes search, reranking and page grouping.
pub struct RagService {
    pool: PgPool,
    settings: Arc<SettingsCache>,
    embeddings: Arc<EmbeddingService>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RagService {
    pub fn new(
        pool: PgPool,
        settings: Arc<SettingsCache>,
        embeddings: Arc<EmbeddingService>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        Self {
            pool,
            settings,
            embeddings,
            reranker,
        }
    }

    /// Build the service, loading the HTTP reranker when `RERANKER_URL` is
    /// configured.
    pub fn from_settings(
        pool: PgPool,
        settings: Arc<SettingsCache>,
        embeddings: Arc<EmbeddingService>,
        http: reqwest::Client,
    ) -> Self {
        let reranker: Option<Arc<dyn Reranker>> = settings
            .get("RERANKER_URL")
            .map(|endpoint| Arc::new(HttpReranker::new(http, endpoint)) as Arc<dyn Reranker>);
        Self::new(pool, settings, embeddings, reranker)
    }

    fn reranking_enabled(&self) -> bool {
        self.settings.get_bool("USE_RERANKING", false) && self.reranker.is_some()
    }

    /// Document search with hybrid capability.
    pub async fn search_documents(
        &self,
        query: &str,
        match_count: usize,
        source_filter: Option<&str>,
        use_hybrid: bool,
    ) -> Vec<SearchResult> {
        let query_embedding = match self.embeddings.create_embedding(query, None).await {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::error!("Failed to create embedding for query: {}", e);
                return Vec::new();
            }
        };

        if use_hybrid {
            hybrid::hybrid_search_documents(
                &self.pool,
                query_embedding,
                query,
                match_count,
                None,
                source_filter,
            )
            .await
        } else {
            base::vector_search_documents(&self.pool, query_embedding, match_count, None, source_filter)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("Document search failed: {}", e);
                    Vec::new()
                })
        }
    }

    /// Unified RAG query: search -> rerank -> optional page grouping.
    pub async fn perform_rag_query(
        &self,
        query: &str,
        source: Option<&str>,
        match_count: usize,
        return_mode: &str,
    ) -> Result<RagQueryResponse> {
        let started = Instant::now();
        tracing::info!(
            "RAG query started: {}",
            &query[..query.len().min(100)]
        );

        let use_hybrid = self.settings.get_bool("USE_HYBRID_SEARCH", false);
        let use_reranking = self.reranking_enabled();

        // Over-fetch so the reranker selects from a broader pool.
        let search_match_count = if use_reranking {
            match_count * RERANK_OVERFETCH
        } else {
            match_count
        };

        let mut results = self
            .search_documents(query, search_match_count, source, use_hybrid)
            .await;
        for result in &mut results {
            result.truncate_content(RESPONSE_CONTENT_CHARS);
        }

        let mut reranking_applied = false;
        if use_reranking && !results.is_empty() {
            if let Some(reranker) = self.reranker.as_ref() {
                match reranker.rerank(query, results.clone(), match_count).await {
                    Ok(reranked) => {
                        results = reranked;
                        reranking_applied = true;
                    }
                    Err(e) => {
                        tracing::warn!("Reranking failed: {}", e);
                        results.truncate(match_count);
                    }
                }
            }
        }

        // Group into pages only when the data can support it.
        let mut return_mode_actual = "chunks";
        let final_results = if return_mode == "pages" {
            let has_page_ids = results
                .iter()
                .any(|r| r.metadata.get("page_id").is_some_and(|v| !v.is_null()));
            if has_page_ids {
                return_mode_actual = "pages";
                RagResults::Pages(self.group_chunks_by_pages(&results, match_count).await)
            } else {
                tracing::info!("No page_ids found in results, returning chunks instead of pages");
                RagResults::Chunks(results)
            }
        } else {
            RagResults::Chunks(results)
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("rag.query", started.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = started;

        let total_found = final_results.len();
        tracing::info!("RAG query completed - {} {} found", total_found, return_mode_actual);

        Ok(RagQueryResponse {
            results: final_results,
            query: query.to_string(),
            source: source.map(str::to_string),
            match_count,
            total_found,
            search_mode: if use_hybrid { "hybrid" } else { "vector" },
            reranking_applied,
            return_mode: return_mode_actual,
        })
    }

    /// Code example search, gated by `USE_AGENTIC_RAG`.
    pub async fn search_code_examples_service(
        &self,
        query: &str,
        source_id: Option<&str>,
        match_count: usize,
    ) -> Result<RagQueryResponse> {
        if !self.settings.get_bool("USE_AGENTIC_RAG", false) {
            anyhow::bail!(
                "Code example extraction is disabled. Enable USE_AGENTIC_RAG setting to use this feature."
            );
        }

        let use_hybrid = self.settings.get_bool("USE_HYBRID_SEARCH", false);
        let use_reranking = self.reranking_enabled();
        let search_match_count = if use_reranking {
            match_count * RERANK_OVERFETCH
        } else {
            match_count
        };

        let query_embedding = self
            .embeddings
            .create_embedding(query, None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create embedding for code example query: {}", e))?;

        let mut results = if use_hybrid {
            hybrid::hybrid_search_code(
                &self.pool,
                query_embedding,
                query,
                search_match_count,
                None,
                source_id,
            )
            .await
        } else {
            base::vector_search_code(&self.pool, query_embedding, search_match_count, None, source_id)
                .await
                .unwrap_or_else(|e| {
                    tracing::error!("Code example search failed: {}", e);
                    Vec::new()
                })
        };

        let mut reranking_applied = false;
        if use_reranking && !results.is_empty() {
            if let Some(reranker) = self.reranker.as_ref() {
                match reranker.rerank(query, results.clone(), match_count).await {
                    Ok(reranked) => {
                        results = reranked;
                        reranking_applied = true;
                    }
                    Err(e) => {
                        tracing::warn!("Code example reranking failed: {}", e);
                        results.truncate(match_count);
                    }
                }
            }
        }

        let total_found = results.len();
        Ok(RagQueryResponse {
            results: RagResults::Chunks(results),
            query: query.to_string(),
            source: source_id.map(str::to_string),
            match_count,
            total_found,
            search_mode: if use_hybrid { "hybrid" } else { "vector" },
            reranking_applied,
            return_mode: "chunks",
        })
    }

    /// Group chunk results by `page_id` (falling back to URL) and score each
    /// page by mean similarity boosted by match count.
    async fn group_chunks_by_pages(
        &self,
        results: &[SearchResult],
        match_count: usize,
    ) -> Vec<PageResultEntry> {
        struct Group {
            page_id: Option<String>,
            url: Option<String>,
            chunk_matches: usize,
            total_similarity: f64,
            source_id: Option<String>,
        }

        let mut groups: Vec<(String, Group)> = Vec::new();
        for result in results {
            let page_id = result
                .metadata
                .get("page_id")
                .and_then(Value::as_str)
                .map(str::to_string);
            let url = result
                .metadata
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| Some(result.url.clone()));

            let Some(key) = page_id.clone().or_else(|| url.clone()) else {
                continue;
            };

            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => {
                    group.chunk_matches += 1;
                    group.total_similarity += result.similarity;
                }
                None => groups.push((
                    key,
                    Group {
                        page_id,
                        url,
                        chunk_matches: 1,
                        total_similarity: result.similarity,
                        source_id: Some(result.source_id.clone()),
                    },
                )),
            }
        }

        let mut pages = Vec::new();
        for (_, group) in groups {
            let average = group.total_similarity / group.chunk_matches as f64;
            let aggregate = aggregate_similarity(average, group.chunk_matches);

            let page_row = match (&group.page_id, &group.url) {
                (Some(page_id), _) => {
                    sqlx::query(
                        "SELECT id::text AS id, url, section_title, word_count::bigint AS word_count \
                         FROM archon_page_metadata WHERE id::text = $1",
                    )
                    .bind(page_id)
                    .fetch_optional(&self.pool)
                    .await
                }
                (None, Some(url)) => {
                    sqlx::query(
                        "SELECT id::text AS id, url, section_title, word_count::bigint AS word_count \
                         FROM archon_page_metadata WHERE url = $1",
                    )
                    .bind(url)
                    .fetch_optional(&self.pool)
                    .await
                }
                (None, None) => Ok(None),
            };

            if let Ok(Some(row)) = page_row {
                pages.push(PageResultEntry {
                    page_id: row.get("id"),
                    url: row.get("url"),
                    section_title: row.try_get("section_title").ok(),
                    word_count: row.try_get("word_count").unwrap_or(0),
                    chunk_matches: group.chunk_matches,
                    aggregate_similarity: aggregate,
                    average_similarity: average,
                    source_id: group.source_id,
                });
            }
        }

        pages.sort_by(|a, b| {
            b.aggregate_similarity
                .partial_cmp(&a.aggregate_similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        pages.truncate(match_count);
        pages
    }
}

/// `mean(sim) * (1 + min(0.2, matches * 0.02))` - more matching chunks lift
/// a page, capped at a 20% boost.
pub fn aggregate_similarity(average: f64, chunk_matches: usize) -> f64 {
    let boost = (chunk_matches as f64 * 0.02).min(0.2);
    average * (1.0 + boost)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_similarity_boost_caps_at_20_percent() {
        assert!((aggregate_similarity(0.5, 1) - 0.51).abs() < 1e-9);
        assert!((aggregate_similarity(0.5, 5) - 0.55).abs() < 1e-9);
        assert!((aggregate_similarity(0.5, 10) - 0.6).abs() < 1e-9);
        // 50 matches would be a 100% boost uncapped; it stays at 20%.
        assert!((aggregate_similarity(0.5, 50) - 0.6).abs() < 1e-9);
        // Similarity of 1.0 with max boost stays within [0, 1.2].
        assert!(aggregate_similarity(1.0, 100) <= 1.2);
    }

    #[test]
    fn test_results_len() {
        let chunks = RagResults::Chunks(Vec::new());
        assert!(chunks.is_empty());
        let pages = RagResults::Pages(vec![PageResultEntry {
            page_id: "p".into(),
            url: "https://x.com".into(),
            section_title: None,
            word_count: 10,
            chunk_matches: 1,
            aggregate_similarity: 0.5,
            average_similarity: 0.5,
            source_id: None,
        }]);
        assert_eq!(pages.len(), 1);
    }
}
