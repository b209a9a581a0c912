// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cross-encoder style reranking.
//!
//! Candidates are scored against the query by a scoring service and the
//! top-k survive. The coordinator over-fetches (5x) when reranking is
//! enabled so the reranker sees a wider pool than the final result count.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::SearchResult;

/// Reorders candidate results given the query.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score and reorder `results`, returning at most `top_k`.
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    scores: Vec<f64>,
}

/// Reranker backed by an HTTP scoring service (`RERANKER_URL`).
///
/// The service receives `{query, documents[]}` and answers `{scores[]}` in
/// document order, cross-encoder style.
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReranker {
    pub fn new(client: reqwest::Client, endpoint: String) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if results.is_empty() {
            return Ok(results);
        }

        let request = RerankRequest {
            query,
            documents: results.iter().map(|r| r.content.as_str()).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let parsed: RerankResponse = response.json().await?;

        if parsed.scores.len() != results.len() {
            anyhow::bail!(
                "reranker returned {} scores for {} documents",
                parsed.scores.len(),
                results.len()
            );
        }

        Ok(apply_scores(results, &parsed.scores, top_k))
    }
}

/// Attach scores, sort descending, keep the top-k.
pub fn apply_scores(
    mut results: Vec<SearchResult>,
    scores: &[f64],
    top_k: usize,
) -> Vec<SearchResult> {
    for (result, &score) in results.iter_mut().zip(scores) {
        result.rerank_score = Some(score);
    }
    results.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(id: &str, similarity: f64) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            url: format!("https://x.com/{}", id),
            chunk_number: 0,
            content: format!("content {}", id),
            summary: None,
            metadata: json!({}),
            source_id: "s".into(),
            similarity,
            match_type: None,
            rerank_score: None,
        }
    }

    #[test]
    fn test_apply_scores_reorders_and_truncates() {
        let results = vec![result("a", 0.9), result("b", 0.8), result("c", 0.7)];
        let reranked = apply_scores(results, &[0.1, 0.9, 0.5], 2);
        assert_eq!(reranked.len(), 2);
        assert_eq!(reranked[0].id, "b");
        assert_eq!(reranked[1].id, "c");
        assert_eq!(reranked[0].rerank_score, Some(0.9));
    }

    #[test]
    fn test_apply_scores_keeps_all_when_topk_exceeds() {
        let results = vec![result("a", 0.9)];
        let reranked = apply_scores(results, &[0.5], 10);
        assert_eq!(reranked.len(), 1);
    }
}
