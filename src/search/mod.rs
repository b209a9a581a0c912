// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Retrieval: vector search, hybrid (vector + full-text) search, reranking,
//! and the RAG coordinator that composes them.

pub mod base;
pub mod hybrid;
pub mod rag;
pub mod rerank;

pub use base::{vector_search_code, vector_search_documents};
pub use hybrid::{hybrid_search_code, hybrid_search_documents};
pub use rag::{PageResultEntry, RagQueryResponse, RagService};
pub use rerank::{HttpReranker, Reranker};

use serde::Serialize;
use serde_json::Value;

/// One retrieval hit from either table.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: String,
    pub url: String,
    pub chunk_number: i32,
    pub content: String,
    /// Code example summary; absent for document chunks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub metadata: Value,
    pub source_id: String,
    pub similarity: f64,
    /// `vector`, `text` or `both` for hybrid hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    /// Score assigned by the reranker, when applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f64>,
}

impl SearchResult {
    /// Bound the content carried in API responses.
    pub fn truncate_content(&mut self, max_chars: usize) {
        if let Some((idx, _)) = self.content.char_indices().nth(max_chars) {
            self.content.truncate(idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate_content() {
        let mut result = SearchResult {
            id: "1".into(),
            url: "https://x.com".into(),
            chunk_number: 0,
            content: "abcdef".into(),
            summary: None,
            metadata: json!({}),
            source_id: "s".into(),
            similarity: 0.9,
            match_type: None,
            rerank_score: None,
        };
        result.truncate_content(3);
        assert_eq!(result.content, "abc");
        result.truncate_content(10);
        assert_eq!(result.content, "abc");
    }
}
