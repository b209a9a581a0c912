// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! RAG query endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::AppState;

/// POST /api/rag/query request body.
#[derive(Debug, Deserialize)]
pub struct RagQueryBody {
    pub query: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_match_count")]
    pub match_count: usize,
    #[serde(default = "default_return_mode")]
    pub return_mode: String,
}

fn default_match_count() -> usize {
    5
}

fn default_return_mode() -> String {
    "chunks".to_string()
}

/// POST /api/rag/query
pub async fn perform_rag_query(
    State(state): State<AppState>,
    Json(body): Json<RagQueryBody>,
) -> Response {
    if body.query.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "query is required"})),
        )
            .into_response();
    }

    match state
        .rag
        .perform_rag_query(
            &body.query,
            body.source.as_deref(),
            body.match_count,
            &body.return_mode,
        )
        .await
    {
        Ok(response) => (StatusCode::OK, Json(json!({"success": true, "data": response}))).into_response(),
        Err(e) => {
            tracing::error!("RAG query failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string(), "query": body.query})),
            )
                .into_response()
        }
    }
}

/// POST /api/rag/code-examples
pub async fn search_code_examples(
    State(state): State<AppState>,
    Json(body): Json<RagQueryBody>,
) -> Response {
    match state
        .rag
        .search_code_examples_service(&body.query, body.source.as_deref(), body.match_count)
        .await
    {
        Ok(response) => (StatusCode::OK, Json(json!({"success": true, "data": response}))).into_response(),
        Err(e) => {
            let message = e.to_string();
            let status = if message.contains("disabled") {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, Json(json!({"error": message, "query": body.query}))).into_response()
        }
    }
}

/// POST /api/knowledge-items/search - alias over the RAG query pipeline.
pub async fn search_knowledge_items(
    state: State<AppState>,
    body: Json<RagQueryBody>,
) -> Response {
    perform_rag_query(state, body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults() {
        let body: RagQueryBody = serde_json::from_str(r#"{"query": "foo"}"#).unwrap();
        assert_eq!(body.match_count, 5);
        assert_eq!(body.return_mode, "chunks");
        assert!(body.source.is_none());
    }

    #[test]
    fn test_body_with_pages_mode() {
        let body: RagQueryBody =
            serde_json::from_str(r#"{"query": "foo", "match_count": 5, "return_mode": "pages"}"#)
                .unwrap();
        assert_eq!(body.return_mode, "pages");
    }
}
