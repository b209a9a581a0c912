// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP surface.
//!
//! Thin axum handlers over the orchestration, progress and search layers.
//! Wire shapes are camelCase; error bodies are `{error, error_type?,
//! provider?}`.

pub mod etag;
mod health;
mod knowledge;
mod progress;
mod rag;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::orchestration::IngestContext;
use crate::search::RagService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub ctx: IngestContext,
    pub rag: Arc<RagService>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/knowledge-items/crawl", post(knowledge::crawl_knowledge_item))
        .route("/api/documents/upload", post(knowledge::upload_document))
        .route(
            "/api/knowledge-items/{source_id}/refresh",
            post(knowledge::refresh_knowledge_item),
        )
        .route(
            "/api/knowledge-items/stop/{progress_id}",
            post(knowledge::stop_crawl_task),
        )
        .route("/api/knowledge-items/search", post(rag::search_knowledge_items))
        .route("/api/progress/{operation_id}", get(progress::get_progress))
        .route("/api/progress/", get(progress::list_active_operations))
        .route("/api/rag/query", post(rag::perform_rag_query))
        .route("/api/rag/code-examples", post(rag::search_code_examples))
        .route("/api/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
