// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Knowledge ingestion endpoints: crawl, upload, refresh, stop.
//!
//! Every ingest start validates the provider API key with one tiny embedding
//! probe before any expensive work; a failed probe returns 401 with a stable
//! `authentication_failed` body.

use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::ServiceType;
use crate::orchestration::{
    get_active_orchestration, orchestrate_crawl, orchestrate_upload, unregister_orchestration,
    CrawlRequest, UploadRequest,
};
use crate::progress::ProgressTracker;
use crate::storage::get_source;

use super::AppState;

/// POST /api/knowledge-items/crawl request body.
#[derive(Debug, Deserialize)]
pub struct CrawlRequestBody {
    pub url: String,
    #[serde(default = "default_knowledge_type")]
    pub knowledge_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_update_frequency")]
    pub update_frequency: i64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_true")]
    pub extract_code_examples: bool,
}

fn default_knowledge_type() -> String {
    "technical".to_string()
}

fn default_update_frequency() -> i64 {
    7
}

fn default_max_depth() -> usize {
    2
}

fn default_true() -> bool {
    true
}

/// Validate the active embedding provider's key with a minimal request.
///
/// Any failure blocks the ingest: an invalid key discovered mid-crawl would
/// waste the whole operation.
async fn validate_provider_api_key(state: &AppState) -> Result<(), Response> {
    let provider = state
        .ctx
        .settings
        .get_active_provider(ServiceType::Embedding)
        .provider;
    tracing::info!("Testing {} API key with minimal embedding request...", provider);

    match state.ctx.embeddings.create_embedding("test", None).await {
        Ok(embedding) if !embedding.is_empty() => {
            tracing::info!("{} API key validation successful", provider);
            Ok(())
        }
        Ok(_) => Err(auth_failure_response(&provider)),
        Err(e) => {
            tracing::error!("API key validation failed for {}: {}", provider, e);
            Err(auth_failure_response(&provider))
        }
    }
}

fn auth_failure_response(provider: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": format!("Invalid {} API key", provider),
            "message": format!(
                "Please verify your {} API key in Settings before starting a crawl.",
                provider
            ),
            "error_type": "authentication_failed",
            "provider": provider,
        })),
    )
        .into_response()
}

/// POST /api/knowledge-items/crawl
pub async fn crawl_knowledge_item(
    State(state): State<AppState>,
    Json(body): Json<CrawlRequestBody>,
) -> Response {
    if body.url.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "URL is required"})),
        )
            .into_response();
    }
    if !body.url.starts_with("http://") && !body.url.starts_with("https://") {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "URL must start with http:// or https://"})),
        )
            .into_response();
    }

    if let Err(response) = validate_provider_api_key(&state).await {
        return response;
    }

    tracing::info!(
        "Starting knowledge item crawl | url={} | knowledge_type={}",
        body.url,
        body.knowledge_type
    );

    let progress_id = Uuid::new_v4().to_string();
    let tracker = ProgressTracker::new(&progress_id, "crawl");

    let request = CrawlRequest {
        url: body.url,
        knowledge_type: body.knowledge_type,
        tags: body.tags,
        update_frequency: body.update_frequency,
        max_depth: body.max_depth,
        extract_code_examples: body.extract_code_examples,
    };
    orchestrate_crawl(state.ctx.clone(), request, tracker);

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "progressId": progress_id,
            "message": "Crawling started",
            "estimatedDuration": "3-5 minutes",
        })),
    )
        .into_response()
}

/// POST /api/documents/upload (multipart)
pub async fn upload_document(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut filename = None;
    let mut file_bytes = None;
    let mut knowledge_type = default_knowledge_type();
    let mut tags: Vec<String> = Vec::new();
    let mut extract_code_examples = true;

    while let Ok(Some(field)) = multipart.next_field().await {
        match field.name().unwrap_or_default() {
            "file" => {
                filename = field.file_name().map(str::to_string);
                file_bytes = field.bytes().await.ok().map(|b| b.to_vec());
            }
            "knowledge_type" => {
                if let Ok(value) = field.text().await {
                    knowledge_type = value;
                }
            }
            "tags" => {
                if let Ok(value) = field.text().await {
                    tags = serde_json::from_str(&value).unwrap_or_default();
                }
            }
            "extract_code_examples" => {
                if let Ok(value) = field.text().await {
                    extract_code_examples = value.trim().eq_ignore_ascii_case("true");
                }
            }
            _ => {}
        }
    }

    let (Some(filename), Some(file_bytes)) = (filename, file_bytes) else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "A file part is required"})),
        )
            .into_response();
    };

    if let Err(response) = validate_provider_api_key(&state).await {
        return response;
    }

    let progress_id = Uuid::new_v4().to_string();
    let tracker = ProgressTracker::new(&progress_id, "upload");

    let request = UploadRequest {
        filename: filename.clone(),
        file_bytes,
        knowledge_type,
        tags,
        extract_code_examples,
    };
    orchestrate_upload(state.ctx.clone(), request, tracker);

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "progressId": progress_id,
            "message": "Upload started",
            "filename": filename,
        })),
    )
        .into_response()
}

/// POST /api/knowledge-items/{source_id}/refresh
pub async fn refresh_knowledge_item(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Response {
    let stored = match get_source(&state.ctx.pool, &source_id).await {
        Ok(Some(source)) => source,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("Source {} not found", source_id)})),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    let url = stored
        .metadata
        .get("original_url")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(stored.source_url.clone());
    let Some(url) = url else {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": "Source has no stored URL to refresh from"})),
        )
            .into_response();
    };

    if let Err(response) = validate_provider_api_key(&state).await {
        return response;
    }

    let progress_id = Uuid::new_v4().to_string();
    let tracker = ProgressTracker::new(&progress_id, "crawl");

    let request = CrawlRequest {
        url,
        knowledge_type: stored
            .metadata
            .get("knowledge_type")
            .and_then(Value::as_str)
            .unwrap_or("technical")
            .to_string(),
        tags: stored
            .metadata
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        update_frequency: 0,
        max_depth: 2,
        extract_code_examples: true,
    };
    orchestrate_crawl(state.ctx.clone(), request, tracker);

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "progressId": progress_id,
            "message": format!("Refresh started for {}", source_id),
            "sourceId": source_id,
        })),
    )
        .into_response()
}

/// POST /api/knowledge-items/stop/{progress_id}
pub async fn stop_crawl_task(Path(progress_id): Path<String>) -> Response {
    tracing::info!("Stop crawl requested | progress_id={}", progress_id);

    let Some(orchestration) = get_active_orchestration(&progress_id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "No active task for given progress_id"})),
        )
            .into_response();
    };

    // Cooperative cancel first, then a hard abort after a short grace.
    orchestration.token.cancel();

    let grace_deadline = std::time::Instant::now() + Duration::from_secs(2);
    while std::time::Instant::now() < grace_deadline {
        let terminal = ProgressTracker::get(&progress_id)
            .map(|op| op.status.is_terminal())
            .unwrap_or(true);
        if terminal {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    orchestration.abort.abort();
    unregister_orchestration(&progress_id);

    // Reflect cancellation in the tracker, preserving current progress.
    if let Some(operation) = ProgressTracker::get(&progress_id) {
        if !operation.status.is_terminal() {
            ProgressTracker::attach(&progress_id).update(
                "cancelled",
                operation.progress,
                "Crawl cancelled by user",
                Default::default(),
            );
        }
    }

    tracing::info!("Successfully stopped crawl task | progress_id={}", progress_id);
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "Crawl task stopped successfully",
            "progressId": progress_id,
        })),
    )
        .into_response()
}
