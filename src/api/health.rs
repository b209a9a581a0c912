// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Health endpoint with migration detection.
//!
//! The schema probe selects the newest columns from `archon_sources`; a
//! success is cached permanently, a failure for 30 seconds so a broken
//! database doesn't get hammered by health checks.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::json;

use super::AppState;

const FAILURE_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct SchemaCheck {
    valid: bool,
    message: String,
    checked_at: Instant,
}

static SCHEMA_CACHE: Lazy<RwLock<Option<SchemaCheck>>> = Lazy::new(|| RwLock::new(None));

/// Probe the database schema, serving cached outcomes where allowed.
async fn check_database_schema(state: &AppState) -> (bool, String) {
    {
        let cache = SCHEMA_CACHE.read().unwrap();
        if let Some(check) = cache.as_ref() {
            if check.valid {
                return (true, "Schema is up to date (cached)".to_string());
            }
            if check.checked_at.elapsed() < FAILURE_CACHE_TTL {
                return (false, check.message.clone());
            }
        }
    }

    let probe = sqlx::query("SELECT source_url, source_display_name FROM archon_sources LIMIT 1")
        .fetch_optional(&state.ctx.pool)
        .await;

    let (valid, message) = match probe {
        Ok(_) => (true, "Schema is up to date".to_string()),
        Err(e) => {
            let error_text = e.to_string().to_lowercase();
            tracing::debug!("Schema check error: {}", e);
            let message = if error_text.contains("source_url")
                || error_text.contains("source_display_name")
                || error_text.contains("42703")
            {
                "Database schema outdated - missing required columns from recent updates".to_string()
            } else if error_text.contains("does not exist") {
                "Required table missing (archon_sources). Run initial migrations before starting."
                    .to_string()
            } else {
                format!("Database unavailable: {}", e)
            };
            (false, message)
        }
    };

    *SCHEMA_CACHE.write().unwrap() = Some(SchemaCheck {
        valid,
        message: message.clone(),
        checked_at: Instant::now(),
    });

    (valid, message)
}

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Response {
    let (valid, message) = check_database_schema(&state).await;

    if !valid {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "migration_required",
                "service": "knowledge-api",
                "timestamp": Utc::now(),
                "ready": false,
                "migration_required": true,
                "message": message,
            })),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "knowledge-api",
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}
