// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Progress polling endpoints.
//!
//! `GET /api/progress/{id}` serves the operation snapshot with ETag 304
//! semantics and polling hints; `GET /api/progress/` lists non-terminal
//! operations with a trimmed field set.

use axum::extract::Path;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::progress::{Operation, ProgressTracker};

use super::etag::{check_etag, generate_etag};

/// Convert a snake_case key to the camelCase wire form.
pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Render an operation snapshot as the camelCase wire object.
pub fn operation_wire_body(operation: &Operation) -> Map<String, Value> {
    let serialized = serde_json::to_value(operation).unwrap_or_else(|_| json!({}));
    let mut body = Map::new();
    if let Value::Object(fields) = serialized {
        for (key, value) in fields {
            if value.is_null() {
                continue;
            }
            body.insert(to_camel_case(&key), value);
        }
    }
    // `log` doubles as the current step message on the wire.
    if let Some(message) = body.get("log").cloned() {
        body.entry("message".to_string()).or_insert(message);
    }
    body
}

/// GET /api/progress/{operation_id}
pub async fn get_progress(Path(operation_id): Path<String>, headers: HeaderMap) -> Response {
    let Some(operation) = ProgressTracker::get(&operation_id) else {
        tracing::warn!("Operation not found | operation_id={}", operation_id);
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Operation {} not found", operation_id)})),
        )
            .into_response();
    };

    let mut body = operation_wire_body(&operation);

    // ETag over the stable fields; the timestamp is added afterwards so it
    // never churns the hash.
    let etag = generate_etag(&Value::Object(body.clone()));
    body.insert("timestamp".to_string(), json!(Utc::now()));

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok());

    let poll_interval = if operation.status.is_terminal() { "0" } else { "1000" };

    if check_etag(if_none_match, &etag) {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, etag)
            .header(header::CACHE_CONTROL, "no-cache, must-revalidate")
            .header("X-Poll-Interval", poll_interval)
            .body(axum::body::Body::empty())
            .unwrap_or_else(|_| StatusCode::NOT_MODIFIED.into_response());
    }

    let mut response = (StatusCode::OK, Json(Value::Object(body))).into_response();
    let response_headers = response.headers_mut();
    if let Ok(value) = etag.parse() {
        response_headers.insert(header::ETAG, value);
    }
    response_headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-cache, must-revalidate"),
    );
    response_headers.insert(
        "X-Poll-Interval",
        header::HeaderValue::from_static(if operation.status.is_terminal() { "0" } else { "1000" }),
    );
    response
}

/// GET /api/progress/
pub async fn list_active_operations() -> Response {
    let operations: Vec<Value> = ProgressTracker::list_active()
        .into_iter()
        .map(|op| {
            let mut entry = Map::new();
            entry.insert("operation_id".to_string(), json!(op.progress_id));
            entry.insert("operation_type".to_string(), json!(op.operation_type));
            entry.insert("status".to_string(), json!(op.status.as_str()));
            entry.insert("progress".to_string(), json!(op.progress));
            entry.insert(
                "message".to_string(),
                json!(op.log.clone().unwrap_or_else(|| "Processing...".to_string())),
            );
            entry.insert("started_at".to_string(), json!(op.start_time));

            for key in [
                "source_id",
                "url",
                "current_url",
                "crawl_type",
                "processed_pages",
                "total_pages",
                "chunks_stored",
                "code_blocks_found",
            ] {
                if let Some(value) = op.extras.get(key) {
                    if !value.is_null() {
                        entry.insert(key.to_string(), value.clone());
                    }
                }
            }
            Value::Object(entry)
        })
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "operations": operations,
            "count": operations.len(),
            "timestamp": Utc::now(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_camel_case() {
        assert_eq!(to_camel_case("progress_id"), "progressId");
        assert_eq!(to_camel_case("current_url"), "currentUrl");
        assert_eq!(to_camel_case("total_pages"), "totalPages");
        assert_eq!(to_camel_case("completed_summaries"), "completedSummaries");
        assert_eq!(to_camel_case("status"), "status");
    }

    #[tokio::test]
    async fn test_operation_wire_body_camelizes_extras() {
        let tracker = ProgressTracker::new("wire-test", "crawl");
        tracker.update(
            "crawling",
            12,
            "Crawling pages",
            [
                ("current_url".to_string(), json!("https://x.com")),
                ("total_pages".to_string(), json!(10)),
                ("processed_pages".to_string(), json!(2)),
            ]
            .into_iter()
            .collect(),
        );
        let operation = ProgressTracker::get("wire-test").unwrap();
        let body = operation_wire_body(&operation);

        assert_eq!(body["progressId"], "wire-test");
        assert_eq!(body["currentUrl"], "https://x.com");
        assert_eq!(body["totalPages"], 10);
        assert_eq!(body["processedPages"], 2);
        assert_eq!(body["status"], "crawling");
        assert_eq!(body["message"], "Crawling pages");
        assert!(!body.contains_key("current_url"));
        ProgressTracker::clear("wire-test");
    }

    #[tokio::test]
    async fn test_etag_stability_and_refresh() {
        let tracker = ProgressTracker::new("etag-test", "crawl");
        tracker.update("crawling", 10, "a", Default::default());

        let op = ProgressTracker::get("etag-test").unwrap();
        let first = generate_etag(&Value::Object(operation_wire_body(&op)));
        let second = generate_etag(&Value::Object(operation_wire_body(&op)));
        assert_eq!(first, second);

        // Mutating state produces a new ETag.
        tracker.update("crawling", 20, "b", Default::default());
        let mutated = ProgressTracker::get("etag-test").unwrap();
        let third = generate_etag(&Value::Object(operation_wire_body(&mutated)));
        assert_ne!(first, third);
        ProgressTracker::clear("etag-test");
    }
}
