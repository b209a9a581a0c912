// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the Archon knowledge engine.
//!
//! This module provides strongly-typed errors for different parts of the application,
//! using `thiserror` for ergonomic error definitions and `anyhow` for error propagation.

use thiserror::Error;

/// Errors that can occur while creating embeddings.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Authentication failed for provider '{provider}': {message}")]
    AuthenticationFailed { provider: String, message: String },

    #[error("Provider quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Embedding API error: {0}")]
    Api(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl EmbeddingError {
    /// Stable error type string recorded in failure items and HTTP bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "authentication_failed",
            Self::QuotaExhausted(_) => "quota_exhausted",
            Self::RateLimited(_) => "rate_limit",
            Self::Api(_) => "api_error",
            Self::InvalidInput(_) => "invalid_input",
        }
    }

    /// Check if this error is retryable with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Classify a raw provider error body into the right variant.
    ///
    /// Quota exhaustion is reported by OpenAI inside a 429 with an
    /// `insufficient_quota` code, so it must be checked before the generic
    /// rate-limit classification.
    pub fn from_provider_body(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        if lower.contains("insufficient_quota") {
            Self::QuotaExhausted(truncate(body, 300))
        } else if status == 429 || lower.contains("rate_limit") || lower.contains("rate limit") {
            Self::RateLimited(truncate(body, 300))
        } else if status == 401 || status == 403 {
            Self::AuthenticationFailed {
                provider: "unknown".to_string(),
                message: truncate(body, 300),
            }
        } else {
            Self::Api(format!("HTTP {}: {}", status, truncate(body, 300)))
        }
    }
}

/// Errors that can occur while crawling.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Invalid crawl configuration: {0}")]
    ConfigInvalid(String),

    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("No content was crawled from the provided URL")]
    NoContent,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors that can occur while writing to the vector store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create source record for '{source_id}': {message}")]
    SourceUpsertFailed { source_id: String, message: String },

    #[error("Batch insert failed after retries: {0}")]
    InsertFailed(String),

    #[error("{processed} chunks processed but 0 stored")]
    ZeroStored { processed: usize },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors from the progress/operation registry.
#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Operation {0} not found")]
    NotFound(String),
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Raised cooperatively when an operation's cancellation token is set.
///
/// Strategies and storage loops surface this through `?`; the orchestrator
/// maps it to the `cancelled` terminal state with progress preserved.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation was cancelled")]
pub struct OperationCancelled;

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_types_are_stable() {
        assert_eq!(
            EmbeddingError::QuotaExhausted("x".into()).error_type(),
            "quota_exhausted"
        );
        assert_eq!(
            EmbeddingError::RateLimited("x".into()).error_type(),
            "rate_limit"
        );
        assert_eq!(EmbeddingError::Api("x".into()).error_type(), "api_error");
        assert_eq!(
            EmbeddingError::AuthenticationFailed {
                provider: "openai".into(),
                message: "bad key".into()
            }
            .error_type(),
            "authentication_failed"
        );
    }

    #[test]
    fn test_quota_takes_precedence_over_rate_limit() {
        let err = EmbeddingError::from_provider_body(
            429,
            r#"{"error": {"code": "insufficient_quota", "message": "You exceeded your quota"}}"#,
        );
        assert!(matches!(err, EmbeddingError::QuotaExhausted(_)));
    }

    #[test]
    fn test_429_maps_to_rate_limit() {
        let err = EmbeddingError::from_provider_body(429, "Too Many Requests");
        assert!(matches!(err, EmbeddingError::RateLimited(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_401_maps_to_auth_failure() {
        let err = EmbeddingError::from_provider_body(401, "invalid api key");
        assert!(matches!(err, EmbeddingError::AuthenticationFailed { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        let err: anyhow::Error = OperationCancelled.into();
        assert!(err.downcast_ref::<OperationCancelled>().is_some());
    }
}
