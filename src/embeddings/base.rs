// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Embedding provider adapter trait.

use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Capability interface for embedding providers.
///
/// Adapters only translate the wire protocol; batching, rate limiting,
/// retries and partial-failure tracking live in the embedding service.
/// Dimension routing is a pure function of the returned vector length,
/// never of the model name.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    /// Provider name for logs and failure records.
    fn name(&self) -> &str;

    /// Create embeddings for the given texts, in order.
    ///
    /// `dimensions` asks the provider to emit vectors of that length where
    /// the model supports it; providers that cannot honor it return their
    /// native length and the caller routes by the actual length.
    async fn create_embeddings(
        &self,
        model: &str,
        texts: &[String],
        dimensions: Option<usize>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}
