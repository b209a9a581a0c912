// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Embedding providers and the batched embedding service.
//!
//! Provides abstraction over different embedding APIs (OpenAI-compatible and
//! Google native) plus the rate-limited batch service with partial-failure
//! results and the optional contextual-embedding stage.

mod base;
pub mod contextual;
mod google;
mod openai;
mod service;

pub use base::EmbeddingAdapter;
pub use contextual::{generate_contextual_embeddings_batch, ContextualChunk};
pub use google::GoogleEmbeddingAdapter;
pub use openai::OpenAiCompatibleAdapter;
pub use service::{EmbeddingBatchResult, EmbeddingProgress, EmbeddingService, FailedItem};
