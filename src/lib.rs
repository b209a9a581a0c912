// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Archon - knowledge ingestion and retrieval engine.
//!
//! Crawls web content and uploaded documents, chunks and embeds them, and
//! persists vectors plus metadata into Postgres + pgvector. Serves
//! retrieval-augmented queries combining vector, full-text, and reranker
//! strategies, and tracks every long-running operation as a pollable,
//! cancellable progress stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     HTTP API (axum)                       │
//! │  /crawl /upload /progress/:id /stop/:id /rag/query ...    │
//! └──────────────────────────────────────────────────────────┘
//!            │                                  │
//!            ▼                                  ▼
//! ┌─────────────────────┐            ┌─────────────────────┐
//! │    Orchestration    │            │     RagService      │
//! │ (crawl + upload as  │            │ (vector | hybrid →  │
//! │  cancellable tasks) │            │  rerank → pages)    │
//! └─────────────────────┘            └─────────────────────┘
//!    │        │        │                       │
//!    ▼        ▼        ▼                       ▼
//! ┌───────┐┌────────┐┌─────────────┐   ┌──────────────────┐
//! │ Crawl ││  Code  ││   Storage   │   │ Postgres+pgvector │
//! │ strat.││extract.││  writers    │──▶│  (sources/chunks/ │
//! └───────┘└────────┘└─────────────┘   │   code examples)  │
//!    │          │         │            └──────────────────┘
//!    ▼          ▼         ▼
//! ┌──────────────────────────────┐
//! │ Embeddings (rate-limited,    │
//! │ partial-failure batching)    │
//! └──────────────────────────────┘
//! ```

pub mod api;
pub mod code_extraction;
pub mod config;
pub mod crawling;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod orchestration;
pub mod progress;
pub mod search;
pub mod storage;
pub mod telemetry;
