// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Vector store writers for documents and code examples.
//!
//! Write idempotence comes from delete-then-insert keyed on URL plus the
//! deterministic source id; there are no cross-statement transactions, so
//! partial progress is acceptable and a retry simply re-ingests.

pub mod chunking;
pub mod code;
pub mod db;
pub mod documents;
pub mod sources;

pub use chunking::{smart_chunk_text, DEFAULT_CHUNK_SIZE};
pub use code::{add_code_examples_to_storage, CodeStorageRequest};
pub use db::{connect, embedding_column_for, VectorRow};
pub use documents::{add_documents_to_storage, DocumentStorageRequest, DocumentStorageResult};
pub use sources::{extract_source_summary, get_source, source_exists, update_source_info, SourceInfo};
