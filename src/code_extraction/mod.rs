// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Code example extraction: fenced-block parsing with prose/diagram filters
//! and near-duplicate consolidation, plus LLM summarization.

pub mod extractor;
pub mod summarizer;

pub use extractor::{
    code_similarity, extract_code_blocks, normalize_code_for_comparison, CodeBlock,
    ExtractionConfig,
};
pub use summarizer::{
    generate_code_example_summary, generate_code_summaries_batch, synthesize_summary, CodeSummary,
};
