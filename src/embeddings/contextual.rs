// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Contextual embedding generation.
//!
//! For each `(full_document, chunk)` pair the LLM produces a short context
//! paragraph situating the chunk within its document; the chunk is then
//! embedded as `"<context>\n\n<chunk>"` to improve retrieval. One chat call
//! covers a whole sub-batch using `CHUNK i:` response lines. Any failure
//! falls back to the raw chunks - contextualization is best-effort.

use crate::error::EmbeddingError;
use crate::llm::{ChatClient, ChatMessage};

/// Max characters of the document shown to the model per chunk.
const DOCUMENT_PREVIEW_CHARS: usize = 2000;

/// Max characters of the chunk shown to the model.
const CHUNK_PREVIEW_CHARS: usize = 500;

/// One contextualized chunk: the text to embed and whether context was applied.
pub type ContextualChunk = (String, bool);

/// Generate contextual prefixes for a batch of chunks in a single chat call.
///
/// Returns one entry per input chunk, in order. On any error the whole batch
/// falls back to `(chunk, false)`.
pub async fn generate_contextual_embeddings_batch(
    client: &ChatClient,
    full_documents: &[String],
    chunks: &[String],
) -> Vec<ContextualChunk> {
    match try_generate_batch(client, full_documents, chunks).await {
        Ok(results) => results,
        Err(e) => {
            match &e {
                EmbeddingError::QuotaExhausted(_) => tracing::warn!(
                    "Quota exhausted in contextual embeddings, proceeding without context: {}",
                    e
                ),
                EmbeddingError::RateLimited(_) => tracing::warn!(
                    "Rate limit hit in contextual embeddings batch, proceeding without context: {}",
                    e
                ),
                _ => tracing::error!("Error in contextual embedding batch: {}", e),
            }
            chunks.iter().map(|c| (c.clone(), false)).collect()
        }
    }
}

async fn try_generate_batch(
    client: &ChatClient,
    full_documents: &[String],
    chunks: &[String],
) -> Result<Vec<ContextualChunk>, EmbeddingError> {
    let prompt = build_batch_prompt(full_documents, chunks);

    let mut request = client.request(vec![
        ChatMessage::system(
            "You are a helpful assistant that generates contextual information for document chunks.",
        ),
        ChatMessage::user(prompt),
    ]);
    request.temperature = Some(0.0);
    request.max_tokens = Some((100 * chunks.len().max(1)) as u32);

    let completion = client.complete(request).await?;
    if completion.content.trim().is_empty() {
        tracing::error!("Empty response from LLM when generating contextual embeddings batch");
        return Ok(chunks.iter().map(|c| (c.clone(), false)).collect());
    }

    let contexts = parse_chunk_contexts(&completion.content);

    Ok(chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| match contexts.iter().find(|(n, _)| *n == i) {
            Some((_, context)) => (format!("{}\n\n{}", context, chunk), true),
            None => (chunk.clone(), false),
        })
        .collect())
}

fn build_batch_prompt(full_documents: &[String], chunks: &[String]) -> String {
    let mut prompt =
        String::from("Process the following chunks and provide contextual information for each:\n\n");

    for (i, (doc, chunk)) in full_documents.iter().zip(chunks).enumerate() {
        let doc_preview = truncate_chars(doc, DOCUMENT_PREVIEW_CHARS);
        let chunk_preview = truncate_chars(chunk, CHUNK_PREVIEW_CHARS);
        prompt.push_str(&format!("CHUNK {}:\n", i + 1));
        prompt.push_str(&format!("<document_preview>\n{}\n</document_preview>\n", doc_preview));
        prompt.push_str(&format!("<chunk>\n{}\n</chunk>\n\n", chunk_preview));
    }

    prompt.push_str(
        "For each chunk, provide a short succinct context to situate it within the overall \
         document for improving search retrieval. Format your response as:\n\
         CHUNK 1: [context]\nCHUNK 2: [context]\netc.",
    );
    prompt
}

/// Parse `CHUNK n: context` lines into zero-based `(index, context)` pairs.
fn parse_chunk_contexts(response: &str) -> Vec<(usize, String)> {
    let mut contexts = Vec::new();
    for line in response.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with("CHUNK") {
            continue;
        }
        let Some((head, context)) = trimmed.split_once(':') else {
            continue;
        };
        let Some(number) = head.split_whitespace().nth(1) else {
            continue;
        };
        if let Ok(n) = number.parse::<usize>() {
            if n >= 1 {
                contexts.push((n - 1, context.trim().to_string()));
            }
        }
    }
    contexts
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_contexts() {
        let response = "CHUNK 1: intro section about installs\nCHUNK 2: API usage notes\nnoise line";
        let contexts = parse_chunk_contexts(response);
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0], (0, "intro section about installs".to_string()));
        assert_eq!(contexts[1], (1, "API usage notes".to_string()));
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let response = "CHUNK one: bad index\nCHUNK 0: below range\nCHUNK 3 no colon";
        assert!(parse_chunk_contexts(response).is_empty());
    }

    #[test]
    fn test_prompt_bounds_previews() {
        let doc = "d".repeat(10_000);
        let chunk = "c".repeat(3_000);
        let prompt = build_batch_prompt(&[doc], std::slice::from_ref(&chunk));
        // Document preview capped at 2000, chunk preview at 500.
        assert!(prompt.contains(&"d".repeat(2000)));
        assert!(!prompt.contains(&"d".repeat(2001)));
        assert!(prompt.contains(&"c".repeat(500)));
        assert!(!prompt.contains(&"c".repeat(501)));
    }

    #[test]
    fn test_prompt_numbers_chunks_from_one() {
        let prompt = build_batch_prompt(
            &["doc a".to_string(), "doc b".to_string()],
            &["chunk a".to_string(), "chunk b".to_string()],
        );
        assert!(prompt.contains("CHUNK 1:"));
        assert!(prompt.contains("CHUNK 2:"));
    }
}
