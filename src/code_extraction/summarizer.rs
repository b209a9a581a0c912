// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! LLM summaries for extracted code examples.
//!
//! Each block gets an `{example_name, summary}` pair generated in JSON mode.
//! The pipeline is built so summarization can never fail an ingest: a guard
//! prompt, a strict retry, a Grok-to-gpt-4o-mini fallback, reasoning-text
//! synthesis, and finally a hardcoded generic summary all stand between an
//! uncooperative model and the storage stage.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::llm::{ChatClient, ChatMessage, LlmClientFactory, LlmProvider};
use crate::progress::{CancellationToken, ProgressReporter, ProgressUpdate};

use super::extractor::CodeBlock;

/// Delay before each summary request to smooth out provider rate limits.
const SLOT_DELAY: Duration = Duration::from_millis(500);

/// Grok models get extra attempts before falling back.
const GROK_MAX_ATTEMPTS: u32 = 3;

/// A generated code example summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSummary {
    pub example_name: String,
    pub summary: String,
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    #[serde(default)]
    example_name: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

impl CodeSummary {
    /// Generic fallback when no model output is usable.
    pub fn fallback(language: &str) -> Self {
        let example_name = if language.is_empty() {
            "Code Example".to_string()
        } else {
            format!("Code Example ({})", language)
        };
        Self {
            example_name,
            summary: "Code example for demonstration purposes.".to_string(),
        }
    }
}

/// Generate summaries for multiple code blocks with bounded concurrency.
///
/// A single chat client is shared across the batch. Every failure produces
/// the fallback summary; the returned vector always matches `blocks` in
/// length and order.
pub async fn generate_code_summaries_batch(
    factory: &LlmClientFactory,
    blocks: &[CodeBlock],
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
    provider_override: Option<&str>,
) -> Vec<CodeSummary> {
    if blocks.is_empty() {
        return Vec::new();
    }

    let max_workers = factory
        .settings()
        .get_clamped("CODE_SUMMARY_MAX_WORKERS", 3);
    tracing::info!(
        "Generating summaries for {} code blocks with max_workers={}",
        blocks.len(),
        max_workers
    );

    let client = match factory.chat_client(provider_override) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to create LLM client for summaries: {}", e);
            return blocks.iter().map(|b| CodeSummary::fallback(&b.language)).collect();
        }
    };

    let semaphore = Arc::new(Semaphore::new(max_workers));
    let completed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let total = blocks.len();

    let mut handles = Vec::with_capacity(total);
    for block in blocks.iter().cloned() {
        let client = Arc::clone(&client);
        let semaphore = Arc::clone(&semaphore);
        let factory = factory.clone();
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            if cancel.is_cancelled() {
                return CodeSummary::fallback(&block.language);
            }
            tokio::time::sleep(SLOT_DELAY).await;
            generate_code_example_summary(&client, &factory, &block).await
        }));
    }

    let mut summaries = Vec::with_capacity(total);
    for (i, handle) in handles.into_iter().enumerate() {
        let summary = match handle.await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::error!("Error generating summary for code block {}: {}", i, e);
                CodeSummary::fallback(&blocks[i].language)
            }
        };
        summaries.push(summary);

        let done = completed.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        reporter
            .report(
                ProgressUpdate::new(
                    "code_extraction",
                    (done as f64 / total as f64) * 100.0,
                    format!("Generated {}/{} code summaries", done, total),
                )
                .with("completed_summaries", done)
                .with("total_summaries", total),
            )
            .await;
    }

    tracing::info!("Successfully generated {} code summaries", summaries.len());
    summaries
}

/// Generate a summary and name for one code example from its context.
///
/// Never returns an error: every failure path resolves to a synthesized or
/// generic fallback so the orchestrator always gets a row.
pub async fn generate_code_example_summary(
    client: &ChatClient,
    factory: &LlmClientFactory,
    block: &CodeBlock,
) -> CodeSummary {
    let guard_prompt = build_guard_prompt(block);
    let strict_prompt = format!(
        "{}\n\nSecond attempt enforcement: Return JSON only with the exact schema. \
         No additional text or reasoning content.",
        guard_prompt
    );

    let is_grok = client.provider() == LlmProvider::Grok
        || client.model().to_lowercase().contains("grok");

    for (enforce_json, prompt) in [(false, &guard_prompt), (true, &strict_prompt)] {
        let max_attempts = if is_grok { GROK_MAX_ATTEMPTS } else { 1 };
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tracing::info!(
                    "Grok retry attempt {}/{} after {:?} delay",
                    attempt + 1,
                    max_attempts,
                    retry_delay
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            let mut request = client.request(vec![
                ChatMessage::system(
                    "You are a helpful assistant that analyzes code examples and provides \
                     JSON responses with example names and summaries.",
                ),
                ChatMessage::user(prompt.clone()),
            ]);
            request.max_tokens = Some(2000);
            request.temperature = Some(0.3);
            // Strict retries always request JSON mode; the first attempt only
            // does where the provider reliably supports it.
            if enforce_json || client.provider().supports_response_format(client.model()) {
                request = request.with_json_mode(client.provider());
            }

            let content = match client.complete(request).await {
                Ok(completion) => completion.content.trim().to_string(),
                Err(e) => {
                    if is_grok && attempt + 1 < max_attempts {
                        tracing::error!("Grok request failed on attempt {}: {}, retrying...", attempt + 1, e);
                        continue;
                    }
                    tracing::error!("Error generating code summary: {}", e);
                    String::new()
                }
            };

            if content.is_empty() {
                if is_grok && attempt + 1 < max_attempts {
                    tracing::warn!("Grok empty response on attempt {}, retrying...", attempt + 1);
                    continue;
                }
                break;
            }

            // Very minimal responses ("Okay\nOkay") never contain JSON.
            if content.len() < 20 || (content.len() < 50 && !content.starts_with('{')) {
                tracing::debug!("Minimal response detected: {:?}", content);
                return synthesize_summary(&block.code, &block.language);
            }

            let payload = extract_json_payload(&content);
            match serde_json::from_str::<SummaryPayload>(&payload) {
                Ok(parsed) => {
                    if parsed.example_name.is_none() || parsed.summary.is_none() {
                        tracing::warn!("Incomplete response from LLM: {}", payload);
                    }
                    let fallback = CodeSummary::fallback(&block.language);
                    let result = CodeSummary {
                        example_name: parsed
                            .example_name
                            .filter(|n| !n.trim().is_empty())
                            .unwrap_or(fallback.example_name),
                        summary: parsed
                            .summary
                            .filter(|s| !s.trim().is_empty())
                            .unwrap_or(fallback.summary),
                    };
                    tracing::info!(
                        "Generated code example summary - Name: '{}', Summary length: {}",
                        result.example_name,
                        result.summary.len()
                    );
                    return result;
                }
                Err(e) => {
                    if is_reasoning_text(&content) {
                        tracing::debug!(
                            "Reasoning text detected but no JSON extracted. Response snippet: {:?}",
                            head_chars(&content, 200)
                        );
                    } else {
                        tracing::warn!(
                            "Failed to parse JSON response from LLM (enforce_json={}): {}",
                            enforce_json,
                            e
                        );
                    }
                    // Fall through to the strict prompt (or the fallbacks).
                    break;
                }
            }
        }
    }

    // Grok models that stayed empty or unparseable get one shot at OpenAI.
    if is_grok {
        tracing::warn!("Attempting fallback to gpt-4o-mini due to Grok failure...");
        if let Ok(fallback_client) = factory.openai_fallback_chat_client() {
            let mut request = fallback_client.request(vec![
                ChatMessage::system(
                    "You are a helpful assistant that analyzes code examples and provides \
                     JSON responses with example names and summaries.",
                ),
                ChatMessage::user(strict_prompt.clone()),
            ]);
            request.max_tokens = Some(500);
            request.temperature = Some(0.1);
            request = request.with_json_mode(LlmProvider::OpenAi);

            if let Ok(completion) = fallback_client.complete(request).await {
                let content = completion.content.trim().to_string();
                if !content.is_empty() {
                    tracing::info!("gpt-4o-mini fallback succeeded");
                    let payload = extract_json_payload(&content);
                    if let Ok(parsed) = serde_json::from_str::<SummaryPayload>(&payload) {
                        let fallback = CodeSummary::fallback(&block.language);
                        return CodeSummary {
                            example_name: parsed
                                .example_name
                                .filter(|n| !n.trim().is_empty())
                                .unwrap_or(fallback.example_name),
                            summary: parsed
                                .summary
                                .filter(|s| !s.trim().is_empty())
                                .unwrap_or(fallback.summary),
                        };
                    }
                }
            }
            tracing::error!("gpt-4o-mini fallback also failed to produce usable JSON");
        }
    }

    synthesize_summary(&block.code, &block.language)
}

fn build_guard_prompt(block: &CodeBlock) -> String {
    let context_before_tail = tail_chars(&block.context_before, 500);
    let code_head = head_chars(&block.code, 1500);
    let context_after_head = head_chars(&block.context_after, 500);

    format!(
        "<context_before>\n{}\n</context_before>\n\n\
         <code_example language=\"{}\">\n{}\n</code_example>\n\n\
         <context_after>\n{}\n</context_after>\n\n\
         Based on the code example and its surrounding context, provide:\n\
         1. A concise, action-oriented name (1-4 words) that describes what this code DOES, \
         not what it is. Focus on the action or purpose.\n   \
         Good examples: \"Parse JSON Response\", \"Validate Email Format\", \"Connect PostgreSQL\", \
         \"Handle File Upload\", \"Sort Array Items\", \"Fetch User Data\"\n   \
         Bad examples: \"Function Example\", \"Code Snippet\", \"JavaScript Code\", \"API Code\"\n\
         2. A summary (2-3 sentences) that describes what this code example demonstrates and its purpose\n\n\
         Format your response as JSON:\n\
         {{\n  \"example_name\": \"Action-oriented name (1-4 words)\",\n  \
         \"summary\": \"2-3 sentence description of what the code demonstrates\"\n}}\n\n\
         Important: Respond with a valid JSON object that exactly matches the keys \
         {{\"example_name\": string, \"summary\": string}}. Do not include commentary, \
         markdown fences, or reasoning notes.",
        context_before_tail, block.language, code_head, context_after_head
    )
}

/// Pull a JSON object out of a response that may carry fences or prose.
pub fn extract_json_payload(raw: &str) -> String {
    let mut text = raw.trim();

    // Strip markdown fences around the payload
    if let Some(stripped) = text.strip_prefix("```json").or_else(|| text.strip_prefix("```")) {
        text = stripped.strip_suffix("```").unwrap_or(stripped).trim();
    }

    // Take the outermost object if there's surrounding prose
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }
    text.to_string()
}

/// Detect a chain-of-thought style response that never got to the JSON.
pub fn is_reasoning_text(text: &str) -> bool {
    let trimmed = text.trim_start();
    let lower = trimmed.to_lowercase();
    lower.starts_with("<think>")
        || lower.starts_with("okay,")
        || lower.starts_with("okay\n")
        || lower.starts_with("okay ")
        || lower.starts_with("alright,")
        || lower.starts_with("let me ")
        || lower.starts_with("first, ")
        || lower.starts_with("i need to ")
}

/// Build a minimal summary straight from the code when the LLM fails.
pub fn synthesize_summary(code: &str, language: &str) -> CodeSummary {
    // Use the first meaningful identifier-bearing line as a hint.
    let name_hint = code
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty()
                && !line.starts_with('#')
                && !line.starts_with("//")
                && !line.starts_with("/*")
        })
        .unwrap_or("");

    let example_name = if language.is_empty() {
        "Code Example".to_string()
    } else {
        format!("Code Example ({})", language)
    };

    let summary = if name_hint.is_empty() {
        "Code example for demonstration purposes.".to_string()
    } else {
        format!(
            "Code example beginning with `{}`. Extracted from documentation for reference.",
            head_chars(name_hint, 80)
        )
    };

    CodeSummary {
        example_name,
        summary,
    }
}

fn head_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let skip = count - max;
    match s.char_indices().nth(skip) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_payload_from_fences() {
        let raw = "```json\n{\"example_name\": \"Parse JSON\", \"summary\": \"x\"}\n```";
        let payload = extract_json_payload(raw);
        let parsed: SummaryPayload = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed.example_name.as_deref(), Some("Parse JSON"));
    }

    #[test]
    fn test_extract_json_payload_from_prose() {
        let raw = "Sure! Here is the JSON you asked for: {\"example_name\": \"X\", \"summary\": \"Y\"} Hope it helps.";
        assert_eq!(
            extract_json_payload(raw),
            "{\"example_name\": \"X\", \"summary\": \"Y\"}"
        );
    }

    #[test]
    fn test_reasoning_text_detection() {
        assert!(is_reasoning_text("Okay, so the user wants a summary..."));
        assert!(is_reasoning_text("<think>\nThis code does...\n</think>"));
        assert!(is_reasoning_text("Let me analyze this code."));
        assert!(!is_reasoning_text("{\"example_name\": \"X\"}"));
    }

    #[test]
    fn test_fallback_summary_includes_language() {
        assert_eq!(
            CodeSummary::fallback("python").example_name,
            "Code Example (python)"
        );
        assert_eq!(CodeSummary::fallback("").example_name, "Code Example");
    }

    #[test]
    fn test_synthesize_summary_uses_first_code_line() {
        let summary = synthesize_summary("# comment\ndef run_server(port):\n    ...", "python");
        assert_eq!(summary.example_name, "Code Example (python)");
        assert!(summary.summary.contains("def run_server(port):"));
    }

    #[test]
    fn test_prompt_bounds_inputs() {
        let block = CodeBlock {
            code: "x".repeat(5000),
            language: "python".to_string(),
            context_before: "b".repeat(2000),
            context_after: "a".repeat(2000),
            full_context: String::new(),
            consolidated_variants: None,
            variant_languages: None,
        };
        let prompt = build_guard_prompt(&block);
        assert!(prompt.contains(&"x".repeat(1500)));
        assert!(!prompt.contains(&"x".repeat(1501)));
        assert!(prompt.contains(&"b".repeat(500)));
        assert!(!prompt.contains(&"b".repeat(501)));
        assert!(prompt.contains(&"a".repeat(500)));
        assert!(!prompt.contains(&"a".repeat(501)));
    }

    #[test]
    fn test_tail_chars() {
        assert_eq!(tail_chars("abcdef", 3), "def");
        assert_eq!(tail_chars("ab", 3), "ab");
    }
}
