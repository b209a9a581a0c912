// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Document upload orchestration.
//!
//! Uploaded files run the same storage pipeline as crawls but with the
//! upload stage ranges: reading -> text_extraction -> chunking ->
//! source_creation -> summarizing -> storing. Only UTF-8 text formats are
//! decoded here; binary document formats (PDF, DOCX) are decoded by an
//! external collaborator before they reach this path.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::code_extraction::{extract_code_blocks, generate_code_summaries_batch, ExtractionConfig};
use crate::error::{OperationCancelled, StorageError};
use crate::crawling::urls::generate_unique_source_id;
use crate::progress::{CancellationToken, ProgressMapper, ProgressTracker};
use crate::storage::{
    add_code_examples_to_storage, add_documents_to_storage, extract_source_summary,
    smart_chunk_text, update_source_info, CodeStorageRequest, DocumentStorageRequest, SourceInfo,
    DEFAULT_CHUNK_SIZE,
};

use super::crawl::extras;
use super::{
    register_orchestration, unregister_orchestration, IngestContext, OrchestrationHandle,
    StageReporter, CRAWL_SEMAPHORE,
};

/// File extensions the upload path decodes as UTF-8 text.
const TEXT_EXTENSIONS: &[&str] = &["md", "mdx", "markdown", "txt", "text", "json", "rst", "html", "htm"];

/// An upload ingest request.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub file_bytes: Vec<u8>,
    pub knowledge_type: String,
    pub tags: Vec<String>,
    pub extract_code_examples: bool,
}

/// Start an upload orchestration as a detached, cancellable task.
pub fn orchestrate_upload(ctx: IngestContext, request: UploadRequest, tracker: ProgressTracker) {
    let progress_id = tracker.progress_id().to_string();
    let cancel = CancellationToken::new();

    let mut initial = serde_json::Map::new();
    initial.insert("filename".to_string(), Value::String(request.filename.clone()));
    tracker.start(initial);

    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        run_upload(ctx, request, tracker, task_cancel).await;
    });

    register_orchestration(
        &progress_id,
        OrchestrationHandle {
            token: cancel,
            abort: task.abort_handle(),
        },
    );
    tracing::info!("Started background upload orchestration | progress_id={}", progress_id);
}

async fn run_upload(
    ctx: IngestContext,
    request: UploadRequest,
    tracker: ProgressTracker,
    cancel: CancellationToken,
) {
    let progress_id = tracker.progress_id().to_string();
    let _permit = CRAWL_SEMAPHORE.acquire().await;

    let mapper = Arc::new(std::sync::Mutex::new(ProgressMapper::new()));

    match run_upload_inner(&ctx, &request, &tracker, &cancel, &mapper).await {
        Ok(()) => {}
        Err(e) if e.downcast_ref::<OperationCancelled>().is_some() => {
            tracing::info!("Upload operation cancelled | progress_id={}", progress_id);
            let progress = mapper.lock().unwrap().current_progress();
            tracker.update(
                "cancelled",
                progress,
                "Upload operation was cancelled by user",
                Default::default(),
            );
        }
        Err(e) => {
            tracing::error!("Upload orchestration failed: {:#}", e);
            tracker.error(&format!("Upload failed: {}", e), None);
        }
    }

    unregister_orchestration(&progress_id);
}

async fn run_upload_inner(
    ctx: &IngestContext,
    request: &UploadRequest,
    tracker: &ProgressTracker,
    cancel: &CancellationToken,
    mapper: &Arc<std::sync::Mutex<ProgressMapper>>,
) -> crate::error::Result<()> {
    let filename = &request.filename;
    let file_url = format!("file://{}", filename);
    let source_id = generate_unique_source_id(&file_url);

    let update = |stage: &str, pct: f64, message: String, fields: serde_json::Map<String, Value>| {
        let overall = mapper.lock().unwrap().map_by_name(stage, pct);
        tracker.update(stage, overall, &message, fields);
    };

    // Reading
    update(
        "reading",
        50.0,
        format!("Reading {}", filename),
        extras(&[("filename", json!(filename))]),
    );
    cancel.check()?;

    // Text extraction
    update("text_extraction", 0.0, "Extracting text...".to_string(), Default::default());
    let content = extract_text(filename, &request.file_bytes)?;
    update("text_extraction", 100.0, "Text extracted".to_string(), Default::default());
    cancel.check()?;

    if content.trim().is_empty() {
        anyhow::bail!("No text content could be extracted from {}", filename);
    }

    // Chunking
    update("chunking", 0.0, "Chunking document...".to_string(), Default::default());
    let chunks = smart_chunk_text(&content, DEFAULT_CHUNK_SIZE);
    let chunk_count = chunks.len();
    update(
        "chunking",
        100.0,
        format!("Created {} chunks", chunk_count),
        extras(&[("total_chunks", json!(chunk_count))]),
    );
    cancel.check()?;

    let mut total_word_count = 0i64;
    let mut urls = Vec::with_capacity(chunk_count);
    let mut chunk_numbers = Vec::with_capacity(chunk_count);
    let mut metadatas = Vec::with_capacity(chunk_count);
    for (i, chunk) in chunks.iter().enumerate() {
        if i % 10 == 0 {
            cancel.check()?;
        }
        let word_count = chunk.split_whitespace().count() as i64;
        total_word_count += word_count;
        urls.push(file_url.clone());
        chunk_numbers.push(i as i32);
        metadatas.push(json!({
            "url": file_url,
            "title": filename,
            "source_id": source_id,
            "knowledge_type": request.knowledge_type,
            "source_type": "file",
            "word_count": word_count,
            "char_count": chunk.len(),
            "chunk_index": i,
            "tags": request.tags,
        }));
        if i > 0 && i % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }

    // Source creation + summary
    update(
        "source_creation",
        50.0,
        format!("Creating source record for {}", filename),
        extras(&[("source_id", json!(source_id))]),
    );
    let mut combined = String::new();
    for chunk in chunks.iter().take(3) {
        if combined.len() + chunk.len() >= 15_000 {
            break;
        }
        combined.push(' ');
        combined.push_str(chunk);
    }
    update("summarizing", 50.0, "Summarizing document...".to_string(), Default::default());
    let summary = extract_source_summary(&ctx.factory, &source_id, &combined, 1).await;
    update_source_info(
        &ctx.pool,
        &SourceInfo {
            source_id: source_id.clone(),
            summary,
            word_count: total_word_count,
            content_preview: combined.trim().to_string(),
            knowledge_type: request.knowledge_type.clone(),
            tags: request.tags.clone(),
            update_frequency: 0,
            original_url: Some(file_url.clone()),
            source_url: Some(file_url.clone()),
            source_display_name: Some(filename.clone()),
            source_type: "file".to_string(),
        },
    )
    .await?;
    cancel.check()?;

    // Storing
    let mut url_to_full_document = HashMap::new();
    url_to_full_document.insert(file_url.clone(), content.clone());
    let storage_reporter = StageReporter::new(tracker.clone(), Arc::clone(mapper), "storing");
    let result = add_documents_to_storage(
        &ctx.pool,
        &ctx.embeddings,
        &ctx.factory,
        DocumentStorageRequest {
            urls,
            chunk_numbers,
            contents: chunks.clone(),
            metadatas,
            url_to_full_document,
        },
        &storage_reporter,
        cancel,
    )
    .await?;

    if chunk_count > 0 && result.chunks_stored == 0 {
        return Err(StorageError::ZeroStored {
            processed: chunk_count,
        }
        .into());
    }

    // Optional code extraction, inside the storing range.
    let mut code_examples_count = 0usize;
    if request.extract_code_examples && result.chunks_stored > 0 {
        cancel.check()?;
        let config = ExtractionConfig::load(&ctx.settings);
        let blocks = extract_code_blocks(&content, &config);
        if !blocks.is_empty() {
            let summaries =
                generate_code_summaries_batch(&ctx.factory, &blocks, &storage_reporter, cancel, None)
                    .await;
            let metadatas: Vec<Value> = blocks
                .iter()
                .zip(&summaries)
                .map(|(block, summary)| {
                    json!({
                        "source_id": source_id,
                        "title": summary.example_name,
                        "example_name": summary.example_name,
                        "language": block.language,
                        "knowledge_type": request.knowledge_type,
                        "consolidated_variants": block.consolidated_variants,
                        "variant_languages": block.variant_languages,
                    })
                })
                .collect();
            code_examples_count = add_code_examples_to_storage(
                &ctx.pool,
                &ctx.embeddings,
                &ctx.factory,
                CodeStorageRequest {
                    urls: vec![file_url.clone(); blocks.len()],
                    chunk_numbers: (0..blocks.len() as i32).collect(),
                    code_examples: blocks.iter().map(|b| b.code.clone()).collect(),
                    summaries: summaries.iter().map(|s| s.summary.clone()).collect(),
                    metadatas,
                },
                &storage_reporter,
                cancel,
            )
            .await?;
        }
    }

    tracker.complete(extras(&[
        ("chunks_stored", json!(result.chunks_stored)),
        ("code_examples_found", json!(code_examples_count)),
        ("source_id", json!(source_id)),
        ("filename", json!(filename)),
        (
            "log",
            json!(format!(
                "Upload completed: {} chunks, {} code examples",
                result.chunks_stored, code_examples_count
            )),
        ),
    ]));

    Ok(())
}

/// Decode uploaded bytes into text.
///
/// Text formats decode as UTF-8 (lossy for stray bytes); anything else is
/// rejected with a clear error since binary decoding lives outside this
/// service.
fn extract_text(filename: &str, bytes: &[u8]) -> crate::error::Result<String> {
    let extension = filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if !TEXT_EXTENSIONS.contains(&extension.as_str()) {
        anyhow::bail!(
            "Unsupported file type '.{}' - upload a text or markdown document",
            extension
        );
    }

    Ok(String::from_utf8_lossy(bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_accepts_markdown() {
        let text = extract_text("notes.md", b"# Title\n\nBody").unwrap();
        assert!(text.contains("# Title"));
    }

    #[test]
    fn test_extract_text_rejects_binary_types() {
        assert!(extract_text("paper.pdf", b"%PDF-1.4").is_err());
        assert!(extract_text("slides.pptx", b"PK").is_err());
    }

    #[test]
    fn test_upload_source_id_is_deterministic() {
        let a = generate_unique_source_id("file://notes.md");
        let b = generate_unique_source_id("file://notes.md");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
