// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crawl orchestration.
//!
//! `orchestrate_crawl` returns immediately; the work runs as a detached task
//! registered for cancellation. The task drives the full state machine:
//!
//! ```text
//! starting -> analyzing -> crawling -> processing -> source_creation ->
//! document_storage -> [code_extraction -> code_storage]? -> finalization ->
//! completed   (any step: cancelled | error)
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::code_extraction::{
    extract_code_blocks, generate_code_summaries_batch, ExtractionConfig,
};
use crate::crawling::{
    crawl_batch_with_progress, crawl_markdown_file, crawl_recursive_with_progress, parse_sitemap,
    urls, PageResult,
};
use crate::error::{CrawlError, OperationCancelled, StorageError};
use crate::progress::{CancellationToken, ProgressMapper, ProgressTracker};
use crate::storage::{
    add_code_examples_to_storage, add_documents_to_storage, extract_source_summary, smart_chunk_text,
    update_source_info, CodeStorageRequest, DocumentStorageRequest, DocumentStorageResult,
    SourceInfo, DEFAULT_CHUNK_SIZE,
};

use super::{
    register_orchestration, unregister_orchestration, Heartbeat, IngestContext,
    OrchestrationHandle, StageReporter, CRAWL_SEMAPHORE,
};

/// A crawl ingest request.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub url: String,
    pub knowledge_type: String,
    pub tags: Vec<String>,
    pub update_frequency: i64,
    pub max_depth: usize,
    pub extract_code_examples: bool,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            knowledge_type: "technical".to_string(),
            tags: Vec::new(),
            update_frequency: 7,
            max_depth: 2,
            extract_code_examples: true,
        }
    }

    fn clamped_depth(&self) -> usize {
        self.max_depth.clamp(1, 5)
    }
}

/// Start a crawl orchestration as a detached, cancellable task.
///
/// The tracker must already exist; this seeds it, spawns the worker, and
/// registers the orchestration for the stop endpoint.
pub fn orchestrate_crawl(ctx: IngestContext, request: CrawlRequest, tracker: ProgressTracker) {
    let progress_id = tracker.progress_id().to_string();
    let cancel = CancellationToken::new();

    let url = request.url.clone();
    let initial_type = initial_crawl_type(&url);
    let mut initial = serde_json::Map::new();
    initial.insert("url".to_string(), Value::String(url.clone()));
    initial.insert("current_url".to_string(), Value::String(url.clone()));
    initial.insert("crawl_type".to_string(), Value::String(initial_type.to_string()));
    tracker.start(initial);

    let task_cancel = cancel.clone();
    let task = tokio::spawn(async move {
        run_crawl(ctx, request, tracker, task_cancel).await;
    });

    register_orchestration(
        &progress_id,
        OrchestrationHandle {
            token: cancel,
            abort: task.abort_handle(),
        },
    );
    tracing::info!("Started background crawl orchestration | progress_id={}", progress_id);
}

/// First guess at the crawl type, refined once content is fetched.
fn initial_crawl_type(url: &str) -> &'static str {
    if urls::is_sitemap(url) {
        "sitemap"
    } else if urls::is_txt(url) || urls::is_markdown(url) {
        if url.to_lowercase().contains("llms") {
            "llms-txt"
        } else {
            "text_file"
        }
    } else {
        "normal"
    }
}

async fn run_crawl(
    ctx: IngestContext,
    request: CrawlRequest,
    tracker: ProgressTracker,
    cancel: CancellationToken,
) {
    let progress_id = tracker.progress_id().to_string();
    let _permit = CRAWL_SEMAPHORE.acquire().await;
    tracing::info!("Acquired crawl semaphore | progress_id={}", progress_id);

    let mapper = Arc::new(std::sync::Mutex::new(ProgressMapper::new()));

    match run_crawl_inner(&ctx, &request, &tracker, &cancel, &mapper).await {
        Ok(()) => {}
        Err(e) if e.downcast_ref::<OperationCancelled>().is_some() => {
            tracing::info!("Crawl operation cancelled | progress_id={}", progress_id);
            let progress = mapper.lock().unwrap().current_progress();
            tracker.update(
                "cancelled",
                progress,
                "Crawl operation was cancelled by user",
                Default::default(),
            );
        }
        Err(e) => {
            tracing::error!("Async crawl orchestration failed: {:#}", e);
            tracker.error(&format!("Crawl failed: {}", e), None);
        }
    }

    unregister_orchestration(&progress_id);
}

async fn run_crawl_inner(
    ctx: &IngestContext,
    request: &CrawlRequest,
    tracker: &ProgressTracker,
    cancel: &CancellationToken,
    mapper: &Arc<std::sync::Mutex<ProgressMapper>>,
) -> crate::error::Result<()> {
    let url = request.url.clone();
    let source_id = urls::generate_unique_source_id(&url);
    let display_name = urls::extract_display_name(&url);
    tracing::info!(
        "Generated source_id '{}' and display name '{}' from URL '{}'",
        source_id,
        display_name,
        url
    );

    let mut heartbeat = Heartbeat::new(tracker.clone(), Arc::clone(mapper));
    let update = |stage: &str, pct: f64, message: String, extras: serde_json::Map<String, Value>| {
        let overall = mapper.lock().unwrap().map_by_name(stage, pct);
        tracker.update(stage, overall, &message, extras);
    };

    update(
        "starting",
        100.0,
        format!("Starting crawl of {}", url),
        extras(&[("current_url", json!(url))]),
    );
    cancel.check()?;

    update(
        "analyzing",
        50.0,
        format!("Analyzing URL type for {}", url),
        extras(&[("total_pages", json!(1)), ("processed_pages", json!(0))]),
    );

    // Crawl by URL type
    let (crawl_results, crawl_type) = crawl_by_url_type(ctx, request, tracker, cancel, mapper).await?;

    update(
        "crawling",
        100.0,
        format!("Processing {} content", crawl_type),
        extras(&[("crawl_type", json!(crawl_type))]),
    );
    cancel.check()?;
    heartbeat.beat_if_due();

    if crawl_results.is_empty() {
        return Err(CrawlError::NoContent.into());
    }

    update("processing", 50.0, "Processing crawled content".to_string(), Default::default());
    cancel.check()?;

    // Chunk every document into aligned storage arrays.
    let total_pages = crawl_results.len();
    let chunked = chunk_documents(request, &crawl_results, &source_id, &crawl_type, cancel).await?;
    let chunk_count = chunked.contents.len();
    let total_word_count: i64 = chunked.word_count;

    // Source row precedes every chunk write (FK).
    update(
        "source_creation",
        50.0,
        format!("Creating source record for {}", display_name),
        extras(&[("source_id", json!(source_id))]),
    );
    create_source_record(
        ctx,
        request,
        &source_id,
        &display_name,
        &chunked,
        total_word_count,
    )
    .await?;
    cancel.check()?;

    // Document storage
    let storage_reporter = StageReporter::new(tracker.clone(), Arc::clone(mapper), "document_storage");
    let DocumentStorageResult { chunks_stored } = add_documents_to_storage(
        &ctx.pool,
        &ctx.embeddings,
        &ctx.factory,
        DocumentStorageRequest {
            urls: chunked.urls.clone(),
            chunk_numbers: chunked.chunk_numbers.clone(),
            contents: chunked.contents.clone(),
            metadatas: chunked.metadatas.clone(),
            url_to_full_document: chunked.url_to_full_document.clone(),
        },
        &storage_reporter,
        cancel,
    )
    .await?;

    tracker.update(
        "document_storage",
        mapper.lock().unwrap().current_progress(),
        "Document storage finished",
        extras(&[("source_id", json!(source_id)), ("chunks_stored", json!(chunks_stored))]),
    );
    cancel.check()?;
    heartbeat.beat_if_due();

    // Fail fast: processed chunks but stored none means the store is broken.
    if chunk_count > 0 && chunks_stored == 0 {
        return Err(StorageError::ZeroStored {
            processed: chunk_count,
        }
        .into());
    }

    // Code extraction (optional)
    let mut code_examples_count = 0usize;
    if request.extract_code_examples && chunks_stored > 0 {
        cancel.check()?;
        update(
            "code_extraction",
            0.0,
            "Starting code extraction...".to_string(),
            Default::default(),
        );

        match extract_and_store_code_examples(ctx, request, &crawl_results, &source_id, tracker, cancel, mapper)
            .await
        {
            Ok(count) => code_examples_count = count,
            Err(e) if e.downcast_ref::<OperationCancelled>().is_some() => return Err(e),
            Err(e) => {
                // Code extraction failure never sinks the crawl.
                tracing::error!("Code extraction failed, continuing crawl without code examples: {:#}", e);
                let overall = mapper.lock().unwrap().map_by_name("code_extraction", 100.0);
                tracker.update(
                    "code_extraction",
                    overall,
                    &format!("Code extraction failed: {}. Continuing crawl without code examples.", e),
                    Default::default(),
                );
            }
        }
        cancel.check()?;
        heartbeat.beat_if_due();
    }

    // Finalization
    update(
        "finalization",
        50.0,
        "Finalizing crawl results...".to_string(),
        extras(&[
            ("chunks_stored", json!(chunks_stored)),
            ("code_examples_found", json!(code_examples_count)),
        ]),
    );

    tracker.complete(extras(&[
        ("chunks_stored", json!(chunks_stored)),
        ("code_examples_found", json!(code_examples_count)),
        ("processed_pages", json!(total_pages)),
        ("total_pages", json!(total_pages)),
        ("source_id", json!(source_id)),
        (
            "log",
            json!(format!(
                "Crawl completed: {} chunks, {} code examples",
                chunks_stored, code_examples_count
            )),
        ),
    ]));

    Ok(())
}

/// Detect URL type and perform the appropriate crawl.
async fn crawl_by_url_type(
    ctx: &IngestContext,
    request: &CrawlRequest,
    tracker: &ProgressTracker,
    cancel: &CancellationToken,
    mapper: &Arc<std::sync::Mutex<ProgressMapper>>,
) -> crate::error::Result<(Vec<PageResult>, String)> {
    let url = &request.url;
    let reporter = StageReporter::new(tracker.clone(), Arc::clone(mapper), "crawling");

    let update_crawl = |pct: f64, message: String, crawl_type: &str| {
        let overall = mapper.lock().unwrap().map_by_name("crawling", pct);
        tracker.update(
            "crawling",
            overall,
            &message,
            extras(&[("current_url", json!(url)), ("crawl_type", json!(crawl_type))]),
        );
    };

    if urls::is_txt(url) || urls::is_markdown(url) {
        let mut crawl_type = if url.to_lowercase().contains("llms") {
            "llms-txt".to_string()
        } else {
            "text_file".to_string()
        };
        update_crawl(50.0, "Detected text file, fetching content...".to_string(), &crawl_type);

        let mut results = crawl_markdown_file(&ctx.fetcher, url, &reporter, cancel).await?;

        // Link collection files fan out into a batch crawl of their links.
        if let Some(first) = results.first() {
            let content = first.markdown.clone();
            if urls::is_link_collection_file(url, Some(&content)) {
                let mut links = urls::extract_markdown_links(&content, Some(url));

                let before_self = links.len();
                links.retain(|link| !urls::is_self_link(link, url));
                if links.len() < before_self {
                    tracing::info!(
                        "Filtered out {} self-referential links from {} extracted links",
                        before_self - links.len(),
                        before_self
                    );
                }

                let before_binary = links.len();
                links.retain(|link| !urls::is_binary_file(link));
                if links.len() < before_binary {
                    tracing::info!(
                        "Filtered out {} binary files from {} extracted links",
                        before_binary - links.len(),
                        before_binary
                    );
                }

                if !links.is_empty() {
                    tracing::info!("Crawling {} extracted links from {}", links.len(), url);
                    let batch_results = crawl_batch_with_progress(
                        &ctx.fetcher,
                        &links,
                        None,
                        &reporter,
                        cancel,
                        None,
                    )
                    .await?;
                    tracing::info!(
                        "Link collection crawling completed: {} total results (1 text file + {} extracted links)",
                        results.len() + batch_results.len(),
                        batch_results.len()
                    );
                    results.extend(batch_results);
                    crawl_type = "link_collection_with_crawled_links".to_string();
                } else {
                    tracing::info!("No valid links found in link collection file: {}", url);
                }
            }
        }

        return Ok((results, crawl_type));
    }

    if urls::is_sitemap(url) {
        update_crawl(50.0, "Detected sitemap, parsing URLs...".to_string(), "sitemap");
        let sitemap_urls = parse_sitemap(ctx.fetcher.http(), url, Some(cancel)).await;

        let mut results = Vec::new();
        if !sitemap_urls.is_empty() {
            update_crawl(
                75.0,
                format!("Starting batch crawl of {} URLs...", sitemap_urls.len()),
                "sitemap",
            );
            results =
                crawl_batch_with_progress(&ctx.fetcher, &sitemap_urls, None, &reporter, cancel, None)
                    .await?;
        }
        return Ok((results, "sitemap".to_string()));
    }

    // Regular webpages: recursive crawl.
    let max_depth = request.clamped_depth();
    update_crawl(
        50.0,
        format!("Starting recursive crawl with max depth {}...", max_depth),
        "normal",
    );
    let results = crawl_recursive_with_progress(
        &ctx.fetcher,
        std::slice::from_ref(url),
        max_depth,
        None,
        &reporter,
        cancel,
    )
    .await?;
    Ok((results, "normal".to_string()))
}

/// Aligned chunk arrays produced from crawl results.
#[derive(Debug)]
pub(crate) struct ChunkedDocuments {
    pub urls: Vec<String>,
    pub chunk_numbers: Vec<i32>,
    pub contents: Vec<String>,
    pub metadatas: Vec<Value>,
    pub url_to_full_document: HashMap<String, String>,
    pub word_count: i64,
}

/// Chunk crawled documents into per-chunk arrays with metadata.
pub(crate) async fn chunk_documents(
    request: &CrawlRequest,
    crawl_results: &[PageResult],
    source_id: &str,
    crawl_type: &str,
    cancel: &CancellationToken,
) -> crate::error::Result<ChunkedDocuments> {
    let mut out = ChunkedDocuments {
        urls: Vec::new(),
        chunk_numbers: Vec::new(),
        contents: Vec::new(),
        metadatas: Vec::new(),
        url_to_full_document: HashMap::new(),
        word_count: 0,
    };

    for (doc_index, doc) in crawl_results.iter().enumerate() {
        let doc_url = doc.url.trim();
        let markdown = doc.markdown.trim();
        if doc_url.is_empty() || markdown.is_empty() {
            tracing::debug!("Skipping document {}: empty URL or content", doc_index);
            continue;
        }

        out.url_to_full_document
            .insert(doc_url.to_string(), markdown.to_string());

        let chunks = smart_chunk_text(markdown, DEFAULT_CHUNK_SIZE);
        for (i, chunk) in chunks.into_iter().enumerate() {
            if i % 10 == 0 {
                cancel.check()?;
            }

            let word_count = chunk.split_whitespace().count() as i64;
            out.word_count += word_count;

            out.metadatas.push(json!({
                "url": doc_url,
                "title": doc.title.clone().unwrap_or_default(),
                "source_id": source_id,
                "knowledge_type": request.knowledge_type,
                "source_type": "url",
                "crawl_type": crawl_type,
                "word_count": word_count,
                "char_count": chunk.len(),
                "chunk_index": i,
                "tags": request.tags,
            }));
            out.urls.push(doc_url.to_string());
            out.chunk_numbers.push(i as i32);
            out.contents.push(chunk);

            if i > 0 && i % 10 == 0 {
                tokio::task::yield_now().await;
            }
        }

        if doc_index > 0 && doc_index % 5 == 0 {
            tokio::task::yield_now().await;
        }
    }

    Ok(out)
}

/// Create or update the source row, summarized from the first chunks.
async fn create_source_record(
    ctx: &IngestContext,
    request: &CrawlRequest,
    source_id: &str,
    display_name: &str,
    chunked: &ChunkedDocuments,
    total_word_count: i64,
) -> crate::error::Result<()> {
    // First three chunks, capped, make the summary input.
    let mut combined = String::new();
    for chunk in chunked.contents.iter().take(3) {
        if combined.len() + chunk.len() >= 15_000 {
            break;
        }
        combined.push(' ');
        combined.push_str(chunk);
    }

    let summary = extract_source_summary(
        &ctx.factory,
        source_id,
        &combined,
        chunked.url_to_full_document.len(),
    )
    .await;

    update_source_info(
        &ctx.pool,
        &SourceInfo {
            source_id: source_id.to_string(),
            summary,
            word_count: total_word_count,
            content_preview: combined.trim().to_string(),
            knowledge_type: request.knowledge_type.clone(),
            tags: request.tags.clone(),
            update_frequency: request.update_frequency,
            original_url: Some(request.url.clone()),
            source_url: Some(request.url.clone()),
            source_display_name: Some(display_name.to_string()),
            source_type: "url".to_string(),
        },
    )
    .await?;
    Ok(())
}

/// Extract, summarize, and store code examples. Returns the stored count.
async fn extract_and_store_code_examples(
    ctx: &IngestContext,
    request: &CrawlRequest,
    crawl_results: &[PageResult],
    source_id: &str,
    tracker: &ProgressTracker,
    cancel: &CancellationToken,
    mapper: &Arc<std::sync::Mutex<ProgressMapper>>,
) -> crate::error::Result<usize> {
    let config = ExtractionConfig::load(&ctx.settings);

    let mut block_urls = Vec::new();
    let mut chunk_numbers = Vec::new();
    let mut blocks = Vec::new();
    for doc in crawl_results {
        let doc_blocks = extract_code_blocks(&doc.markdown, &config);
        for (i, block) in doc_blocks.into_iter().enumerate() {
            cancel.check()?;
            block_urls.push(doc.url.clone());
            chunk_numbers.push(i as i32);
            blocks.push(block);
        }
    }

    let found = blocks.len();
    {
        let overall = mapper.lock().unwrap().map_by_name("code_extraction", 0.0);
        tracker.update(
            "code_extraction",
            overall,
            &format!("Found {} code blocks", found),
            extras(&[("code_blocks_found", json!(found))]),
        );
    }
    if blocks.is_empty() {
        return Ok(0);
    }

    // Summarize with bounded concurrency, then store.
    let summary_reporter = StageReporter::new(tracker.clone(), Arc::clone(mapper), "code_extraction");
    let summaries =
        generate_code_summaries_batch(&ctx.factory, &blocks, &summary_reporter, cancel, None).await;
    cancel.check()?;

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

    let storage_reporter = StageReporter::new(tracker.clone(), Arc::clone(mapper), "code_storage");
    let stored = add_code_examples_to_storage(
        &ctx.pool,
        &ctx.embeddings,
        &ctx.factory,
        CodeStorageRequest {
            urls: block_urls,
            chunk_numbers,
            code_examples: blocks.iter().map(|b| b.code.clone()).collect(),
            summaries: summaries.iter().map(|s| s.summary.clone()).collect(),
            metadatas,
        },
        &storage_reporter,
        cancel,
    )
    .await?;

    Ok(stored)
}

pub(crate) fn extras(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_crawl_type() {
        assert_eq!(initial_crawl_type("https://x.com/sitemap.xml"), "sitemap");
        assert_eq!(initial_crawl_type("https://x.com/llms.txt"), "llms-txt");
        assert_eq!(initial_crawl_type("https://x.com/notes.txt"), "text_file");
        assert_eq!(initial_crawl_type("https://x.com/readme.md"), "text_file");
        assert_eq!(initial_crawl_type("https://x.com/docs"), "normal");
    }

    #[test]
    fn test_request_depth_clamped() {
        let mut request = CrawlRequest::new("https://x.com");
        request.max_depth = 0;
        assert_eq!(request.clamped_depth(), 1);
        request.max_depth = 12;
        assert_eq!(request.clamped_depth(), 5);
        request.max_depth = 3;
        assert_eq!(request.clamped_depth(), 3);
    }

    #[tokio::test]
    async fn test_chunk_documents_builds_aligned_arrays() {
        let request = CrawlRequest::new("https://docs.example.com/llms.txt");
        let pages = vec![
            PageResult {
                url: "https://docs.example.com/a".to_string(),
                markdown: "alpha content with words".to_string(),
                html: String::new(),
                title: Some("A".to_string()),
                internal_links: Vec::new(),
                external_links: Vec::new(),
            },
            PageResult {
                url: "https://docs.example.com/empty".to_string(),
                markdown: "   ".to_string(),
                html: String::new(),
                title: None,
                internal_links: Vec::new(),
                external_links: Vec::new(),
            },
        ];
        let cancel = CancellationToken::new();
        let chunked = chunk_documents(&request, &pages, "abc123", "text_file", &cancel)
            .await
            .unwrap();

        assert_eq!(chunked.urls.len(), chunked.contents.len());
        assert_eq!(chunked.urls.len(), chunked.chunk_numbers.len());
        assert_eq!(chunked.urls.len(), chunked.metadatas.len());
        // Empty document dropped entirely.
        assert!(chunked.urls.iter().all(|u| u.ends_with("/a")));
        assert_eq!(chunked.metadatas[0]["source_id"], "abc123");
        assert_eq!(chunked.metadatas[0]["chunk_index"], 0);
        assert!(chunked.word_count > 0);
    }

    #[tokio::test]
    async fn test_chunk_documents_respects_cancellation() {
        let request = CrawlRequest::new("https://x.com");
        let pages = vec![PageResult {
            url: "https://x.com/long".to_string(),
            markdown: "word ".repeat(100_000),
            html: String::new(),
            title: None,
            internal_links: Vec::new(),
            external_links: Vec::new(),
        }];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = chunk_documents(&request, &pages, "abc", "normal", &cancel)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<OperationCancelled>().is_some());
    }
}
