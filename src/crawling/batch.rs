// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Batch crawling of multiple URLs in parallel.
//!
//! URLs are processed in slices of `CRAWL_BATCH_SIZE`; within a slice pages
//! fetch concurrently under the memory-adaptive dispatcher. Progress is the
//! smooth fraction of all URLs processed. Cancellation exits after the
//! current slice with partial results.

use std::collections::HashMap;

use futures_util::stream::{FuturesUnordered, StreamExt};

use crate::error::CrawlError;
use crate::progress::{CancellationToken, ProgressReporter, ProgressUpdate};

use super::fetcher::{CrawlSiteProfile, PageFetcher, PageResult};
use super::urls::{is_documentation_site, transform_github_url};
use super::{build_dispatcher, CrawlConfig};

/// Batch crawl multiple URLs in parallel with progress reporting.
///
/// `link_text_fallbacks` maps URLs to the link text they were discovered
/// under; it backs the title fallback chain `<title>` -> link text ->
/// `"Untitled"`.
pub async fn crawl_batch_with_progress(
    fetcher: &PageFetcher,
    urls: &[String],
    max_concurrent: Option<usize>,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
    link_text_fallbacks: Option<&HashMap<String, String>>,
) -> Result<Vec<PageResult>, CrawlError> {
    if urls.is_empty() {
        return Ok(Vec::new());
    }

    let has_doc_sites = urls.iter().any(|u| is_documentation_site(u));
    if has_doc_sites {
        tracing::info!("Detected documentation sites in batch, using enhanced configuration");
    }
    let config = CrawlConfig::load(fetcher.settings(), has_doc_sites)?;
    let dispatcher = build_dispatcher(&config, max_concurrent);

    let total_urls = urls.len();
    report(
        reporter,
        "crawling",
        0.0,
        format!("Starting to crawl {} URLs...", total_urls),
        total_urls,
        0,
        0,
    )
    .await;

    let profile = if has_doc_sites {
        CrawlSiteProfile::Documentation
    } else {
        CrawlSiteProfile::Default
    };

    let mut successful: Vec<PageResult> = Vec::new();
    let mut processed = 0usize;
    let mut cancelled = false;

    for (batch_start, batch_urls) in urls.chunks(config.batch_size).enumerate().map(|(i, c)| (i * config.batch_size, c)) {
        if cancel.check().is_err() {
            cancelled = true;
            report(
                reporter,
                "cancelled",
                progress_pct(processed, total_urls).min(99.0),
                "Crawl cancelled".to_string(),
                total_urls,
                processed,
                successful.len(),
            )
            .await;
            break;
        }

        dispatcher.defer_if_pressured().await;
        let workers = dispatcher.permitted_workers();
        let batch_end = (batch_start + batch_urls.len()).min(total_urls);

        report(
            reporter,
            "crawling",
            progress_pct(batch_start, total_urls),
            format!(
                "Processing batch {}-{} of {} URLs...",
                batch_start + 1,
                batch_end,
                total_urls
            ),
            total_urls,
            processed,
            successful.len(),
        )
        .await;

        tracing::info!(
            "Starting parallel crawl of batch {}-{} ({} URLs, {} workers)",
            batch_start + 1,
            batch_end,
            batch_urls.len(),
            workers
        );

        let semaphore = std::sync::Arc::new(tokio::sync::Semaphore::new(workers));
        let mut in_flight = FuturesUnordered::new();
        for url in batch_urls {
            let semaphore = semaphore.clone();
            let target = transform_github_url(url);
            in_flight.push(async move {
                let _permit = semaphore.acquire().await;
                let outcome = fetcher.fetch_page(&target, profile).await;
                (url.clone(), outcome)
            });
        }

        while let Some((original_url, outcome)) = in_flight.next().await {
            if cancel.check().is_err() {
                cancelled = true;
                report(
                    reporter,
                    "cancelled",
                    progress_pct(processed, total_urls).min(99.0),
                    "Crawl cancelled".to_string(),
                    total_urls,
                    processed,
                    successful.len(),
                )
                .await;
                break;
            }

            processed += 1;
            match outcome {
                Ok(mut page) => {
                    page.url = original_url.clone();
                    page.title = Some(resolve_title(
                        page.title.take(),
                        &original_url,
                        link_text_fallbacks,
                    ));
                    successful.push(page);
                }
                Err(e) => {
                    tracing::warn!("Failed to crawl {}: {}", original_url, e);
                }
            }

            if processed % 5 == 0 || processed == total_urls {
                report(
                    reporter,
                    "crawling",
                    progress_pct(processed, total_urls),
                    format!("Crawled {}/{} pages", processed, total_urls),
                    total_urls,
                    processed,
                    successful.len(),
                )
                .await;
            }
        }

        if cancelled {
            break;
        }
    }

    if cancelled {
        return Ok(successful);
    }

    report(
        reporter,
        "crawling",
        100.0,
        format!(
            "Batch crawling completed: {}/{} pages successful",
            successful.len(),
            total_urls
        ),
        total_urls,
        processed,
        successful.len(),
    )
    .await;

    Ok(successful)
}

/// Resolve a page title via the fallback chain.
fn resolve_title(
    extracted: Option<String>,
    url: &str,
    link_text_fallbacks: Option<&HashMap<String, String>>,
) -> String {
    if let Some(title) = extracted.filter(|t| !t.trim().is_empty()) {
        return title;
    }
    if let Some(text) = link_text_fallbacks
        .and_then(|map| map.get(url))
        .filter(|t| !t.trim().is_empty())
    {
        return text.clone();
    }
    "Untitled".to_string()
}

fn progress_pct(processed: usize, total: usize) -> f64 {
    ((processed as f64 / total.max(1) as f64) * 100.0).floor()
}

async fn report(
    reporter: &dyn ProgressReporter,
    status: &str,
    progress: f64,
    message: String,
    total_pages: usize,
    processed_pages: usize,
    successful_count: usize,
) {
    let step = message.clone();
    reporter
        .report(
            ProgressUpdate::new(status, progress, message)
                .with("current_step", step.clone())
                .with("step_message", step)
                .with("total_pages", total_pages)
                .with("processed_pages", processed_pages)
                .with("successful_count", successful_count),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_title_fallback_chain() {
        let mut fallbacks = HashMap::new();
        fallbacks.insert("https://a.com".to_string(), "Link Text".to_string());

        assert_eq!(
            resolve_title(Some("Real Title".into()), "https://a.com", Some(&fallbacks)),
            "Real Title"
        );
        assert_eq!(
            resolve_title(None, "https://a.com", Some(&fallbacks)),
            "Link Text"
        );
        assert_eq!(
            resolve_title(Some("  ".into()), "https://a.com", Some(&fallbacks)),
            "Link Text"
        );
        assert_eq!(resolve_title(None, "https://b.com", Some(&fallbacks)), "Untitled");
        assert_eq!(resolve_title(None, "https://b.com", None), "Untitled");
    }

    #[test]
    fn test_progress_is_floored_fraction() {
        assert_eq!(progress_pct(1, 3), 33.0);
        assert_eq!(progress_pct(2, 3), 66.0);
        assert_eq!(progress_pct(3, 3), 100.0);
        assert_eq!(progress_pct(0, 0), 0.0);
    }
}
