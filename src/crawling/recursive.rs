// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Recursive crawling: breadth-first over internal links.
//!
//! Each depth level batch-crawls the frontier, collects newly discovered
//! internal links (fragments stripped, binaries and visited URLs skipped)
//! into the next frontier, and reports progress weighted by depth so later
//! levels contribute proportionally.

use std::collections::HashSet;

use futures_util::stream::{FuturesUnordered, StreamExt};
use url::Url;

use crate::error::CrawlError;
use crate::progress::{CancellationToken, ProgressReporter, ProgressUpdate};

use super::fetcher::{CrawlSiteProfile, PageFetcher, PageResult};
use super::urls::{is_binary_file, is_documentation_site, transform_github_url};
use super::{build_dispatcher, CrawlConfig};

/// Recursively crawl internal links from start URLs up to `max_depth`.
pub async fn crawl_recursive_with_progress(
    fetcher: &PageFetcher,
    start_urls: &[String],
    max_depth: usize,
    max_concurrent: Option<usize>,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Vec<PageResult>, CrawlError> {
    if start_urls.is_empty() {
        return Ok(Vec::new());
    }
    let max_depth = max_depth.max(1);

    let has_doc_sites = start_urls.iter().any(|u| is_documentation_site(u));
    if has_doc_sites {
        tracing::info!("Detected documentation sites for recursive crawl, using enhanced configuration");
    }
    let config = CrawlConfig::load(fetcher.settings(), has_doc_sites)?;
    let dispatcher = build_dispatcher(&config, max_concurrent);
    let profile = if has_doc_sites {
        CrawlSiteProfile::Documentation
    } else {
        CrawlSiteProfile::Default
    };

    let mut visited: HashSet<String> = HashSet::new();
    let mut current_urls: HashSet<String> =
        start_urls.iter().map(|u| normalize_url(u)).collect();
    let mut results_all: Vec<PageResult> = Vec::new();
    let mut total_processed = 0usize;
    let mut total_discovered = current_urls.len();
    let mut cancelled = false;

    for depth in 0..max_depth {
        if cancel.check().is_err() {
            cancelled = true;
            report(
                reporter,
                "cancelled",
                ((depth as f64 / max_depth as f64) * 99.0).floor(),
                format!("Crawl cancelled at depth {}", depth + 1),
                total_discovered,
                total_processed,
            )
            .await;
            break;
        }

        let urls_to_crawl: Vec<String> = current_urls
            .iter()
            .filter(|url| !visited.contains(*url))
            .cloned()
            .collect();
        if urls_to_crawl.is_empty() {
            break;
        }

        report(
            reporter,
            "crawling",
            ((depth as f64 / max_depth as f64) * 100.0).floor(),
            format!(
                "Crawling depth {}/{}: {} URLs to process",
                depth + 1,
                max_depth,
                urls_to_crawl.len()
            ),
            total_discovered,
            total_processed,
        )
        .await;

        let urls_at_depth = urls_to_crawl.len();
        let mut next_level_urls: HashSet<String> = HashSet::new();
        let mut depth_successful = 0usize;

        for (batch_idx, batch_urls) in urls_to_crawl.chunks(config.batch_size).enumerate() {
            if cancel.check().is_err() {
                cancelled = true;
                break;
            }

            dispatcher.defer_if_pressured().await;
            let workers = dispatcher.permitted_workers();
            let batch_offset = batch_idx * config.batch_size;

            let progress_within_depth = batch_offset as f64 / urls_at_depth.max(1) as f64;
            let overall = (((depth as f64 + progress_within_depth) / max_depth as f64) * 100.0)
                .floor()
                .min(99.0);
            report(
                reporter,
                "crawling",
                overall,
                format!(
                    "Crawling URLs {}-{} of {} at depth {}",
                    batch_offset + 1,
                    (batch_offset + batch_urls.len()).min(urls_at_depth),
                    urls_at_depth,
                    depth + 1
                ),
                total_discovered,
                total_processed,
            )
            .await;

            tracing::info!(
                "Starting parallel crawl of {} URLs at depth {}",
                batch_urls.len(),
                depth + 1
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
                        ((total_processed as f64 / total_discovered.max(1) as f64) * 100.0)
                            .floor()
                            .min(99.0),
                        "Crawl cancelled during batch processing".to_string(),
                        total_discovered,
                        total_processed,
                    )
                    .await;
                    break;
                }

                let norm_url = normalize_url(&original_url);
                visited.insert(norm_url);
                total_processed += 1;

                match outcome {
                    Ok(mut page) => {
                        page.url = original_url.clone();
                        depth_successful += 1;

                        // Queue internal links for the next depth.
                        for link in &page.internal_links {
                            let next_url = normalize_url(link);
                            if is_binary_file(&next_url) {
                                tracing::debug!("Skipping binary file from crawl queue: {}", next_url);
                                continue;
                            }
                            if !visited.contains(&next_url) && next_level_urls.insert(next_url) {
                                total_discovered += 1;
                            }
                        }

                        results_all.push(page);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to crawl {}: {}", original_url, e);
                    }
                }
            }

            if cancelled {
                break;
            }
        }

        if cancelled {
            break;
        }

        current_urls = next_level_urls;

        report(
            reporter,
            "crawling",
            (((depth + 1) as f64 / max_depth as f64) * 100.0).floor(),
            format!(
                "Depth {} completed: {} pages crawled, {} URLs found for next depth",
                depth + 1,
                depth_successful,
                current_urls.len()
            ),
            total_discovered,
            total_processed,
        )
        .await;
    }

    Ok(results_all)
}

/// Strip the fragment so page#a and page#b crawl once.
fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}

async fn report(
    reporter: &dyn ProgressReporter,
    status: &str,
    progress: f64,
    message: String,
    total_pages: usize,
    processed_pages: usize,
) {
    reporter
        .report(
            ProgressUpdate::new(status, progress, message)
                .with("total_pages", total_pages)
                .with("processed_pages", processed_pages),
        )
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_strips_fragment_only() {
        assert_eq!(
            normalize_url("https://example.com/page#section"),
            "https://example.com/page"
        );
        assert_eq!(
            normalize_url("https://example.com/page?q=1#x"),
            "https://example.com/page?q=1"
        );
        assert_eq!(normalize_url("not a url"), "not a url");
    }
}
