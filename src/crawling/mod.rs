// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Web crawling: URL helpers, the page fetch engine, and the batch /
//! recursive / sitemap strategies.
//!
//! Every strategy is cancellable through a [`CancellationToken`] and reports
//! stage-local progress through a [`ProgressReporter`]. Parallelism within a
//! crawl is bounded by `CRAWL_MAX_CONCURRENT` and the memory-adaptive
//! dispatcher; whole-crawl concurrency is the orchestrator's concern.

pub mod batch;
pub mod dispatcher;
pub mod fetcher;
pub mod recursive;
pub mod sitemap;
pub mod urls;

pub use batch::crawl_batch_with_progress;
pub use dispatcher::MemoryAdaptiveDispatcher;
pub use fetcher::{CrawlSiteProfile, PageFetcher, PageResult};
pub use recursive::crawl_recursive_with_progress;
pub use sitemap::parse_sitemap;

use std::sync::Arc;
use std::time::Duration;

use crate::config::SettingsCache;
use crate::error::CrawlError;
use crate::progress::{CancellationToken, ProgressReporter};

/// Crawl tunables loaded from settings.
///
/// Structural keys fail fast on malformed values instead of silently
/// defaulting; bounds are clamped afterwards.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub memory_threshold_percent: f64,
    pub check_interval: Duration,
    pub wait_strategy: String,
    pub page_timeout: Duration,
    pub delay_before_html: Duration,
}

impl CrawlConfig {
    /// Load crawl settings, using the enhanced profile's timeouts for
    /// documentation sites.
    pub fn load(settings: &SettingsCache, doc_site: bool) -> Result<Self, CrawlError> {
        let parse_int = |key: &str, default: i64| -> Result<i64, CrawlError> {
            match settings.get(key) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    CrawlError::ConfigInvalid(format!("{}='{}' is not an integer", key, raw))
                }),
                None => Ok(default),
            }
        };
        let parse_float = |key: &str, default: f64| -> Result<f64, CrawlError> {
            match settings.get(key) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    CrawlError::ConfigInvalid(format!("{}='{}' is not a number", key, raw))
                }),
                None => Ok(default),
            }
        };

        let raw_batch = parse_int("CRAWL_BATCH_SIZE", 50)?;
        let batch_size = raw_batch.max(1) as usize;
        if batch_size as i64 != raw_batch {
            tracing::warn!("Invalid CRAWL_BATCH_SIZE={}, clamped to {}", raw_batch, batch_size);
        }

        let raw_concurrent = parse_int("CRAWL_MAX_CONCURRENT", 10)?;
        let max_concurrent = raw_concurrent.max(1) as usize;
        if max_concurrent as i64 != raw_concurrent {
            tracing::warn!(
                "Invalid CRAWL_MAX_CONCURRENT={}, clamped to {}",
                raw_concurrent,
                max_concurrent
            );
        }

        let raw_threshold = parse_float("MEMORY_THRESHOLD_PERCENT", 80.0)?;
        let memory_threshold_percent = raw_threshold.clamp(10.0, 99.0);
        if (memory_threshold_percent - raw_threshold).abs() > f64::EPSILON {
            tracing::warn!(
                "Invalid MEMORY_THRESHOLD_PERCENT={}, clamped to {}",
                raw_threshold,
                memory_threshold_percent
            );
        }

        let check_interval = Duration::from_secs_f64(
            parse_float("DISPATCHER_CHECK_INTERVAL", 0.5)?.max(0.05),
        );

        let default_timeout = if doc_site { 30_000 } else { 45_000 };
        let page_timeout =
            Duration::from_millis(parse_int("CRAWL_PAGE_TIMEOUT", default_timeout)?.max(1000) as u64);

        let default_delay = if doc_site { 1.0 } else { 0.5 };
        let delay_before_html =
            Duration::from_secs_f64(parse_float("CRAWL_DELAY_BEFORE_HTML", default_delay)?.max(0.0));

        Ok(Self {
            batch_size,
            max_concurrent,
            memory_threshold_percent,
            check_interval,
            wait_strategy: settings.get_str("CRAWL_WAIT_STRATEGY", "domcontentloaded"),
            page_timeout,
            delay_before_html,
        })
    }
}

/// Crawl a single page with retries, applying the GitHub raw transform.
pub async fn crawl_single_page(
    fetcher: &PageFetcher,
    url: &str,
    retry_count: u32,
) -> Result<PageResult, CrawlError> {
    let target = urls::transform_github_url(url);
    let profile = if urls::is_documentation_site(&target) {
        CrawlSiteProfile::Documentation
    } else {
        CrawlSiteProfile::Default
    };

    let mut last_error = None;
    for attempt in 0..retry_count.max(1) {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_secs(1u64 << attempt.min(3))).await;
        }
        match fetcher.fetch_page(&target, profile).await {
            Ok(mut page) => {
                // Results carry the requested URL, not the transformed one.
                page.url = url.to_string();
                return Ok(page);
            }
            Err(e) => {
                tracing::warn!("Failed to crawl {} (attempt {}): {}", target, attempt + 1, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or(CrawlError::NoContent))
}

/// Fetch a text/markdown file and wrap it as a single-page result.
pub async fn crawl_markdown_file(
    fetcher: &PageFetcher,
    url: &str,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<Vec<PageResult>, CrawlError> {
    if cancel.is_cancelled() {
        return Ok(Vec::new());
    }
    let page = crawl_single_page(fetcher, url, 3).await?;
    reporter
        .report(
            crate::progress::ProgressUpdate::new("crawling", 100.0, format!("Fetched {}", url))
                .with("total_pages", 1)
                .with("processed_pages", 1),
        )
        .await;
    Ok(vec![page])
}

/// Build the shared dispatcher for a crawl run.
pub fn build_dispatcher(config: &CrawlConfig, override_concurrent: Option<usize>) -> MemoryAdaptiveDispatcher {
    MemoryAdaptiveDispatcher::new(
        config.memory_threshold_percent,
        override_concurrent.unwrap_or(config.max_concurrent).max(1),
        config.check_interval,
    )
}

/// Shared settings handle type used across strategies.
pub type SharedSettings = Arc<SettingsCache>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_config_defaults() {
        let settings = SettingsCache::new();
        let config = CrawlConfig::load(&settings, false).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.page_timeout, Duration::from_millis(45_000));

        let doc_config = CrawlConfig::load(&settings, true).unwrap();
        assert_eq!(doc_config.page_timeout, Duration::from_millis(30_000));
    }

    #[test]
    fn test_crawl_config_fails_fast_on_garbage() {
        let settings = SettingsCache::new();
        settings.seed("CRAWL_BATCH_SIZE", "banana");
        let err = CrawlConfig::load(&settings, false).unwrap_err();
        assert!(matches!(err, CrawlError::ConfigInvalid(_)));
    }

    #[test]
    fn test_crawl_config_clamps_bounds() {
        let settings = SettingsCache::new();
        settings.seed("CRAWL_BATCH_SIZE", "0");
        settings.seed("MEMORY_THRESHOLD_PERCENT", "150");
        let config = CrawlConfig::load(&settings, false).unwrap();
        assert_eq!(config.batch_size, 1);
        assert!((config.memory_threshold_percent - 99.0).abs() < f64::EPSILON);
    }
}
