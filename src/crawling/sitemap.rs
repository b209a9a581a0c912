// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sitemap parsing.
//!
//! Fetches an XML sitemap and yields the `<loc>` URL list. Every failure
//! mode - network, HTTP status, malformed XML - is logged and produces an
//! empty list; the orchestrator turns "no URLs" into its own error.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::progress::CancellationToken;

static LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>").unwrap());

/// Parse a sitemap and extract its URLs.
pub async fn parse_sitemap(
    client: &reqwest::Client,
    sitemap_url: &str,
    cancel: Option<&CancellationToken>,
) -> Vec<String> {
    if let Some(cancel) = cancel {
        if cancel.is_cancelled() {
            return Vec::new();
        }
    }

    tracing::info!("Parsing sitemap: {}", sitemap_url);

    let response = match client
        .get(sitemap_url)
        .timeout(Duration::from_secs(30))
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("Network error fetching sitemap from {}: {}", sitemap_url, e);
            return Vec::new();
        }
    };

    if !response.status().is_success() {
        tracing::error!("Failed to fetch sitemap: HTTP {}", response.status());
        return Vec::new();
    }

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            tracing::error!("Error reading sitemap body from {}: {}", sitemap_url, e);
            return Vec::new();
        }
    };

    let urls = extract_loc_urls(&body);
    tracing::info!("Successfully extracted {} URLs from sitemap", urls.len());
    urls
}

/// Pull `<loc>` values out of sitemap XML.
pub fn extract_loc_urls(xml: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(xml)
        .map(|caps| caps[1].trim().to_string())
        .filter(|url| !url.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_loc_urls() {
        let xml = r#"<?xml version="1.0"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/a</loc></url>
  <url><loc>
    https://example.com/b
  </loc></url>
</urlset>"#;
        assert_eq!(
            extract_loc_urls(xml),
            vec!["https://example.com/a", "https://example.com/b"]
        );
    }

    #[test]
    fn test_extract_loc_empty_for_garbage() {
        assert!(extract_loc_urls("not xml at all").is_empty());
        assert!(extract_loc_urls("<urlset></urlset>").is_empty());
    }
}
