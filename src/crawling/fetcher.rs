// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Page fetch engine.
//!
//! Wraps an HTTP client and HTML-to-markdown conversion behind the contract
//! the strategies rely on: given a URL, produce `{url, markdown, html, title,
//! links}`. Text and markdown responses pass through untouched; HTML is
//! reduced to a markdown rendition good enough for chunking and code-block
//! extraction (faithful reproduction of a browser-grade converter is a
//! non-goal).

use std::collections::HashSet;
use std::time::Instant;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::SettingsCache;
use crate::error::CrawlError;

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;

use super::CrawlConfig;

/// Which crawl profile to apply for a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlSiteProfile {
    /// Generic pages.
    Default,
    /// Known documentation sites: shorter timeout, longer settle delay.
    Documentation,
}

/// One crawled page.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub url: String,
    pub markdown: String,
    pub html: String,
    pub title: Option<String>,
    /// Same-host links found on the page.
    pub internal_links: Vec<String>,
    /// Off-host links found on the page.
    pub external_links: Vec<String>,
}

/// HTTP-backed page fetcher.
pub struct PageFetcher {
    client: reqwest::Client,
    settings: std::sync::Arc<SettingsCache>,
}

impl PageFetcher {
    pub fn new(settings: std::sync::Arc<SettingsCache>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("archon-crawler/0.1")
            .redirect(reqwest::redirect::Policy::limited(8))
            .build()
            .unwrap_or_default();
        Self { client, settings }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn settings(&self) -> &SettingsCache {
        &self.settings
    }

    /// Fetch a single page and convert it to the crawl result shape.
    pub async fn fetch_page(
        &self,
        url: &str,
        profile: CrawlSiteProfile,
    ) -> Result<PageResult, CrawlError> {
        let start = Instant::now();
        let config = CrawlConfig::load(&self.settings, profile == CrawlSiteProfile::Documentation)?;

        let response = self
            .client
            .get(url)
            .timeout(config.page_timeout)
            .send()
            .await
            .map_err(|e| CrawlError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::Network {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();

        let body = response.text().await.map_err(|e| CrawlError::Network {
            url: url.to_string(),
            message: format!("failed to read body: {}", e),
        })?;

        // Give slow origins a beat before parsing, mirroring the render
        // settle delay of browser-based crawlers.
        if !config.delay_before_html.is_zero() && content_type.contains("html") {
            tokio::time::sleep(config.delay_before_html.min(std::time::Duration::from_secs(2))).await;
        }

        let result = if content_type.contains("html") || looks_like_html(&body) {
            let (markdown, title) = html_to_markdown(&body);
            let (internal_links, external_links) = extract_page_links(&body, url);
            PageResult {
                url: url.to_string(),
                markdown,
                html: body,
                title,
                internal_links,
                external_links,
            }
        } else {
            // Plain text / markdown: the body is already the content.
            PageResult {
                url: url.to_string(),
                markdown: body.clone(),
                html: body,
                title: None,
                internal_links: Vec::new(),
                external_links: Vec::new(),
            }
        };

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation("crawl.fetch_page", start.elapsed());
            GLOBAL_METRICS.increment("crawl.pages_fetched", 1);
        }
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        Ok(result)
    }
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start().get(..256).unwrap_or(body.trim_start());
    let lower = head.to_lowercase();
    lower.starts_with("<!doctype html") || lower.starts_with("<html")
}

/// Extract the `<title>` text from an HTML document.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    let title = document
        .select(&selector)
        .next()?
        .text()
        .collect::<String>()
        .trim()
        .to_string();
    (!title.is_empty()).then_some(title)
}

/// Convert an HTML document to a markdown rendition plus its title.
pub fn html_to_markdown(html: &str) -> (String, Option<String>) {
    let document = Html::parse_document(html);
    let title = extract_title(html);

    let body_selector = Selector::parse("body").unwrap();
    let root = document.select(&body_selector).next();

    let mut out = String::new();
    match root {
        Some(body) => render_children(body, &mut out),
        None => {
            if let Some(root) = document.root_element().child_elements().next() {
                render_children(root, &mut out);
            }
        }
    }

    // Collapse runs of blank lines left by skipped elements.
    let mut cleaned = String::with_capacity(out.len());
    let mut blank_run = 0;
    for line in out.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
            cleaned.push('\n');
        } else {
            blank_run = 0;
            cleaned.push_str(line.trim_end());
            cleaned.push('\n');
        }
    }

    (cleaned.trim().to_string(), title)
}

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "nav", "footer", "header", "iframe", "svg"];

fn render_children(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            let collapsed = collapse_whitespace(text);
            if !collapsed.is_empty() {
                out.push_str(&collapsed);
            }
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        render_element(child_el, out);
    }
}

fn render_element(element: ElementRef<'_>, out: &mut String) {
    let tag = element.value().name();
    if SKIPPED_TAGS.contains(&tag) {
        return;
    }

    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = tag.as_bytes()[1] - b'0';
            out.push_str("\n\n");
            out.push_str(&"#".repeat(level as usize));
            out.push(' ');
            out.push_str(element.text().collect::<String>().trim());
            out.push_str("\n\n");
        }
        "p" => {
            out.push_str("\n\n");
            render_children(element, out);
            out.push_str("\n\n");
        }
        "br" => out.push('\n'),
        "hr" => out.push_str("\n\n---\n\n"),
        "pre" => {
            let language = element
                .select(&Selector::parse("code").unwrap())
                .next()
                .and_then(code_language)
                .unwrap_or_default();
            let code: String = element.text().collect();
            out.push_str("\n\n```");
            out.push_str(&language);
            out.push('\n');
            out.push_str(code.trim_end());
            out.push_str("\n```\n\n");
        }
        "code" => {
            // Inline code; block code is handled by the pre branch.
            let text: String = element.text().collect();
            out.push('`');
            out.push_str(&text);
            out.push('`');
        }
        "a" => {
            let text: String = element.text().collect::<String>().trim().to_string();
            match element.value().attr("href") {
                Some(href) if !text.is_empty() => {
                    out.push_str(&format!("[{}]({})", text, href));
                }
                _ => render_children(element, out),
            }
        }
        "li" => {
            out.push_str("\n- ");
            render_children(element, out);
        }
        "ul" | "ol" => {
            render_children(element, out);
            out.push('\n');
        }
        "strong" | "b" => {
            out.push_str("**");
            render_children(element, out);
            out.push_str("**");
        }
        "em" | "i" => {
            out.push('*');
            render_children(element, out);
            out.push('*');
        }
        "blockquote" => {
            out.push_str("\n\n> ");
            render_children(element, out);
            out.push_str("\n\n");
        }
        "td" | "th" => {
            render_children(element, out);
            out.push_str(" | ");
        }
        "tr" => {
            out.push('\n');
            render_children(element, out);
        }
        _ => render_children(element, out),
    }
}

/// Pull the language hint out of a `<code class="language-x">` element.
fn code_language(code: ElementRef<'_>) -> Option<String> {
    code.value().attr("class").and_then(|classes| {
        classes.split_whitespace().find_map(|class| {
            class
                .strip_prefix("language-")
                .or_else(|| class.strip_prefix("lang-"))
                .map(str::to_string)
        })
    })
}

fn collapse_whitespace(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.starts_with(char::is_whitespace) && !collapsed.is_empty() {
        format!(" {}", collapsed)
    } else {
        collapsed
    }
}

/// Extract and partition links from a page into internal and external sets.
pub fn extract_page_links(html: &str, base_url: &str) -> (Vec<String>, Vec<String>) {
    let Ok(base) = Url::parse(base_url) else {
        return (Vec::new(), Vec::new());
    };
    let base_host = base.host_str().map(str::to_lowercase);

    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").unwrap();

    let mut seen = HashSet::new();
    let mut internal = Vec::new();
    let mut external = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("javascript:")
        {
            continue;
        }
        let Ok(mut resolved) = base.join(href) else {
            continue;
        };
        resolved.set_fragment(None);
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        let link = resolved.to_string();
        if !seen.insert(link.clone()) {
            continue;
        }
        let same_host = resolved.host_str().map(str::to_lowercase) == base_host;
        if same_host {
            internal.push(link);
        } else {
            external.push(link);
        }
    }

    (internal, external)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<!DOCTYPE html>
<html><head><title>Sample &amp; Page</title></head>
<body>
  <nav><a href="/skip">skip me</a></nav>
  <h1>Heading</h1>
  <p>Some <strong>bold</strong> text with a <a href="/guide">guide link</a>.</p>
  <pre><code class="language-python">def main():
    print("hi")</code></pre>
  <ul><li>first</li><li>second</li></ul>
  <a href="https://other.com/x">elsewhere</a>
  <script>ignore();</script>
</body></html>"#;

    #[test]
    fn test_extract_title_decodes_entities() {
        assert_eq!(extract_title(SAMPLE).as_deref(), Some("Sample & Page"));
    }

    #[test]
    fn test_html_to_markdown_structure() {
        let (markdown, title) = html_to_markdown(SAMPLE);
        assert_eq!(title.as_deref(), Some("Sample & Page"));
        assert!(markdown.contains("# Heading"));
        assert!(markdown.contains("**bold**"));
        assert!(markdown.contains("[guide link](/guide)"));
        assert!(markdown.contains("```python"));
        assert!(markdown.contains("def main():"));
        assert!(markdown.contains("- first"));
        // nav and script content are dropped
        assert!(!markdown.contains("skip me"));
        assert!(!markdown.contains("ignore()"));
    }

    #[test]
    fn test_extract_page_links_partitions_by_host() {
        let (internal, external) = extract_page_links(SAMPLE, "https://example.com/docs/");
        assert!(internal.contains(&"https://example.com/guide".to_string()));
        assert!(internal.contains(&"https://example.com/skip".to_string()));
        assert!(external.contains(&"https://other.com/x".to_string()));
    }

    #[test]
    fn test_extract_page_links_skips_anchors_and_mailto() {
        let html = r##"<body><a href="#top">top</a><a href="mailto:a@b.c">mail</a><a href="/ok">ok</a></body>"##;
        let (internal, external) = extract_page_links(html, "https://example.com/");
        assert_eq!(internal, vec!["https://example.com/ok"]);
        assert!(external.is_empty());
    }

    #[test]
    fn test_links_are_defragmented_and_deduped() {
        let html = r##"<body><a href="/p#a">one</a><a href="/p#b">two</a></body>"##;
        let (internal, _) = extract_page_links(html, "https://example.com/");
        assert_eq!(internal, vec!["https://example.com/p"]);
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(looks_like_html("  <html lang=\"en\">"));
        assert!(!looks_like_html("# Markdown Title\n\nBody"));
    }
}
