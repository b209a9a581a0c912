// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! URL classification and helpers for the crawl pipeline.
//!
//! Everything here is a pure function over the URL (and optionally content):
//! sitemap/text/markdown/binary detection, GitHub raw-URL rewriting,
//! link-collection detection, markdown link extraction, the canonical
//! source-id hash, and display-name derivation.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Query parameters stripped during canonicalization.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "ref",
    "source",
];

/// File extensions that should never be crawled as pages.
const BINARY_EXTENSIONS: &[&str] = &[
    // Archives
    ".zip", ".tar", ".gz", ".rar", ".7z", ".bz2", ".xz", ".tgz",
    // Executables and installers
    ".exe", ".dmg", ".pkg", ".deb", ".rpm", ".msi", ".app", ".appimage",
    // Documents (non-HTML)
    ".pdf", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".odt", ".ods",
    // Images
    ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".bmp", ".tiff",
    // Audio/Video
    ".mp3", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".mkv", ".wav", ".flac",
    // Data files
    ".csv", ".sql", ".db", ".sqlite",
    // Binary data
    ".iso", ".img", ".bin", ".dat",
    // Development artifacts
    ".wasm", ".pyc", ".jar", ".war", ".class", ".dll", ".so", ".dylib",
];

/// Check if a URL is a sitemap.
pub fn is_sitemap(url: &str) -> bool {
    if url.ends_with("sitemap.xml") {
        return true;
    }
    Url::parse(url)
        .map(|u| u.path().contains("sitemap"))
        .unwrap_or(false)
}

/// Check if a URL points to a plain text file.
pub fn is_txt(url: &str) -> bool {
    url_path_lower(url).ends_with(".txt")
}

/// Check if a URL points to a markdown file (.md, .mdx, .markdown).
pub fn is_markdown(url: &str) -> bool {
    let path = url_path_lower(url);
    path.ends_with(".md") || path.ends_with(".mdx") || path.ends_with(".markdown")
}

/// Check if a URL points to a binary file that shouldn't be crawled.
///
/// On a parse error the URL is not skipped - attempting the crawl is safer
/// than missing content.
pub fn is_binary_file(url: &str) -> bool {
    let path = url_path_lower(url);
    BINARY_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn url_path_lower(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => u.path().to_lowercase(),
        // Not parseable as absolute URL: fall back to the raw string with
        // query/fragment chopped off.
        Err(_) => {
            let end = url.find(['?', '#']).unwrap_or(url.len());
            url[..end].to_lowercase()
        }
    }
}

static GITHUB_BLOB_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https://github\.com/([^/]+)/([^/]+)/blob/([^/]+)/(.+)$").unwrap()
});

/// Transform GitHub file URLs to raw content URLs for better extraction.
pub fn transform_github_url(url: &str) -> String {
    if let Some(caps) = GITHUB_BLOB_RE.captures(url) {
        let raw = format!(
            "https://raw.githubusercontent.com/{}/{}/{}/{}",
            &caps[1], &caps[2], &caps[3], &caps[4]
        );
        tracing::info!("Transformed GitHub file URL to raw: {} -> {}", url, raw);
        return raw;
    }
    url.to_string()
}

/// Generate a unique source ID from a URL.
///
/// The URL is canonicalized first so `https://X.com/p`, `https://x.com/p/`,
/// `https://x.com/p?utm_source=a` and `http://x.com:80/p` all map to the same
/// id: the first 16 hex characters of the SHA-256 of the canonical form.
pub fn generate_unique_source_id(url: &str) -> String {
    let canonical = canonicalize_url(url).unwrap_or_else(|| {
        tracing::error!(
            "Error canonicalizing URL for source id: {}",
            url.split('?').next().unwrap_or(url)
        );
        format!("error_{}", url)
    });
    let hash = Sha256::digest(canonical.as_bytes());
    let hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..16].to_string()
}

/// Canonical URL form used for source-id hashing.
///
/// Lowercase scheme and host, default ports stripped, trailing slash removed
/// (except root), tracking params removed, remaining query pairs sorted,
/// fragment dropped.
pub fn canonicalize_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let scheme = parsed.scheme().to_lowercase();
    let host = parsed.host_str()?.to_lowercase();

    // Url::port() already returns None for scheme-default ports.
    let host_port = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    };

    let mut path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        path = path.trim_end_matches('/').to_string();
    }
    if path.is_empty() {
        path = "/".to_string();
    }

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let query = if pairs.is_empty() {
        String::new()
    } else {
        let encoded: String = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        format!("?{}", encoded)
    };

    Some(format!("{}://{}{}{}", scheme, host_port, path, query))
}

/// Check if two URLs refer to the same page.
///
/// Compares `scheme://host[:non-default-port]/path` case-folded with the
/// trailing slash stripped; query and fragment are ignored.
pub fn is_self_link(link: &str, base_url: &str) -> bool {
    fn core(u: &str) -> Option<String> {
        let parsed = Url::parse(u).ok()?;
        let scheme = parsed.scheme().to_lowercase();
        let host = parsed.host_str()?.to_lowercase();
        let port_part = match parsed.port() {
            Some(port) => format!(":{}", port),
            None => String::new(),
        };
        let path = parsed.path().trim_end_matches('/').to_string();
        Some(format!("{}://{}{}{}", scheme, host, port_part, path))
    }

    match (core(link), core(base_url)) {
        (Some(a), Some(b)) => a == b,
        // Fallback to simple string comparison
        _ => link.trim_end_matches('/') == base_url.trim_end_matches('/'),
    }
}

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"\[(?P<text>[^\]]*)\]\((?P<md>[^)]+)\)"#,      // markdown links
        r#"|<\s*(?P<auto>https?://[^>\s]+)\s*>"#,        // autolinks
        r#"|(?P<bare>https?://[^\s<>()\[\]"]+)"#,        // bare URLs
        r#"|(?P<proto>//[^\s<>()\[\]"]+)"#,              // protocol-relative
        r#"|(?P<www>www\.[^\s<>()\[\]"]+)"#,             // www.* without scheme
    ))
    .unwrap()
});

/// Extract links from markdown-ish text content.
///
/// Recognizes markdown `[text](url)`, autolinks, bare URLs,
/// protocol-relative `//host` and scheme-less `www.` forms. Relative URLs
/// are resolved against `base_url`. The result is de-duplicated preserving
/// order and contains only http(s) URLs.
pub fn extract_markdown_links(content: &str, base_url: Option<&str>) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }

    let base = base_url.and_then(|b| Url::parse(b).ok());
    let mut seen = std::collections::HashSet::new();
    let mut urls = Vec::new();

    for caps in LINK_RE.captures_iter(content) {
        let raw = caps
            .name("md")
            .or_else(|| caps.name("auto"))
            .or_else(|| caps.name("bare"))
            .or_else(|| caps.name("proto"))
            .or_else(|| caps.name("www"))
            .map(|m| m.as_str());
        let Some(raw) = raw else { continue };

        let mut link = clean_url(raw);
        if link.is_empty() || link.starts_with('#') || link.starts_with("mailto:") {
            continue;
        }

        // Normalize all URL formats to https://
        if link.starts_with("//") {
            link = format!("https:{}", link);
        } else if link.starts_with("www.") {
            link = format!("https://{}", link);
        }

        if !link.starts_with("http://") && !link.starts_with("https://") {
            match base.as_ref().and_then(|b| b.join(&link).ok()) {
                Some(resolved) => link = resolved.to_string(),
                None => continue,
            }
        }

        if link.starts_with("http://") || link.starts_with("https://") {
            if seen.insert(link.clone()) {
                urls.push(link);
            }
        }
    }

    tracing::debug!("Extracted {} unique links from content", urls.len());
    urls
}

/// Trim whitespace, trailing punctuation, and invisible characters that can
/// break URLs copied out of rendered documents.
fn clean_url(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', ',', ';', ':', ')', ']', '>'])
        .chars()
        .filter(|c| !c.is_control() && !is_format_char(*c))
        .collect()
}

/// Unicode format characters (category Cf) that show up inside copied URLs.
fn is_format_char(c: char) -> bool {
    matches!(
        c,
        '\u{00AD}' | '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}' | '\u{FEFF}'
    )
}

/// Filenames that typically contain lists of links rather than content.
const LINK_COLLECTION_BASES: &[&str] = &["llms", "links", "resources", "references"];
const LINK_COLLECTION_EXTENSIONS: &[&str] = &[".txt", ".md", ".mdx", ".markdown"];

/// Check if a URL/file appears to be a link collection file like `llms.txt`.
///
/// Filename match first; if `content` is supplied, link density is analyzed
/// (>2 links per 100 chars and more than 3 links). Files with `full` in the
/// name contain complete content, never just links.
pub fn is_link_collection_file(url: &str, content: Option<&str>) -> bool {
    let filename = Url::parse(url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|s| s.last().map(String::from)))
        .unwrap_or_default()
        .to_lowercase();

    let has_collection_ext = LINK_COLLECTION_EXTENSIONS
        .iter()
        .any(|ext| filename.ends_with(ext));

    if has_collection_ext && !filename.contains("full") {
        let matches_base = LINK_COLLECTION_BASES.iter().any(|base| {
            filename.starts_with(&format!("{}.", base)) || filename.starts_with(&format!("{}-", base))
        });
        if matches_base {
            tracing::info!("Detected link collection file by filename: {}", filename);
            return true;
        }
    }

    if let Some(content) = content {
        if filename.contains("full") {
            tracing::info!(
                "Skipping content-based link-collection detection for full-content file: {}",
                filename
            );
            return false;
        }
        let links = extract_markdown_links(content, Some(url));
        let total_links = links.len();
        let content_length = content.trim().len();
        if content_length > 0 {
            let link_density = (total_links * 100) as f64 / content_length as f64;
            if link_density > 2.0 && total_links > 3 {
                tracing::info!(
                    "Detected link collection by content analysis: {} links, density {:.2}%",
                    total_links,
                    link_density
                );
                return true;
            }
        }
    }

    false
}

/// Documentation site patterns that get a friendlier display name.
const DOC_PATTERNS: &[(&str, &str)] = &[
    ("fastapi.tiangolo.com", "FastAPI Documentation"),
    ("pydantic.dev", "Pydantic Documentation"),
    ("python.org", "Python Documentation"),
    ("djangoproject.com", "Django Documentation"),
    ("flask.palletsprojects.com", "Flask Documentation"),
    ("numpy.org", "NumPy Documentation"),
    ("pandas.pydata.org", "Pandas Documentation"),
];

const STRIPPED_TLDS: &[&str] = &[".com", ".org", ".io", ".dev", ".net", ".ai", ".app"];

/// Check if a URL belongs to a known documentation site (used to pick the
/// enhanced crawl profile).
pub fn is_documentation_site(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    let host = host.to_lowercase();
    host.starts_with("docs.")
        || host.ends_with(".readthedocs.io")
        || DOC_PATTERNS.iter().any(|(pattern, _)| host.contains(pattern))
}

/// Extract a human-readable display name from a URL.
pub fn extract_display_name(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return truncate_for_display(url);
    };

    let mut domain = parsed.host_str().unwrap_or_default().to_lowercase();
    if let Some(stripped) = domain.strip_prefix("www.") {
        domain = stripped.to_string();
    }

    if domain.is_empty() {
        return truncate_for_display(url);
    }

    let path = parsed.path().trim_matches('/').to_string();

    // GitHub repositories and API
    if domain.contains("github.com") {
        if domain.starts_with("api.") {
            return "GitHub API".to_string();
        }
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        return match parts.as_slice() {
            [owner, repo, ..] => {
                format!("GitHub - {}/{}", owner, repo.trim_end_matches(".git"))
            }
            [owner] => format!("GitHub - {}", owner),
            [] => "GitHub".to_string(),
        };
    }

    // docs.X.* sites
    if let Some(rest) = domain.strip_prefix("docs.") {
        let service = rest.split('.').next().unwrap_or_default();
        let base_name = if service.is_empty() {
            "Documentation".to_string()
        } else {
            title_case_word(service)
        };

        if !path.is_empty() {
            let lower = path.to_lowercase();
            if lower.contains("llms") && lower.ends_with(".txt") {
                return format!("{} Docs - Llms.Txt", base_name);
            }
            if lower.contains("sitemap") && lower.ends_with(".xml") {
                return format!("{} Docs - Sitemap.Xml", base_name);
            }
            if lower.ends_with(".txt") {
                let filename = path.rsplit('/').next().unwrap_or(&path);
                return format!("{} Docs - {}", base_name, title_case_phrase(filename));
            }
        }
        return if service.is_empty() {
            "Documentation".to_string()
        } else {
            format!("{} Documentation", base_name)
        };
    }

    // readthedocs.io subdomains
    if let Some(project) = domain.strip_suffix(".readthedocs.io") {
        return format!("{} Docs", title_case_phrase(project));
    }

    // Known documentation sites
    for (pattern, name) in DOC_PATTERNS {
        if domain.contains(pattern) {
            if path.len() > 1 {
                let segment = path.split('/').next().unwrap_or_default();
                if !segment.is_empty()
                    && !matches!(segment, "docs" | "doc" | "documentation" | "api" | "en")
                {
                    return format!("{} - {}", name, title_case_phrase(segment));
                }
            }
            return name.to_string();
        }
    }

    // API endpoints
    if domain.contains("api.") || path.contains("/api") {
        let service = domain
            .trim_start_matches("api.")
            .split('.')
            .next()
            .unwrap_or_default();
        return format!("{} API", title_case_word(service));
    }

    // sitemap.xml and llms.txt on any site
    if !path.is_empty() {
        let lower = path.to_lowercase();
        if lower.contains("sitemap") && lower.ends_with(".xml") {
            return format!("{} - Sitemap.Xml", formatted_domain(&domain));
        }
        if lower.contains("llms") && lower.ends_with(".txt") {
            return format!("{} - Llms.Txt", formatted_domain(&domain));
        }
    }

    // Default: TLD-stripped, title-cased domain plus first path segment
    let mut formatted = formatted_domain(&domain);
    if path.len() > 1 && !path.contains('/') {
        formatted.push_str(&format!(" - {}", title_case_phrase(&path)));
    }
    formatted
}

fn formatted_domain(domain: &str) -> String {
    let mut display = domain.to_string();
    for tld in STRIPPED_TLDS {
        if let Some(stripped) = display.strip_suffix(tld) {
            display = stripped.to_string();
            break;
        }
    }
    display
        .replace(['-', '_'], " ")
        .split('.')
        .map(title_case_phrase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title-case every whitespace-separated word.
fn title_case_phrase(s: impl AsRef<str>) -> String {
    s.as_ref()
        .split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn truncate_for_display(url: &str) -> String {
    match url.char_indices().nth(50) {
        Some((idx, _)) => format!("{}...", &url[..idx]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifiers() {
        assert!(is_sitemap("https://example.com/sitemap.xml"));
        assert!(is_sitemap("https://example.com/sitemap_index.xml"));
        assert!(!is_sitemap("https://example.com/page"));

        assert!(is_txt("https://example.com/llms.txt"));
        assert!(is_txt("https://example.com/FILE.TXT?x=1"));
        assert!(!is_txt("https://example.com/page"));

        assert!(is_markdown("https://example.com/readme.md"));
        assert!(is_markdown("https://example.com/doc.MDX"));
        assert!(is_markdown("https://example.com/doc.markdown#section"));
        assert!(!is_markdown("https://example.com/doc.html"));
    }

    #[test]
    fn test_binary_detection_is_case_insensitive() {
        assert!(is_binary_file("https://example.com/release.ZIP"));
        assert!(is_binary_file("https://example.com/paper.pdf?dl=1"));
        assert!(is_binary_file("https://example.com/lib.so"));
        assert!(!is_binary_file("https://example.com/page.html"));
        assert!(!is_binary_file("https://example.com/guide"));
    }

    #[test]
    fn test_github_transform() {
        assert_eq!(
            transform_github_url("https://github.com/owner/repo/blob/main/src/lib.rs"),
            "https://raw.githubusercontent.com/owner/repo/main/src/lib.rs"
        );
        // Directory URLs pass through unchanged
        assert_eq!(
            transform_github_url("https://github.com/owner/repo/tree/main/src"),
            "https://github.com/owner/repo/tree/main/src"
        );
        assert_eq!(
            transform_github_url("https://example.com/page"),
            "https://example.com/page"
        );
    }

    #[test]
    fn test_canonicalization_equivalences() {
        let variants = [
            "https://X.com/p",
            "https://x.com/p/",
            "https://x.com/p?utm_source=a",
            "https://x.com/p#frag",
        ];
        let ids: Vec<String> = variants.iter().map(|u| generate_unique_source_id(u)).collect();
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(ids[0].len(), 16);
        assert!(ids[0].chars().all(|c| c.is_ascii_hexdigit()));

        // Default port stripped for http
        assert_eq!(
            generate_unique_source_id("http://x.com:80/p"),
            generate_unique_source_id("http://x.com/p")
        );
        // Scheme is part of the canonical form
        assert_ne!(
            generate_unique_source_id("http://x.com/p"),
            generate_unique_source_id("https://x.com/p")
        );
    }

    #[test]
    fn test_canonicalization_sorts_and_filters_query() {
        assert_eq!(
            generate_unique_source_id("https://www.Example.COM:443/Path/?utm_source=x&b=2#frag"),
            generate_unique_source_id("https://www.example.com/Path?b=2")
        );
        assert_eq!(
            canonicalize_url("https://x.com/p?b=2&a=1").as_deref(),
            Some("https://x.com/p?a=1&b=2")
        );
    }

    #[test]
    fn test_canonical_keeps_non_default_port() {
        assert_eq!(
            canonicalize_url("https://x.com:8443/p").as_deref(),
            Some("https://x.com:8443/p")
        );
    }

    #[test]
    fn test_self_link_detection() {
        assert!(is_self_link(
            "https://docs.example.com/llms.txt/",
            "https://docs.example.com/llms.txt"
        ));
        assert!(is_self_link(
            "HTTPS://DOCS.EXAMPLE.COM/llms.txt?x=1",
            "https://docs.example.com/llms.txt"
        ));
        assert!(!is_self_link(
            "https://docs.example.com/other",
            "https://docs.example.com/llms.txt"
        ));
    }

    #[test]
    fn test_extract_links_all_forms() {
        let content = "See [docs](https://a.com/docs), <https://b.com/x>, https://c.com/y. \
                       Also //d.com/z and www.e.com/w end.";
        let links = extract_markdown_links(content, None);
        assert_eq!(
            links,
            vec![
                "https://a.com/docs",
                "https://b.com/x",
                "https://c.com/y",
                "https://d.com/z",
                "https://e.com/w",
            ]
        );
    }

    #[test]
    fn test_extract_links_resolves_relative_and_dedupes() {
        let content = "[one](/guide) and [two](https://base.com/guide) and [again](/guide)";
        let links = extract_markdown_links(content, Some("https://base.com/llms.txt"));
        assert_eq!(links, vec!["https://base.com/guide"]);
    }

    #[test]
    fn test_extract_links_skips_anchors_and_mailto() {
        let content = "[anchor](#section) [mail](mailto:x@y.com) [ok](https://a.com)";
        let links = extract_markdown_links(content, None);
        assert_eq!(links, vec!["https://a.com"]);
    }

    #[test]
    fn test_extract_links_strips_trailing_punctuation_and_invisibles() {
        let content = "Go to https://a.com/page., then <https://b.com/x\u{200B}>";
        let links = extract_markdown_links(content, None);
        assert_eq!(links, vec!["https://a.com/page", "https://b.com/x"]);
    }

    #[test]
    fn test_link_collection_by_filename() {
        assert!(is_link_collection_file("https://docs.example.com/llms.txt", None));
        assert!(is_link_collection_file("https://x.com/links.mdx", None));
        assert!(is_link_collection_file("https://x.com/resources-2024.md", None));
        // "full" variants carry complete content, not links
        assert!(!is_link_collection_file("https://x.com/llms-full.txt", None));
        assert!(!is_link_collection_file("https://x.com/readme.md", None));
    }

    #[test]
    fn test_link_collection_by_content_density() {
        let dense = "[a](https://a.com)\n[b](https://b.com)\n[c](https://c.com)\n[d](https://d.com)\n";
        assert!(is_link_collection_file("https://x.com/index.txt", Some(dense)));

        let sparse = format!("{}{}", "prose ".repeat(200), "[a](https://a.com)");
        assert!(!is_link_collection_file("https://x.com/index.txt", Some(&sparse)));
    }

    #[test]
    fn test_display_name_github() {
        assert_eq!(
            extract_display_name("https://github.com/rust-lang/rust"),
            "GitHub - rust-lang/rust"
        );
        assert_eq!(
            extract_display_name("https://github.com/torvalds/linux.git"),
            "GitHub - torvalds/linux"
        );
        assert_eq!(extract_display_name("https://api.github.com/repos"), "GitHub API");
    }

    #[test]
    fn test_display_name_docs_sites() {
        assert_eq!(
            extract_display_name("https://docs.example.com/llms.txt"),
            "Example Docs - Llms.Txt"
        );
        assert_eq!(
            extract_display_name("https://docs.stripe.com/payments"),
            "Stripe Documentation"
        );
        assert_eq!(
            extract_display_name("https://requests.readthedocs.io/en/latest/"),
            "Requests Docs"
        );
        assert_eq!(
            extract_display_name("https://fastapi.tiangolo.com/"),
            "FastAPI Documentation"
        );
        assert_eq!(
            extract_display_name("https://fastapi.tiangolo.com/tutorial/first-steps"),
            "FastAPI Documentation - Tutorial"
        );
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(
            extract_display_name("https://www.my-site.com/"),
            "My Site"
        );
        assert_eq!(
            extract_display_name("https://example.com/sitemap.xml"),
            "Example - Sitemap.Xml"
        );
        assert_eq!(
            extract_display_name("https://example.io/guide"),
            "Example - Guide"
        );
    }

    #[test]
    fn test_documentation_site_detection() {
        assert!(is_documentation_site("https://docs.rs/tokio"));
        assert!(is_documentation_site("https://requests.readthedocs.io/en/latest/"));
        assert!(is_documentation_site("https://numpy.org/doc/"));
        assert!(!is_documentation_site("https://example.com/blog"));
    }
}
