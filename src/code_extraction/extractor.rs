// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fenced code block extraction and deduplication.
//!
//! Scans markdown for triple-backtick pairs, filters out prose and ASCII-art
//! diagrams masquerading as code, captures surrounding context, and
//! consolidates near-duplicate variants (85% similarity on normalized code)
//! down to the best representative.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SettingsCache;

/// An extracted code block with its surrounding context.
#[derive(Debug, Clone)]
pub struct CodeBlock {
    pub code: String,
    pub language: String,
    pub context_before: String,
    pub context_after: String,
    pub full_context: String,
    /// Number of near-duplicate variants consolidated into this block.
    pub consolidated_variants: Option<usize>,
    /// Languages observed across consolidated variants.
    pub variant_languages: Option<Vec<String>>,
}

/// Extraction tunables, loaded from settings with named defaults.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub enable_prose_filtering: bool,
    pub max_prose_ratio: f64,
    pub min_code_indicators: usize,
    pub enable_diagram_filtering: bool,
    pub context_window_size: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_length: 250,
            max_length: 5000,
            enable_prose_filtering: true,
            max_prose_ratio: 0.15,
            min_code_indicators: 3,
            enable_diagram_filtering: true,
            context_window_size: 1000,
        }
    }
}

impl ExtractionConfig {
    pub fn load(settings: &SettingsCache) -> Self {
        let defaults = Self::default();
        Self {
            min_length: settings.get_i64("MIN_CODE_BLOCK_LENGTH", defaults.min_length as i64).max(0)
                as usize,
            max_length: settings.get_i64("MAX_CODE_BLOCK_LENGTH", defaults.max_length as i64).max(0)
                as usize,
            enable_prose_filtering: settings.get_bool("ENABLE_PROSE_FILTERING", true),
            max_prose_ratio: settings.get_f64("MAX_PROSE_RATIO", defaults.max_prose_ratio),
            min_code_indicators: settings
                .get_i64("MIN_CODE_INDICATORS", defaults.min_code_indicators as i64)
                .max(0) as usize,
            enable_diagram_filtering: settings.get_bool("ENABLE_DIAGRAM_FILTERING", true),
            context_window_size: settings
                .get_i64("CONTEXT_WINDOW_SIZE", defaults.context_window_size as i64)
                .max(0) as usize,
        }
    }
}

/// Similarity at or above which two blocks are considered variants.
const SIMILARITY_THRESHOLD: f64 = 0.85;

static CORRUPTED_FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[A-Z]`$").unwrap());

/// Extract code blocks from markdown content along with context.
pub fn extract_code_blocks(markdown_content: &str, config: &ExtractionConfig) -> Vec<CodeBlock> {
    let content = markdown_content.trim();

    // Corrupted markdown: the whole document wrapped in a fake one-letter
    // fence like ```K` - recurse into the inner content.
    if content.starts_with("```") {
        let first_line = content.lines().next().unwrap_or("");
        if CORRUPTED_FENCE_RE.is_match(first_line) {
            tracing::warn!("Detected corrupted markdown with fake language: {}", first_line);
            let inner = content
                .get(5..)
                .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
                .unwrap_or("");
            return extract_code_blocks(inner, config);
        }
    }

    let mut blocks = Vec::new();
    let positions: Vec<usize> = markdown_content
        .match_indices("```")
        .map(|(i, _)| i)
        .collect();

    let mut i = 0;
    while i + 1 < positions.len() {
        let start_pos = positions[i];
        let end_pos = positions[i + 1];
        let code_section = &markdown_content[start_pos + 3..end_pos];

        let (language, code_content) = split_language_tag(code_section);

        // Length gates
        if code_content.len() < config.min_length || code_content.len() > config.max_length {
            i += 2;
            continue;
        }

        // Content checks only apply when no meaningful language tag is set.
        if language.is_empty() || matches!(language.as_str(), "text" | "plaintext" | "txt") {
            let pattern_count = code_pattern_count(code_content);
            let non_empty_lines: Vec<&str> = code_content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .collect();

            if config.enable_prose_filtering && is_prose(code_content, config.max_prose_ratio) {
                i += 2;
                continue;
            }

            if pattern_count < config.min_code_indicators && non_empty_lines.len() > 5 {
                tracing::debug!(
                    "Skipping prose text | code_patterns={} | min_indicators={} | lines={}",
                    pattern_count,
                    config.min_code_indicators,
                    non_empty_lines.len()
                );
                i += 2;
                continue;
            }

            if config.enable_diagram_filtering
                && is_ascii_diagram(code_content, &non_empty_lines, pattern_count)
            {
                i += 2;
                continue;
            }
        }

        let context_start = floor_char_boundary(markdown_content, start_pos.saturating_sub(config.context_window_size));
        let context_before = markdown_content[context_start..start_pos].trim().to_string();
        let after_start = (end_pos + 3).min(markdown_content.len());
        let context_end = ceil_char_boundary(
            markdown_content,
            (after_start + config.context_window_size).min(markdown_content.len()),
        );
        let context_after = markdown_content[after_start..context_end].trim().to_string();

        let code = code_content.trim().to_string();
        let full_context = format!("{}\n\n{}\n\n{}", context_before, code, context_after);
        blocks.push(CodeBlock {
            code,
            language,
            context_before,
            context_after,
            full_context,
            consolidated_variants: None,
            variant_languages: None,
        });

        i += 2;
    }

    if blocks.is_empty() {
        return blocks;
    }

    tracing::debug!("Starting deduplication process for {} code blocks", blocks.len());
    deduplicate_blocks(blocks)
}

/// Split the optional language tag off a fenced section.
///
/// The first line is a language tag iff it has no spaces and fewer than 20
/// characters; otherwise the whole section is code.
fn split_language_tag(section: &str) -> (String, &str) {
    match section.split_once('\n') {
        Some((first_line, rest)) => {
            let tag = first_line.trim();
            if !tag.is_empty() && !tag.contains(' ') && tag.len() < 20 {
                (tag.to_lowercase(), rest)
            } else {
                (String::new(), section)
            }
        }
        None => (String::new(), section),
    }
}

/// Word tuples scored once per present word; phrase indicators score double.
const PROSE_WORD_GROUPS: &[&[&str]] = &[
    &["this ", "that ", "these ", "those ", "the "],
    &["is ", "are ", "was ", "were ", "will ", "would "],
    &["to ", "from ", "with ", "for ", "and ", "or "],
];

const PROSE_PHRASES: &[&str] = &[
    "for example:",
    "note:",
    "warning:",
    "important:",
    "description:",
    "usage:",
    "parameters:",
    "returns:",
    ". ",
    "? ",
    "! ",
];

fn is_prose(code: &str, max_ratio: f64) -> bool {
    let lower = code.to_lowercase();
    let mut score = 0usize;
    for group in PROSE_WORD_GROUPS {
        score += group.iter().filter(|word| lower.contains(*word)).count();
    }
    score += PROSE_PHRASES
        .iter()
        .filter(|phrase| lower.contains(*phrase))
        .count()
        * 2;

    let word_count = code.split_whitespace().count();
    if word_count == 0 {
        return false;
    }
    let ratio = score as f64 / word_count as f64;
    if ratio > max_ratio {
        tracing::debug!(
            "Skipping documentation text disguised as code | doc_ratio={:.2} | threshold={}",
            ratio,
            max_ratio
        );
        true
    } else {
        false
    }
}

const CODE_PATTERNS: &[&str] = &[
    "=", "(", ")", "{", "}", "[", "]", ";", "function", "def", "class", "import", "export",
    "const", "let", "var", "return", "if", "for", "->", "=>", "==", "!=", "<=", ">=",
];

fn code_pattern_count(code: &str) -> usize {
    CODE_PATTERNS.iter().filter(|p| code.contains(*p)).count()
}

const DIAGRAM_INDICATORS: &[&str] = &[
    "┌", "┐", "└", "┘", "│", "─", "├", "┤", "┬", "┴", "┼", "+-+", "|_|", "___", "...", "→", "←",
    "↑", "↓", "⟶", "⟵",
];

fn is_ascii_diagram(code: &str, non_empty_lines: &[&str], pattern_count: usize) -> bool {
    let special_char_lines = non_empty_lines
        .iter()
        .take(10)
        .filter(|line| {
            let total = line.chars().count();
            if total == 0 {
                return false;
            }
            let special = line
                .chars()
                .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
                .count();
            special as f64 / total as f64 > 0.7
        })
        .count();

    let indicator_count = DIAGRAM_INDICATORS
        .iter()
        .filter(|marker| code.contains(*marker))
        .count();

    let looks_like_diagram = (special_char_lines >= 3 || indicator_count >= 5) && pattern_count < 5;
    if looks_like_diagram {
        tracing::debug!(
            "Skipping ASCII art diagram | special_lines={} | diagram_indicators={}",
            special_char_lines,
            indicator_count
        );
    }
    looks_like_diagram
}

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TYPING_EXT_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"from typing_extensions import").unwrap());
static TYPING_ANNOTATED_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"from typing import Annotated[^,\n]*,?").unwrap());
static ANNOTATED_WRAPPER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Annotated\[\s*([^,\]]+)[^\]]*\]").unwrap());
static ANNOTATED_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*Annotated\[[^\]]+\]\s*=").unwrap());
static TRAILING_COMMA_PAREN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\)").unwrap());
static TRAILING_COMMA_BRACKET_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());

/// Normalize code for similarity comparison by removing version-specific
/// variations (typing_extensions vs typing imports, `Annotated[...]`
/// wrappers, trailing commas, whitespace runs).
pub fn normalize_code_for_comparison(code: &str) -> String {
    let normalized = WHITESPACE_RE.replace_all(code.trim(), " ");
    let normalized = TYPING_EXT_IMPORT_RE.replace_all(&normalized, "from typing import");
    let normalized = TYPING_ANNOTATED_IMPORT_RE.replace_all(&normalized, "");
    let normalized = ANNOTATED_WRAPPER_RE.replace_all(&normalized, "$1");
    let normalized = ANNOTATED_PARAM_RE.replace_all(&normalized, "=");
    let normalized = TRAILING_COMMA_PAREN_RE.replace_all(&normalized, ")");
    let normalized = TRAILING_COMMA_BRACKET_RE.replace_all(&normalized, "]");
    normalized.into_owned()
}

/// Similarity ratio between two code strings after normalization.
///
/// `2 * lcs / (len_a + len_b)` over characters - the same shape of measure
/// as difflib's ratio, 1.0 for identical normalized inputs.
pub fn code_similarity(code1: &str, code2: &str) -> f64 {
    let a: Vec<char> = normalize_code_for_comparison(code1).chars().collect();
    let b: Vec<char> = normalize_code_for_comparison(code2).chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    // Length pre-check: even a perfect containment cannot reach the
    // threshold when the sizes diverge too far.
    let upper_bound = 2.0 * a.len().min(b.len()) as f64 / total as f64;
    if upper_bound < SIMILARITY_THRESHOLD {
        return upper_bound;
    }

    2.0 * lcs_length(&a, &b) as f64 / total as f64
}

fn lcs_length(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Group near-duplicate blocks and keep the best variant of each group.
fn deduplicate_blocks(blocks: Vec<CodeBlock>) -> Vec<CodeBlock> {
    let total = blocks.len();
    let mut processed = vec![false; total];
    let mut kept = Vec::new();

    for i in 0..total {
        if processed[i] {
            continue;
        }
        processed[i] = true;
        let mut group = vec![i];

        for j in (i + 1)..total {
            if processed[j] {
                continue;
            }
            let similarity = code_similarity(&blocks[i].code, &blocks[j].code);
            if similarity >= SIMILARITY_THRESHOLD {
                tracing::debug!("Found similar code blocks with {:.2} similarity", similarity);
                group.push(j);
                processed[j] = true;
            }
        }

        kept.push(select_best_variant(&blocks, &group));
    }

    let removed = total - kept.len();
    if removed > 0 {
        tracing::info!(
            "Code deduplication: removed {} duplicate variants, kept {} unique code blocks",
            removed,
            kept.len()
        );
    }
    kept
}

/// Pick the best variant of a similarity group and annotate consolidation
/// metadata. Ties keep the earliest block.
fn select_best_variant(blocks: &[CodeBlock], group: &[usize]) -> CodeBlock {
    let mut best_index = group[0];
    let mut best_score = score_block(&blocks[best_index]);
    for &candidate in &group[1..] {
        let score = score_block(&blocks[candidate]);
        if score > best_score {
            best_index = candidate;
            best_score = score;
        }
    }

    let mut best = blocks[best_index].clone();
    if group.len() > 1 {
        best.consolidated_variants = Some(group.len());
        let mut languages: Vec<String> = group
            .iter()
            .map(|&idx| blocks[idx].language.clone())
            .filter(|lang| !lang.is_empty())
            .collect();
        languages.sort();
        languages.dedup();
        if !languages.is_empty() {
            best.variant_languages = Some(languages);
        }
    }
    best
}

fn score_block(block: &CodeBlock) -> f64 {
    let mut score = 0.0;

    // Prefer blocks with explicit language specification
    if !block.language.is_empty() && !matches!(block.language.as_str(), "text" | "plaintext") {
        score += 10.0;
    }

    // Prefer longer code and richer context
    score += block.code.len() as f64 * 0.01;
    score += (block.context_before.len() + block.context_after.len()) as f64 * 0.005;

    // Slight preference for modern Python syntax
    if block.full_context.to_lowercase().contains("python 3.10") {
        score += 5.0;
    } else if block.code.to_lowercase().contains("annotated") {
        score += 3.0;
    }

    score
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn permissive() -> ExtractionConfig {
        ExtractionConfig {
            min_length: 0,
            max_length: usize::MAX,
            ..ExtractionConfig::default()
        }
    }

    fn fenced(language: &str, body: &str) -> String {
        format!("```{}\n{}\n```", language, body)
    }

    #[test]
    fn test_extracts_block_with_language_and_context() {
        let code = "def main():\n    value = compute()\n    return value";
        let content = format!("Intro paragraph.\n\n{}\n\nClosing paragraph.", fenced("python", code));
        let blocks = extract_code_blocks(&content, &permissive());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "python");
        assert_eq!(blocks[0].code, code);
        assert!(blocks[0].context_before.contains("Intro paragraph."));
        assert!(blocks[0].context_after.contains("Closing paragraph."));
    }

    #[test]
    fn test_first_line_with_spaces_is_code_not_language() {
        let content = "```\nlet x = compute_value();\nx + 1;\n```";
        let blocks = extract_code_blocks(content, &permissive());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language, "");
        assert!(blocks[0].code.contains("let x = compute_value()"));
    }

    #[test]
    fn test_length_gates() {
        let short = fenced("python", "x = 1");
        let config = ExtractionConfig::default();
        assert!(extract_code_blocks(&short, &config).is_empty());

        // With the gates opened, every fenced block survives.
        assert_eq!(extract_code_blocks(&short, &permissive()).len(), 1);

        let oversized = fenced("python", &"x = 1;\n".repeat(2000));
        assert!(extract_code_blocks(&oversized, &config).is_empty());
    }

    #[test]
    fn test_prose_filter_drops_documentation_text() {
        let prose = "This is the introduction to the library. It will show you \
                     how to install and configure the package. Note: this is \
                     important for the following sections. These are the steps \
                     that were described. For example: read the guide.\n\
                     This paragraph keeps going with more words and sentences. \
                     It is only documentation and not code at all.";
        let content = fenced("", prose);
        assert!(extract_code_blocks(&content, &permissive()).is_empty());
    }

    #[test]
    fn test_diagram_filter_drops_box_art() {
        let diagram = "┌────────┐\n│ parser │\n└────────┘\n    │\n    ↓\n┌────────┐\n│ output │\n└────────┘\nsomething\nmore here";
        let content = fenced("", diagram);
        assert!(extract_code_blocks(&content, &permissive()).is_empty());
    }

    #[test]
    fn test_language_tagged_blocks_skip_content_filters() {
        // Prose-looking content with a language tag is kept.
        let prose = "This is the description of the thing. It will show the steps. \
                     Note: these are words, and this is for the reader.";
        let content = fenced("python", prose);
        assert_eq!(extract_code_blocks(&content, &permissive()).len(), 1);
    }

    #[test]
    fn test_corrupted_fence_recovery() {
        let inner = fenced("python", "def real():\n    return compute(1, 2)");
        let corrupted = format!("```K`\n{}\n```", inner);
        let blocks = extract_code_blocks(&corrupted, &permissive());
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].code.contains("def real()"));
    }

    #[test]
    fn test_dedup_consolidates_typing_variants() {
        let variant_a = "from typing_extensions import Annotated\n\ndef handler(value: Annotated[int, Depends()]) -> int:\n    return process(value,)\n";
        let variant_b = "from typing import Annotated\n\ndef handler(value: Annotated[int, Depends()]) -> int:\n    return process(value)\n";
        let content = format!(
            "{}\n\nmiddle text\n\n{}",
            fenced("python", variant_a),
            fenced("python", variant_b)
        );
        let blocks = extract_code_blocks(&content, &permissive());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].consolidated_variants, Some(2));
        assert_eq!(
            blocks[0].variant_languages.as_deref(),
            Some(&["python".to_string()][..])
        );
    }

    #[test]
    fn test_dedup_keeps_distinct_blocks() {
        let content = format!(
            "{}\n\n{}",
            fenced("python", "def alpha():\n    return fetch_records(database_session)"),
            fenced("rust", "fn beta() -> io::Result<()> {\n    spawn_server(listener)\n}")
        );
        let blocks = extract_code_blocks(&content, &permissive());
        assert_eq!(blocks.len(), 2);
        assert!(blocks.iter().all(|b| b.consolidated_variants.is_none()));
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let variant_a = "from typing_extensions import Annotated\nvalue = transform(input_data,)";
        let variant_b = "from typing import Annotated\nvalue = transform(input_data)";
        let content = format!(
            "{}\n\n{}",
            fenced("python", variant_a),
            fenced("python", variant_b)
        );
        let first_pass = extract_code_blocks(&content, &permissive());
        let second_pass = deduplicate_blocks(first_pass.clone());
        assert_eq!(first_pass.len(), second_pass.len());
        assert_eq!(first_pass[0].code, second_pass[0].code);
    }

    #[test]
    fn test_variant_scoring_prefers_language_and_length() {
        let untagged = CodeBlock {
            code: "value = transform(input_data)".to_string(),
            language: String::new(),
            context_before: String::new(),
            context_after: String::new(),
            full_context: String::new(),
            consolidated_variants: None,
            variant_languages: None,
        };
        let tagged = CodeBlock {
            language: "python".to_string(),
            ..untagged.clone()
        };
        assert!(score_block(&tagged) > score_block(&untagged));

        let with_annotated = CodeBlock {
            code: "value = Annotated[int, transform(input_data)]".to_string(),
            ..tagged.clone()
        };
        assert!(score_block(&with_annotated) > score_block(&tagged));
    }

    #[test]
    fn test_variant_tie_keeps_earliest_block() {
        let first = CodeBlock {
            code: "value = transform(input_data)".to_string(),
            language: "python".to_string(),
            context_before: "first occurrence".to_string(),
            context_after: String::new(),
            full_context: String::new(),
            consolidated_variants: None,
            variant_languages: None,
        };
        let second = CodeBlock {
            context_before: "second occurren".to_string() + "t",
            ..first.clone()
        };
        // Identical code and equal-length context score exactly the same;
        // the earliest block wins the tie.
        assert!((score_block(&first) - score_block(&second)).abs() < f64::EPSILON);
        let blocks = vec![first.clone(), second];
        let kept = select_best_variant(&blocks, &[0, 1]);
        assert_eq!(kept.context_before, "first occurrence");
        assert_eq!(kept.consolidated_variants, Some(2));
    }

    #[test]
    fn test_similarity_of_normalized_twins_is_one() {
        let a = "from typing_extensions import Annotated\nrun(value,)";
        let b = "from typing import Annotated\nrun(value)";
        assert!((code_similarity(a, b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_similarity_low_for_unrelated_code() {
        let a = "def alpha():\n    return fetch_records(database_session)";
        let b = "SELECT count(*) FROM archon_sources WHERE source_id = $1";
        assert!(code_similarity(a, b) < SIMILARITY_THRESHOLD);
    }

    #[test]
    fn test_normalization_rules() {
        let normalized = normalize_code_for_comparison(
            "from typing_extensions import Annotated\nf(x: Annotated[int, Dep()] = 1,)",
        );
        assert!(normalized.contains("from typing import"));
        assert!(!normalized.contains("typing_extensions"));
        assert!(!normalized.contains(",)"));
    }
}
