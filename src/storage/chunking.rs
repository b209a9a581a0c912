// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Smart text chunking.
//!
//! Splits a document into ~5000-character chunks, preferring to break at a
//! code-fence boundary, then a paragraph break, then a sentence end - each
//! only when the break point is past 30% of the window, so chunks don't
//! degenerate into slivers.

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Fraction of the window a natural break must clear to be used.
const MIN_BREAK_FRACTION: f64 = 0.3;

/// Split text into chunks of roughly `chunk_size` characters.
///
/// Empty chunks are dropped; every returned chunk is trimmed.
pub fn smart_chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let bytes = text.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let min_break = (chunk_size as f64 * MIN_BREAK_FRACTION) as usize;

    while start < bytes {
        let tentative_end = floor_char_boundary(text, (start + chunk_size).min(bytes));
        if tentative_end >= bytes {
            push_chunk(&mut chunks, &text[start..]);
            break;
        }

        let window = &text[start..tentative_end];
        let mut end = tentative_end;

        if let Some(pos) = window.rfind("```") {
            if pos > min_break {
                end = start + pos;
            }
        } else if let Some(pos) = window.rfind("\n\n") {
            if pos > min_break {
                end = start + pos;
            }
        } else if let Some(pos) = window.rfind(". ") {
            if pos > min_break {
                end = start + pos + 1;
            }
        }

        push_chunk(&mut chunks, &text[start..end]);
        start = end;
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    index = index.min(s.len());
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunks = smart_chunk_text("short document", DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks, vec!["short document"]);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(smart_chunk_text("", DEFAULT_CHUNK_SIZE).is_empty());
        assert!(smart_chunk_text("   \n\n  ", DEFAULT_CHUNK_SIZE).is_empty());
    }

    #[test]
    fn test_breaks_at_paragraph_boundary() {
        let para_a = "a".repeat(60);
        let para_b = "b".repeat(60);
        let text = format!("{}\n\n{}", para_a, para_b);
        let chunks = smart_chunk_text(&text, 100);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], para_a);
        assert_eq!(chunks[1], para_b);
    }

    #[test]
    fn test_prefers_code_fence_boundary() {
        let prose = "p".repeat(50);
        let text = format!("{}\n\n```rust\nfn main() {{}}\n```\n{}", prose, "q".repeat(80));
        let chunks = smart_chunk_text(&text, 90);
        // First chunk ends before the closing-fence region rather than
        // mid-paragraph.
        assert!(chunks.len() >= 2);
        assert!(chunks[0].starts_with(&prose));
    }

    #[test]
    fn test_breaks_at_sentence_when_no_paragraphs() {
        let sentence = "This is a sentence that fills space. ";
        let text = sentence.repeat(10);
        let chunks = smart_chunk_text(&text, 100);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with('.'), "chunk should end at a sentence: {:?}", chunk);
        }
    }

    #[test]
    fn test_no_break_point_splits_hard() {
        let text = "x".repeat(250);
        let chunks = smart_chunk_text(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 100);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn test_multibyte_content_respects_char_boundaries() {
        let text = "héllo wörld ".repeat(50);
        let chunks = smart_chunk_text(&text, 100);
        assert!(!chunks.is_empty());
        // Reassembled content loses only whitespace at the seams.
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert!(total > 0);
    }

    #[test]
    fn test_chunks_bounded_by_size() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            "a".repeat(4000),
            "b".repeat(4000),
            "c".repeat(4000)
        );
        for chunk in smart_chunk_text(&text, DEFAULT_CHUNK_SIZE) {
            assert!(chunk.len() <= DEFAULT_CHUNK_SIZE);
        }
    }
}
