//! Paragraph-boundary text splitter.
//!
//! Turns the text of one file into [`Document`] chunks that respect a
//! `max_tokens` budget. Paragraphs (`\n\n`) are packed greedily; a
//! paragraph larger than the budget is hard-split at the last newline or
//! space before the limit.
//!
//! Every chunk is stamped with `source` (the file path) and `chunk_index`
//! so the collection can later group chunks back into files.
//!
//! ```rust
//! use vecstore_core::chunk::split_text;
//!
//! let docs = split_text("/docs/a.md", "Hello world.\n\nSecond paragraph.", 250);
//! assert_eq!(docs.len(), 1);
//! assert_eq!(docs[0].source(), Some("/docs/a.md"));
//! ```

use crate::models::Document;

/// Rough characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks of at most `max_tokens` (≈ `4 × max_tokens` chars).
///
/// Empty or whitespace-only text yields no chunks: there is nothing to embed.
pub fn split_text(source: &str, text: &str, max_tokens: usize) -> Vec<Document> {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut buf = String::new();

    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let would_be = if buf.is_empty() {
            para.len()
        } else {
            buf.len() + 2 + para.len()
        };

        if would_be > max_chars && !buf.is_empty() {
            pieces.push(std::mem::take(&mut buf));
        }

        if para.len() > max_chars {
            hard_split(para, max_chars, &mut pieces);
            continue;
        }

        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str(para);
    }

    if !buf.is_empty() {
        pieces.push(buf);
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let mut doc = Document::new(piece).with_source(source);
            doc.metadata.insert("chunk_index".to_string(), (i as u64).into());
            doc
        })
        .collect()
}

/// Cut an oversized paragraph into pieces no longer than `max_chars`.
fn hard_split(para: &str, max_chars: usize, out: &mut Vec<String>) {
    let mut remaining = para;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, max_chars);
        let cut = if limit >= remaining.len() {
            remaining.len()
        } else {
            remaining[..limit]
                .rfind(['\n', ' '])
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        };
        // Always make progress, even when max_chars is narrower than one char.
        let cut = if cut == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            cut
        };

        let piece = remaining[..cut].trim();
        if !piece.is_empty() {
            out.push(piece.to_string());
        }
        remaining = &remaining[cut..];
    }
}

fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_is_one_chunk() {
        let docs = split_text("a.txt", "Hello, world!", 250);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "Hello, world!");
        assert_eq!(docs[0].metadata["chunk_index"], 0);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(split_text("a.txt", "", 250).is_empty());
        assert!(split_text("a.txt", "  \n\n  ", 250).is_empty());
    }

    #[test]
    fn paragraphs_are_packed_until_budget() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let docs = split_text("a.txt", text, 8);
        assert!(docs.len() > 1);
        for (i, d) in docs.iter().enumerate() {
            assert_eq!(d.metadata["chunk_index"], i as u64);
            assert!(d.page_content.len() <= 32);
            assert_eq!(d.source(), Some("a.txt"));
        }
    }

    #[test]
    fn oversized_paragraph_splits_on_spaces() {
        let text = "word ".repeat(40);
        let docs = split_text("a.txt", &text, 5);
        assert!(docs.len() > 1);
        for d in &docs {
            assert!(d.page_content.len() <= 20, "{:?}", d.page_content);
            assert!(!d.page_content.starts_with(' '));
        }
    }

    #[test]
    fn huge_budget_saturates() {
        let docs = split_text("a.txt", "One.\n\nTwo.", usize::MAX);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "One.\n\nTwo.");
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "┌──────────────────┐\n│ 你好 world       │\n└──────────────────┘";
        let docs = split_text("a.txt", text, 1);
        assert!(!docs.is_empty());
        let joined: String = docs.iter().map(|d| d.page_content.as_str()).collect();
        assert!(joined.contains("你好"));
    }
}
