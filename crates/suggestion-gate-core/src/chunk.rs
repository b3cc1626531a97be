//! Syntax-aware code chunker.
//!
//! Splits file content into [`ChunkDraft`]s that respect a configurable
//! `max_tokens` limit. Splitting prefers syntactic boundaries — blank
//! lines and column-zero definition starts — so a chunk tends to hold
//! whole functions or blocks. A block that is too large on its own falls
//! back to fixed-size windows with a configurable overlap, so context at
//! window edges is not lost.
//!
//! Each draft records the exact byte range it was cut from, plus a SHA-256
//! hash of its text for staleness detection in the embedding pipeline.
//! The store assigns ids; the chunker is pure and deterministic.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Scan lines, opening a new block at a blank-line gap or where a
//!    column-zero line follows indented code (a top-level item boundary).
//! 3. Accumulate adjacent blocks into a chunk until adding the next block
//!    would exceed `max_chars`, then flush.
//! 4. A single block over `max_chars` is split into overlapping windows,
//!    snapped to newline/space and UTF-8 char boundaries.
//! 5. Empty or whitespace-only content yields no chunks.

use sha2::{Digest, Sha256};

use crate::models::ChunkDraft;

/// Approximate characters-per-token ratio for budget math.
const CHARS_PER_TOKEN: usize = 4;

/// A contiguous run of non-blank lines, as a byte range into the source.
struct Block {
    start: usize,
    end: usize,
}

/// Split text into chunk drafts, respecting `max_tokens` per chunk.
///
/// # Guarantees
///
/// - Chunk indices are contiguous: `0, 1, 2, …, N-1`.
/// - `text[draft.byte_start..draft.byte_end] == draft.text` for every draft.
/// - Splits land on syntactic boundaries when possible; oversized blocks
///   are windowed with `overlap_tokens` of carry-over.
/// - Deterministic: identical input produces identical drafts and hashes.
pub fn chunk_code(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<ChunkDraft> {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN).max(1);
    let overlap_chars = overlap_tokens
        .saturating_mul(CHARS_PER_TOKEN)
        .min(max_chars / 2);

    let mut drafts: Vec<ChunkDraft> = Vec::new();
    // Byte range of the blocks accumulated into the current chunk.
    let mut run: Option<(usize, usize)> = None;

    for block in split_blocks(text) {
        let block_len = block.end - block.start;

        if block_len > max_chars {
            if let Some((s, e)) = run.take() {
                push_draft(text, s, e, &mut drafts);
            }
            split_windows(text, &block, max_chars, overlap_chars, &mut drafts);
            continue;
        }

        run = match run {
            Some((s, e)) if block.end - s > max_chars => {
                push_draft(text, s, e, &mut drafts);
                Some((block.start, block.end))
            }
            Some((s, _)) => Some((s, block.end)),
            None => Some((block.start, block.end)),
        };
    }

    if let Some((s, e)) = run {
        push_draft(text, s, e, &mut drafts);
    }

    drafts
}

/// Scan lines and group them into blocks.
///
/// A new block opens after a blank-line gap, or where a column-zero
/// definition start (identifier, `#`, or `@` in the first column) follows
/// indented code or a closing-delimiter line. Closing braces attach to the
/// block they terminate.
fn split_blocks(text: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut current: Option<Block> = None;
    let mut gap = false;
    let mut prev_indented = false;
    let mut prev_closer = false;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim().is_empty() {
            gap = true;
            continue;
        }

        let first = content.chars().next().unwrap_or(' ');
        let column_zero = !first.is_whitespace();
        let starts_definition =
            column_zero && (first.is_alphanumeric() || first == '_' || first == '#' || first == '@');
        let boundary = gap || (starts_definition && (prev_indented || prev_closer));

        match current.as_mut() {
            Some(block) if !boundary => block.end = start + content.len(),
            _ => {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                current = Some(Block {
                    start,
                    end: start + content.len(),
                });
            }
        }

        gap = false;
        prev_indented = !column_zero;
        prev_closer = column_zero && !starts_definition;
    }

    if let Some(block) = current {
        blocks.push(block);
    }

    blocks
}

/// Hard-split an oversized block into overlapping windows.
fn split_windows(
    text: &str,
    block: &Block,
    max_chars: usize,
    overlap_chars: usize,
    drafts: &mut Vec<ChunkDraft>,
) {
    let mut s = block.start;

    loop {
        let hard_end = (s + max_chars).min(block.end);
        let mut e = snap_to_char_boundary(text, hard_end);
        if e <= s {
            e = next_char_boundary(text, s + 1).min(block.end);
        }

        // Prefer to end a window at a newline or space so we do not cut a
        // token in half mid-identifier.
        if e < block.end {
            if let Some(pos) = text[s..e].rfind('\n').or_else(|| text[s..e].rfind(' ')) {
                if pos > 0 {
                    e = s + pos + 1;
                }
            }
        }
        let e = snap_to_char_boundary(text, e).max(next_char_boundary(text, s + 1).min(block.end));

        push_draft(text, s, e, drafts);

        if e >= block.end {
            break;
        }

        let step_back = overlap_chars.min(e.saturating_sub(s + 1));
        let mut next_start = snap_to_char_boundary(text, e - step_back);
        if next_start <= s {
            next_start = e;
        }
        s = next_start;
    }
}

fn push_draft(text: &str, start: usize, end: usize, drafts: &mut Vec<ChunkDraft>) {
    let slice = &text[start..end];
    if slice.trim().is_empty() {
        return;
    }

    let mut hasher = Sha256::new();
    hasher.update(slice.as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    drafts.push(ChunkDraft {
        chunk_index: drafts.len() as i64,
        byte_start: start as i64,
        byte_end: end as i64,
        text: slice.to_string(),
        content_hash,
    });
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
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

/// Advance a byte index forward to the nearest valid UTF-8 char boundary.
fn next_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL_FN: &str = "fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";

    #[test]
    fn test_small_file_single_chunk() {
        let drafts = chunk_code(SMALL_FN, 300, 40);
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].chunk_index, 0);
        assert!(drafts[0].text.contains("fn add"));
    }

    #[test]
    fn test_empty_and_blank_input() {
        assert!(chunk_code("", 300, 40).is_empty());
        assert!(chunk_code("\n\n   \n", 300, 40).is_empty());
    }

    #[test]
    fn test_byte_ranges_match_text() {
        let src = "fn one() {\n    1\n}\n\nfn two() {\n    2\n}\n\nfn three() {\n    3\n}\n";
        let drafts = chunk_code(src, 8, 2);
        assert!(!drafts.is_empty());
        for d in &drafts {
            assert_eq!(&src[d.byte_start as usize..d.byte_end as usize], d.text);
        }
    }

    #[test]
    fn test_indices_contiguous() {
        let src = (0..40)
            .map(|i| format!("fn f{i}() {{\n    {i}\n}}\n"))
            .collect::<Vec<_>>()
            .join("\n");
        let drafts = chunk_code(&src, 10, 2);
        for (i, d) in drafts.iter().enumerate() {
            assert_eq!(d.chunk_index, i as i64, "index mismatch at {}", i);
        }
    }

    #[test]
    fn test_splits_between_definitions() {
        let src = "fn alpha() {\n    let x = 1;\n}\nfn beta() {\n    let y = 2;\n}\n";
        // Budget fits one definition but not both.
        let drafts = chunk_code(src, 10, 0);
        assert!(drafts.len() >= 2);
        assert!(drafts[0].text.contains("alpha"));
        assert!(drafts.iter().any(|d| d.text.contains("beta")));
        // The indented body and closing brace stay with their definition.
        assert!(drafts[0].text.contains("let x = 1;"));
        assert!(drafts[0].text.contains('}'));
    }

    #[test]
    fn test_oversized_block_windows_overlap() {
        // One giant block with no internal boundaries.
        let src: String = (0..200).map(|i| format!("    line_{i} = {i};\n")).collect();
        let drafts = chunk_code(&src, 20, 4);
        assert!(drafts.len() > 1);
        for pair in drafts.windows(2) {
            // Overlap carries the window start backwards past the previous end.
            assert!(pair[1].byte_start < pair[0].byte_end);
            assert!(pair[1].byte_start > pair[0].byte_start);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let src = "┌──────────────────┐\n│ コメント内容 here │\n└──────────────────┘\n";
        let drafts = chunk_code(src, 3, 1);
        assert!(!drafts.is_empty());
        for d in &drafts {
            assert_eq!(&src[d.byte_start as usize..d.byte_end as usize], d.text);
        }
    }

    #[test]
    fn test_deterministic() {
        let src = "fn a() {}\n\nfn b() {}\n\nfn c() {}\n\nfn d() {}\n";
        let first = chunk_code(src, 5, 1);
        let second = chunk_code(src, 5, 1);
        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a, b);
            assert_eq!(a.content_hash, b.content_hash);
        }
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = chunk_code("fn a() { 1 }\n", 300, 40);
        let b = chunk_code("fn a() { 2 }\n", 300, 40);
        assert_ne!(a[0].content_hash, b[0].content_hash);
    }
}
