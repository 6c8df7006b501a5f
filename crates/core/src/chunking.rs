//! Sliding-window chunking (C5), approximating tokens as 4 chars/token per
//! spec §4.4. Pure function: no embedding or HTTP calls live here, only the
//! windowing math, so it can be exercised without a live embedding service.

use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE_TOKENS: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP_TOKENS: usize = 50;
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Split `text` into overlapping windows. `chunk_size`/`overlap` are in
/// approximate tokens; converted to a char window via `CHARS_PER_TOKEN`.
/// Chunk index is 0-based and stable for a given input.
pub fn chunk(text: &str, chunk_size_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let window = (chunk_size_tokens.max(1)) * CHARS_PER_TOKEN;
    let overlap = (overlap_tokens * CHARS_PER_TOKEN).min(window.saturating_sub(1));
    let step = window - overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;
    while start < chars.len() {
        let end = (start + window).min(chars.len());
        let text: String = chars[start..end].iter().collect();
        chunks.push(Chunk { index, start, end, text });
        index += 1;
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

pub fn chunk_default(text: &str) -> Vec<Chunk> {
    chunk(text, DEFAULT_CHUNK_SIZE_TOKENS, DEFAULT_CHUNK_OVERLAP_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_indices() {
        let text = "a".repeat(5000);
        let chunks = chunk_default(&text);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn reconstructs_superset_of_characters_in_order() {
        let text: String = (0..2000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk(&text, 50, 10);
        // dedup the overlap by tracking the max char index already covered
        let mut reconstructed = String::new();
        let mut covered_to = 0usize;
        for c in &chunks {
            let take_from = covered_to.max(c.start);
            if take_from < c.end {
                let local_start = take_from - c.start;
                reconstructed.push_str(&c.text[local_start..]);
                covered_to = c.end;
            }
        }
        assert_eq!(reconstructed, text);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_default("").is_empty());
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_default("short document");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "short document");
    }
}
