//! Overlapping word-window text chunker.
//!
//! Splits a record's serialized text into windows of at most `max_words`
//! whitespace-separated words. Consecutive windows share `overlap` words so
//! that a sentence straddling a boundary is still embedded whole at least
//! once.
//!
//! Each chunk receives a deterministic ID derived from its parent record ID
//! and index (`{parent_id}_chunk_{index}`), plus a SHA-256 hash of its text.
//! Re-chunking unchanged text therefore yields byte-identical chunks, which
//! is what makes a resync of an unmodified record a no-op.
//!
//! # Algorithm
//!
//! 1. Split text on whitespace.
//! 2. If the word count is `<= max_words`, return the text untouched.
//! 3. Otherwise take `words[start..start + max_words]`, advance `start` by
//!    `max_words - overlap`, and repeat until `start >= word_count`. The last
//!    window may be shorter than `max_words`.
//!
//! # Example
//!
//! ```rust
//! use notion_rag_core::chunk::{chunk_words, ChunkParams};
//!
//! let text = vec!["w"; 1000].join(" ");
//! let chunks = chunk_words(&text, &ChunkParams::new(300, 50).unwrap());
//! assert_eq!(chunks.len(), 4);
//! ```

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::models::{Chunk, Metadata, MetadataValue};

pub const DEFAULT_MAX_WORDS: usize = 300;
pub const DEFAULT_OVERLAP: usize = 50;

/// Validated window parameters. `overlap < max_words` always holds, so the
/// window step is at least one word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    max_words: usize,
    overlap: usize,
}

impl ChunkParams {
    pub fn new(max_words: usize, overlap: usize) -> Result<Self> {
        if max_words == 0 || overlap >= max_words {
            return Err(RagError::InvalidChunkParams { max_words, overlap });
        }
        Ok(Self { max_words, overlap })
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn step(&self) -> usize {
        self.max_words - self.overlap
    }
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

/// Split text into ordered, overlapping word windows.
///
/// Always returns at least one element. Text at or under the limit is
/// returned as-is (original whitespace preserved); longer text is rejoined
/// with single spaces.
pub fn chunk_words(text: &str, params: &ChunkParams) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= params.max_words {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::with_capacity(words.len() / params.step() + 1);
    let mut start = 0;
    while start < words.len() {
        let end = (start + params.max_words).min(words.len());
        chunks.push(words[start..end].join(" "));
        start += params.step();
    }
    chunks
}

/// Deterministic chunk ID for a parent record and position.
pub fn chunk_id(parent_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", parent_id, index)
}

/// Chunk a serialized record and attach per-chunk metadata.
///
/// Every chunk carries a copy of `base` plus `chunk_index` and
/// `content_hash`.
pub fn chunk_record(
    parent_id: &str,
    text: &str,
    base: &Metadata,
    params: &ChunkParams,
) -> Vec<Chunk> {
    chunk_words(text, params)
        .into_iter()
        .enumerate()
        .map(|(index, piece)| make_chunk(parent_id, index, piece, base))
        .collect()
}

fn make_chunk(parent_id: &str, index: usize, text: String, base: &Metadata) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let mut metadata = base.clone();
    metadata.insert("chunk_index".into(), MetadataValue::Int(index as i64));
    metadata.insert("content_hash".into(), MetadataValue::Str(hash.clone()));

    Chunk {
        id: chunk_id(parent_id, index),
        parent_id: parent_id.to_string(),
        index,
        text,
        hash,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_small_text_single_chunk_unchanged() {
        let text = "Task: Buy milk\nStatus: Not Started\n";
        let chunks = chunk_words(text, &ChunkParams::default());
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_empty_text() {
        let chunks = chunk_words("", &ChunkParams::default());
        assert_eq!(chunks, vec![String::new()]);
    }

    #[test]
    fn test_exactly_max_words_is_single_chunk() {
        let text = numbered(300);
        assert_eq!(chunk_words(&text, &ChunkParams::default()).len(), 1);
    }

    #[test]
    fn test_thousand_words_four_windows() {
        let text = numbered(1000);
        let chunks = chunk_words(&text, &ChunkParams::new(300, 50).unwrap());
        assert_eq!(chunks.len(), 4);
        let expected = [(0, 300), (250, 550), (500, 800), (750, 1000)];
        for (chunk, (lo, hi)) in chunks.iter().zip(expected) {
            let words: Vec<&str> = chunk.split(' ').collect();
            assert_eq!(words.len(), hi - lo);
            assert_eq!(words[0], format!("w{}", lo));
            assert_eq!(*words.last().unwrap(), format!("w{}", hi - 1));
        }
    }

    #[test]
    fn test_size_bound_and_coverage() {
        let params = ChunkParams::new(7, 3).unwrap();
        let text = numbered(53);
        let chunks = chunk_words(&text, &params);
        for c in &chunks {
            assert!(c.split_whitespace().count() <= params.max_words());
        }
        // Drop the overlapping prefix of every window after the first and the
        // original sequence must come back.
        let mut rebuilt: Vec<String> = Vec::new();
        for (i, c) in chunks.iter().enumerate() {
            let words: Vec<&str> = c.split_whitespace().collect();
            let already = if i == 0 { 0 } else { rebuilt.len() - i * params.step() };
            rebuilt.extend(words.iter().skip(already).map(|w| w.to_string()));
        }
        let original: Vec<String> = text.split_whitespace().map(String::from).collect();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_deterministic() {
        let text = numbered(777);
        let params = ChunkParams::new(100, 10).unwrap();
        assert_eq!(chunk_words(&text, &params), chunk_words(&text, &params));
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(ChunkParams::new(10, 10).is_err());
        assert!(ChunkParams::new(10, 11).is_err());
        assert!(ChunkParams::new(0, 0).is_err());
        assert!(ChunkParams::new(1, 0).is_ok());
    }

    #[test]
    fn test_chunk_record_ids_and_metadata() {
        let mut base = Metadata::new();
        base.insert("parent_id".into(), "task1".into());
        let text = numbered(600);
        let chunks = chunk_record("task1", &text, &base, &ChunkParams::default());
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.id, format!("task1_chunk_{}", i));
            assert_eq!(c.index, i);
            assert_eq!(c.metadata.get("chunk_index"), Some(&MetadataValue::Int(i as i64)));
            assert_eq!(
                c.metadata.get("content_hash"),
                Some(&MetadataValue::Str(c.hash.clone()))
            );
            assert_eq!(c.hash.len(), 64);
        }
    }
}
