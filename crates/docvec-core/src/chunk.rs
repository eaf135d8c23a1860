//! Fixed-size, overlapping character chunker.
//!
//! Splits a [`RawDocument`] into [`Chunk`]s of at most `size` characters,
//! where consecutive chunks share `overlap` characters. The unit is the
//! Unicode scalar value (`char`), so multi-byte text never splits inside
//! a code point and `size` means the same thing for every language.
//!
//! # Algorithm
//!
//! 1. `step = size - overlap`.
//! 2. Chunk `i` starts at `i × step` and ends at `min(start + size, len)`.
//! 3. Stop after the chunk whose end reaches `len`.
//!
//! The final chunk may be shorter than `size` (even shorter than
//! `overlap`) and is always kept. Dropping the last `overlap` characters
//! of every chunk but the last and concatenating reproduces the text.
//!
//! Each chunk receives a deterministic UUIDv5 derived from its source ID
//! and sequence index, plus a SHA-256 hash of its text for staleness
//! detection during re-ingestion.
//!
//! # Example
//!
//! ```rust
//! use docvec_core::chunk::{chunk_document, ChunkConfig};
//! use docvec_core::models::RawDocument;
//!
//! let doc = RawDocument {
//!     source_id: "letters/1999.pdf".into(),
//!     filename: "1999.pdf".into(),
//!     text: "x".repeat(1000),
//! };
//! let chunks = chunk_document(&doc, &ChunkConfig { size: 512, overlap: 50 }).unwrap();
//! let offsets: Vec<usize> = chunks.iter().map(|c| c.char_offset).collect();
//! assert_eq!(offsets, vec![0, 462, 924]);
//! assert_eq!(chunks[2].text.chars().count(), 76);
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, RawDocument};

/// Namespace for record IDs so they never collide with other v5 UUIDs.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_9b7d_4c1e_8f3a_5d2b_0e9c_7a41);

/// Chunk sizing, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChunkConfig {
    pub size: usize,
    #[serde(default)]
    pub overlap: usize,
}

impl ChunkConfig {
    /// Check `size > 0` and `overlap < size`.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.size == 0 || self.overlap >= self.size {
            return Err(ChunkError::InvalidConfig {
                size: self.size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    /// Distance between the start offsets of consecutive chunks.
    pub fn step(&self) -> usize {
        self.size - self.overlap
    }

    /// Number of chunks a text of `len` characters produces.
    pub fn chunk_count(&self, len: usize) -> usize {
        if len == 0 || self.validate().is_err() {
            return 0;
        }
        if len <= self.size {
            return 1;
        }
        1 + (len - self.size).div_ceil(self.step())
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: 512,
            overlap: 50,
        }
    }
}

/// Reasons a single document cannot be chunked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("invalid chunk config: size={size}, overlap={overlap} (need size > 0 and overlap < size)")]
    InvalidConfig { size: usize, overlap: usize },
    #[error("document '{0}' has no text to chunk")]
    EmptyText(String),
}

/// Split a document into overlapping chunks.
///
/// # Guarantees
///
/// - Every chunk holds at most `config.size` characters.
/// - Sequence indices are contiguous: `0, 1, 2, …, N-1`.
/// - `chunks[i].char_offset == i × (size − overlap)`.
/// - The chunks cover the whole text with no gaps.
///
/// # Errors
///
/// [`ChunkError::InvalidConfig`] for a bad config and
/// [`ChunkError::EmptyText`] for a document with no characters.
pub fn chunk_document(doc: &RawDocument, config: &ChunkConfig) -> Result<Vec<Chunk>, ChunkError> {
    config.validate()?;
    if doc.text.is_empty() {
        return Err(ChunkError::EmptyText(doc.source_id.clone()));
    }

    // Byte position of every char, plus the end of the string.
    let mut boundaries: Vec<usize> = doc.text.char_indices().map(|(i, _)| i).collect();
    let len = boundaries.len();
    boundaries.push(doc.text.len());

    let step = config.step();
    let mut chunks = Vec::with_capacity(config.chunk_count(len));
    let mut start = 0usize;

    loop {
        let end = (start + config.size).min(len);
        let text = &doc.text[boundaries[start]..boundaries[end]];
        chunks.push(make_chunk(doc, chunks.len(), start, text));
        if end == len {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

/// Deterministic record ID for the chunk at `sequence_index` of `source_id`.
///
/// Re-ingesting the same source yields the same IDs, which makes upsert
/// idempotent.
pub fn record_id(source_id: &str, sequence_index: usize) -> String {
    let name = format!("{}\u{0}{}", source_id, sequence_index);
    Uuid::new_v5(&RECORD_NAMESPACE, name.as_bytes()).to_string()
}

/// SHA-256 hex digest of a chunk's text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn make_chunk(doc: &RawDocument, index: usize, char_offset: usize, text: &str) -> Chunk {
    Chunk {
        id: record_id(&doc.source_id, index),
        source_id: doc.source_id.clone(),
        filename: doc.filename.clone(),
        sequence_index: index,
        char_offset,
        text: text.to_string(),
        content_hash: content_hash(text),
    }
}
