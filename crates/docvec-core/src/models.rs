//! Core data models used throughout docvec.
//!
//! These types represent the documents, chunks, and index records that
//! flow through the ingestion pipeline, and the scored results returned
//! by retrieval.

use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Plain text extracted from one input file.
///
/// Produced by the extractor and consumed by the chunker; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    /// Path of the file relative to the documents root.
    pub source_id: String,
    /// File name component, used as the `filename` metadata field.
    pub filename: String,
    pub text: String,
}

/// A contiguous slice of a document's text.
///
/// `sequence_index` is contiguous from 0 within a document and
/// `char_offset` counts Unicode scalar values from the start of the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic record ID derived from `source_id` + `sequence_index`.
    pub id: String,
    pub source_id: String,
    pub filename: String,
    pub sequence_index: usize,
    pub char_offset: usize,
    pub text: String,
    /// SHA-256 of `text`, used to skip re-embedding unchanged chunks.
    pub content_hash: String,
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// Metadata persisted alongside every vector.
///
/// Known fields are typed; anything else lands in `extra` and is
/// flattened into the same JSON object on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub source_id: String,
    pub filename: String,
    pub sequence_index: usize,
    pub char_offset: usize,
    pub content: String,
    pub content_hash: String,
    pub embedding_model: String,
    /// RFC 3339 timestamp of the ingestion run that wrote the record.
    pub ingested_at: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl RecordMetadata {
    /// Look up a metadata field by name as a string.
    ///
    /// Numeric fields are rendered in decimal so filters can compare
    /// every field the same way.
    pub fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "source_id" => Some(Cow::Borrowed(&self.source_id)),
            "filename" => Some(Cow::Borrowed(&self.filename)),
            "sequence_index" => Some(Cow::Owned(self.sequence_index.to_string())),
            "char_offset" => Some(Cow::Owned(self.char_offset.to_string())),
            "content" => Some(Cow::Borrowed(&self.content)),
            "content_hash" => Some(Cow::Borrowed(&self.content_hash)),
            "embedding_model" => Some(Cow::Borrowed(&self.embedding_model)),
            "ingested_at" => Some(Cow::Borrowed(&self.ingested_at)),
            other => self.extra.get(other).map(|v| Cow::Borrowed(v.as_str())),
        }
    }
}

/// Persisted form of an embedded chunk.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl IndexRecord {
    /// Build the record for an embedded chunk.
    pub fn from_embedded(embedded: EmbeddedChunk, model: &str, ingested_at: &str) -> Self {
        let EmbeddedChunk { vector, chunk } = embedded;
        IndexRecord {
            id: chunk.id,
            vector,
            metadata: RecordMetadata {
                source_id: chunk.source_id,
                filename: chunk.filename,
                sequence_index: chunk.sequence_index,
                char_offset: chunk.char_offset,
                content: chunk.text,
                content_hash: chunk.content_hash,
                embedding_model: model.to_string(),
                ingested_at: ingested_at.to_string(),
                extra: BTreeMap::new(),
            },
        }
    }
}

/// A record returned by similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredRecord {
    pub id: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f64,
    pub metadata: RecordMetadata,
}

/// Description of an existing vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub dims: usize,
    pub record_count: usize,
}
