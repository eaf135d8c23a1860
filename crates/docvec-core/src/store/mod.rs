//! Vector storage abstraction for docvec.
//!
//! The [`VectorStore`] trait is the capability the pipeline drives:
//! create a fixed-dimension index, upsert records, and run filtered
//! similarity search. The engine's own indexing strategy is its
//! business. Implementations must be `Send + Sync` so one handle can be
//! shared by concurrent pipeline stages.
//!
//! # Contract
//!
//! | Method | Behaviour |
//! |--------|-----------|
//! | [`create_index`](VectorStore::create_index) | Idempotent; first creator wins, a dimensionality mismatch is [`Error::Configuration`](crate::Error::Configuration) |
//! | [`upsert`](VectorStore::upsert) | All-or-nothing per call; same ID is last-write-wins |
//! | [`query`](VectorStore::query) | Top-K by cosine, ties by insertion order; no matches is `Ok(vec![])` |
//! | [`content_hashes`](VectorStore::content_hashes) | Stored fingerprints for one source, for staleness checks |
//! | [`prune_source`](VectorStore::prune_source) | Drop a source's records at or past a sequence index |
//! | [`count`](VectorStore::count) | Records in an index; a missing index is [`Error::IndexNotFound`] |

pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::models::{IndexInfo, IndexRecord, ScoredRecord};

/// What [`VectorStore::create_index`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCreation {
    Created,
    AlreadyExists,
}

/// What a store remembers about an already-embedded chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFingerprint {
    pub content_hash: String,
    pub embedding_model: String,
    pub char_offset: usize,
}

/// Abstract vector store backend.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create `name` with `dims`-dimensional vectors if it does not exist.
    async fn create_index(&self, name: &str, dims: usize) -> Result<IndexCreation>;

    /// Describe an index, or `None` if it does not exist.
    async fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>>;

    /// Insert or replace records by ID.
    ///
    /// Either every record in `records` is written or none is.
    async fn upsert(&self, index: &str, records: &[IndexRecord]) -> Result<()>;

    /// Return up to `k` records most similar to `vector`, restricted to
    /// records matching `filter`.
    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredRecord>>;

    /// Fingerprints of every stored record for `source_id`, keyed by record ID.
    async fn content_hashes(
        &self,
        index: &str,
        source_id: &str,
    ) -> Result<HashMap<String, StoredFingerprint>>;

    /// Delete records of `source_id` with `sequence_index >= keep`.
    ///
    /// Returns the number of records removed.
    async fn prune_source(&self, index: &str, source_id: &str, keep: usize) -> Result<u64>;

    /// Number of records in `index`.
    async fn count(&self, index: &str) -> Result<usize> {
        self.describe_index(index)
            .await?
            .map(|info| info.record_count)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))
    }
}
