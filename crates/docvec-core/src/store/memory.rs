//! In-memory [`VectorStore`] implementation for testing and WASM targets.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Search is brute-force
//! cosine similarity over every record of the index.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::models::{IndexInfo, IndexRecord, ScoredRecord};
use crate::search::{top_k, Candidate};

use super::{IndexCreation, StoredFingerprint, VectorStore};

struct StoredRecord {
    ordinal: u64,
    record: IndexRecord,
}

struct MemoryIndex {
    dims: usize,
    records: HashMap<String, StoredRecord>,
    next_ordinal: u64,
}

/// In-memory vector store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, MemoryIndex>>> {
        self.indexes
            .read()
            .map_err(|_| Error::Store("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, MemoryIndex>>> {
        self.indexes
            .write()
            .map_err(|_| Error::Store("in-memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_index(&self, name: &str, dims: usize) -> Result<IndexCreation> {
        if dims == 0 {
            return Err(Error::Configuration(format!(
                "index '{}' needs a positive dimensionality",
                name
            )));
        }
        let mut indexes = self.write()?;
        match indexes.get(name) {
            Some(existing) if existing.dims == dims => Ok(IndexCreation::AlreadyExists),
            Some(existing) => Err(Error::Configuration(format!(
                "index '{}' exists with dimensionality {}, requested {}",
                name, existing.dims, dims
            ))),
            None => {
                indexes.insert(
                    name.to_string(),
                    MemoryIndex {
                        dims,
                        records: HashMap::new(),
                        next_ordinal: 0,
                    },
                );
                Ok(IndexCreation::Created)
            }
        }
    }

    async fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>> {
        let indexes = self.read()?;
        Ok(indexes.get(name).map(|idx| IndexInfo {
            name: name.to_string(),
            dims: idx.dims,
            record_count: idx.records.len(),
        }))
    }

    async fn upsert(&self, index: &str, records: &[IndexRecord]) -> Result<()> {
        let mut indexes = self.write()?;
        let idx = indexes
            .get_mut(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;

        // Validate the whole batch before touching anything.
        if let Some(bad) = records.iter().find(|r| r.vector.len() != idx.dims) {
            return Err(Error::DimensionMismatch {
                index: index.to_string(),
                expected: idx.dims,
                actual: bad.vector.len(),
            });
        }

        for record in records {
            match idx.records.get_mut(&record.id) {
                Some(stored) => stored.record = record.clone(),
                None => {
                    let ordinal = idx.next_ordinal;
                    idx.next_ordinal += 1;
                    idx.records.insert(
                        record.id.clone(),
                        StoredRecord {
                            ordinal,
                            record: record.clone(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredRecord>> {
        if let Some(f) = filter {
            f.validate()?;
        }
        let indexes = self.read()?;
        let idx = indexes
            .get(index)
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        if vector.len() != idx.dims {
            return Err(Error::DimensionMismatch {
                index: index.to_string(),
                expected: idx.dims,
                actual: vector.len(),
            });
        }

        let candidates: Vec<Candidate> = idx
            .records
            .values()
            .filter(|s| filter.map_or(true, |f| f.matches(&s.record.metadata)))
            .map(|s| Candidate {
                ordinal: s.ordinal,
                record: ScoredRecord {
                    id: s.record.id.clone(),
                    score: cosine_similarity(vector, &s.record.vector) as f64,
                    metadata: s.record.metadata.clone(),
                },
            })
            .collect();

        Ok(top_k(candidates, k))
    }

    async fn content_hashes(
        &self,
        index: &str,
        source_id: &str,
    ) -> Result<HashMap<String, StoredFingerprint>> {
        let indexes = self.read()?;
        let Some(idx) = indexes.get(index) else {
            return Ok(HashMap::new());
        };
        Ok(idx
            .records
            .values()
            .filter(|s| s.record.metadata.source_id == source_id)
            .map(|s| {
                (
                    s.record.id.clone(),
                    StoredFingerprint {
                        content_hash: s.record.metadata.content_hash.clone(),
                        embedding_model: s.record.metadata.embedding_model.clone(),
                        char_offset: s.record.metadata.char_offset,
                    },
                )
            })
            .collect())
    }

    async fn prune_source(&self, index: &str, source_id: &str, keep: usize) -> Result<u64> {
        let mut indexes = self.write()?;
        let Some(idx) = indexes.get_mut(index) else {
            return Ok(0);
        };
        let before = idx.records.len();
        idx.records.retain(|_, s| {
            s.record.metadata.source_id != source_id || s.record.metadata.sequence_index < keep
        });
        Ok((before - idx.records.len()) as u64)
    }
}
