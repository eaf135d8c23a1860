//! Writes embedded chunks into a vector index.
//!
//! Record IDs are derived from `source_id` + `sequence_index`, so
//! writing the same document twice overwrites rather than duplicates.
//! A document write upserts its current chunks and then prunes records
//! left over from a longer previous version.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use docvec_core::models::{Chunk, IndexRecord};
use docvec_core::store::{IndexCreation, VectorStore};
use docvec_core::{Error, Result};

/// Chunks of one document split by whether they need embedding.
#[derive(Debug, Default)]
pub struct DocumentPlan {
    /// New or changed chunks.
    pub stale: Vec<Chunk>,
    /// Chunks whose stored content hash, model and offset match.
    pub reused: usize,
}

pub struct Indexer {
    store: Arc<dyn VectorStore>,
    upsert_batch_size: usize,
}

impl Indexer {
    pub fn new(store: Arc<dyn VectorStore>, upsert_batch_size: usize) -> Self {
        Self {
            store,
            upsert_batch_size: upsert_batch_size.max(1),
        }
    }

    /// Create the index if absent. An existing index with a different
    /// dimensionality is a configuration error.
    pub async fn ensure_index(&self, name: &str, dims: usize) -> Result<IndexCreation> {
        let outcome = self.store.create_index(name, dims).await?;
        match outcome {
            IndexCreation::Created => tracing::info!(index = name, dims, "created vector index"),
            IndexCreation::AlreadyExists => {
                tracing::debug!(index = name, dims, "vector index already exists")
            }
        }
        Ok(outcome)
    }

    /// Write `records` in transactional batches.
    ///
    /// Every vector is checked against the index dimensionality before
    /// anything is written. A failed batch is returned as an error;
    /// batches before it stay written and retrying is safe. Stops before
    /// the next batch once `cancel` fires.
    pub async fn upsert(
        &self,
        index: &str,
        records: &[IndexRecord],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let info = self
            .store
            .describe_index(index)
            .await?
            .ok_or_else(|| Error::IndexNotFound(index.to_string()))?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != info.dims) {
            return Err(Error::DimensionMismatch {
                index: index.to_string(),
                expected: info.dims,
                actual: bad.vector.len(),
            });
        }

        let mut written = 0;
        for (batch_no, batch) in records.chunks(self.upsert_batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Err(err) = self.store.upsert(index, batch).await {
                tracing::error!(index, batch = batch_no, records = batch.len(), error = %err, "upsert failed");
                return Err(err);
            }
            written += batch.len();
        }
        Ok(written)
    }

    /// Split a document's chunks into those needing embedding and those
    /// already stored with the same content, model and offset.
    pub async fn plan_document(
        &self,
        index: &str,
        chunks: Vec<Chunk>,
        model: &str,
    ) -> Result<DocumentPlan> {
        let Some(first) = chunks.first() else {
            return Ok(DocumentPlan::default());
        };
        let stored = self.store.content_hashes(index, &first.source_id).await?;

        let mut plan = DocumentPlan::default();
        for chunk in chunks {
            let unchanged = stored.get(&chunk.id).is_some_and(|fp| {
                fp.content_hash == chunk.content_hash
                    && fp.embedding_model == model
                    && fp.char_offset == chunk.char_offset
            });
            if unchanged {
                plan.reused += 1;
            } else {
                plan.stale.push(chunk);
            }
        }
        Ok(plan)
    }

    /// Upsert a document's changed records, then drop records at or past
    /// `chunk_count` left by an earlier, longer version. Returns the
    /// number pruned.
    pub async fn replace_document(
        &self,
        index: &str,
        source_id: &str,
        records: &[IndexRecord],
        chunk_count: usize,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.upsert(index, records, cancel).await?;
        let pruned = self.store.prune_source(index, source_id, chunk_count).await?;
        if pruned > 0 {
            tracing::info!(index, file = source_id, pruned, "removed stale chunks");
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docvec_core::chunk::{chunk_document, ChunkConfig};
    use docvec_core::models::{EmbeddedChunk, RawDocument};
    use docvec_core::store::memory::InMemoryVectorStore;

    fn chunks(text: &str) -> Vec<Chunk> {
        let doc = RawDocument {
            source_id: "a.pdf".into(),
            filename: "a.pdf".into(),
            text: text.into(),
        };
        chunk_document(&doc, &ChunkConfig { size: 10, overlap: 2 }).unwrap()
    }

    fn records(chunks: &[Chunk], dims: usize) -> Vec<IndexRecord> {
        chunks
            .iter()
            .map(|c| {
                IndexRecord::from_embedded(
                    EmbeddedChunk {
                        vector: vec![1.0; dims],
                        chunk: c.clone(),
                    },
                    "m",
                    "2024-01-01T00:00:00Z",
                )
            })
            .collect()
    }

    fn indexer(batch: usize) -> (Arc<InMemoryVectorStore>, Indexer) {
        let store = Arc::new(InMemoryVectorStore::new());
        let indexer = Indexer::new(store.clone(), batch);
        (store, indexer)
    }

    #[tokio::test]
    async fn test_ensure_index_idempotent_and_checks_dims() {
        let (_, indexer) = indexer(2);
        assert_eq!(indexer.ensure_index("docs", 3).await.unwrap(), IndexCreation::Created);
        assert_eq!(
            indexer.ensure_index("docs", 3).await.unwrap(),
            IndexCreation::AlreadyExists
        );
        assert!(matches!(
            indexer.ensure_index("docs", 4).await.unwrap_err(),
            Error::Configuration(_)
        ));
    }

    #[tokio::test]
    async fn test_upsert_in_batches_and_rejects_wrong_dims() {
        let (store, indexer) = indexer(2);
        indexer.ensure_index("docs", 3).await.unwrap();
        let cs = chunks("abcdefghijklmnopqrstuvwxyz0123456789");

        let written = indexer
            .upsert("docs", &records(&cs, 3), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(written, cs.len());
        assert_eq!(store.count("docs").await.unwrap(), cs.len());

        let err = indexer
            .upsert("docs", &records(&cs, 5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 5, .. }));
    }

    #[tokio::test]
    async fn test_upsert_stops_when_cancelled() {
        let (store, indexer) = indexer(1);
        indexer.ensure_index("docs", 3).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = indexer
            .upsert("docs", &records(&chunks("abcdefghijkl"), 3), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_document_prunes_tail_and_plans_reuse() {
        let (store, indexer) = indexer(8);
        indexer.ensure_index("docs", 3).await.unwrap();
        let cancel = CancellationToken::new();

        let long = chunks("abcdefghijklmnopqrstuvwxyz01234567");
        assert_eq!(long.len(), 4);
        indexer
            .replace_document("docs", "a.pdf", &records(&long, 3), long.len(), &cancel)
            .await
            .unwrap();

        // Same first chunk, shorter document.
        let short = chunks("abcdefghijXYZ");
        let plan = indexer.plan_document("docs", short.clone(), "m").await.unwrap();
        assert_eq!(plan.reused, 1);
        assert_eq!(plan.stale.len(), 1);

        let pruned = indexer
            .replace_document("docs", "a.pdf", &records(&plan.stale, 3), short.len(), &cancel)
            .await
            .unwrap();
        assert_eq!(pruned, 2);
        assert_eq!(store.count("docs").await.unwrap(), 2);

        let other_model = indexer.plan_document("docs", short, "other").await.unwrap();
        assert_eq!(other_model.reused, 0);
        assert_eq!(other_model.stale.len(), 2);
    }
}
