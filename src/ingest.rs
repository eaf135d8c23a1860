//! Ingestion pipeline orchestration.
//!
//! Coordinates the offline flow: scan → extract → chunk → embed → index.
//!
//! Extraction and chunking run on blocking threads, at most
//! `ingest.parallelism` files at a time. Per-file problems become
//! [`ItemStatus::Skipped`] or [`ItemStatus::Failed`] entries in the
//! report and never stop the run. If no document survives extraction
//! the run ends there and the model and store are never touched.
//!
//! Documents are then embedded and written one at a time, in scan order.
//! Chunks already stored with the same content hash and model are not
//! re-embedded. Embedding or store failures are fatal; the error is
//! returned together with the report of what was completed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use docvec_core::chunk::{chunk_document, ChunkConfig};
use docvec_core::embedding::EmbeddingError;
use docvec_core::models::{Chunk, EmbeddedChunk, IndexRecord};
use docvec_core::store::VectorStore;
use docvec_core::Error;

use crate::config::{Config, DocumentsConfig};
use crate::db;
use crate::embedder::{Embedder, EmbedderOptions};
use crate::embedding::create_provider;
use crate::indexer::Indexer;
use crate::report::{IngestReport, ItemStatus, SkipReason};
use crate::scan::{read_document, Candidate, DocumentScanner, ScanEntry};
use crate::sqlite_store::SqliteVectorStore;

/// A fatal pipeline error plus the report of work finished before it.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct IngestFailure {
    #[source]
    pub error: Error,
    pub report: IngestReport,
}

enum Prepared {
    Ready(Vec<Chunk>),
    Skipped(SkipReason),
    Failed(String),
}

pub struct Ingestor {
    documents: DocumentsConfig,
    chunking: ChunkConfig,
    parallelism: usize,
    index: String,
    embedder: Embedder,
    indexer: Indexer,
}

impl Ingestor {
    pub fn new(config: &Config, embedder: Embedder, store: Arc<dyn VectorStore>) -> Self {
        Self {
            documents: config.documents.clone(),
            chunking: config.chunking,
            parallelism: config.ingest.parallelism.max(1),
            index: config.index.name.clone(),
            embedder,
            indexer: Indexer::new(store, config.ingest.upsert_batch_size),
        }
    }

    /// Run the pipeline over the documents root.
    ///
    /// With `dry_run` the report lists planned chunk counts and neither
    /// the model nor the store is called.
    pub async fn run(
        &self,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestReport, IngestFailure> {
        let mut report = IngestReport {
            index: self.index.clone(),
            dry_run,
            ..IngestReport::default()
        };

        let scanner = DocumentScanner::new(&self.documents).map_err(|e| IngestFailure {
            error: Error::Configuration(format!("{:#}", e)),
            report: report.clone(),
        })?;

        let ready = self.prepare(scanner, &mut report, cancel).await;
        if cancel.is_cancelled() {
            return Err(IngestFailure {
                error: Error::Cancelled,
                report,
            });
        }

        if ready.is_empty() {
            tracing::warn!(root = %self.documents.root.display(), "no documents with extractable text");
            report.empty_input = true;
            return Ok(report);
        }
        tracing::info!(documents = ready.len(), "extraction complete");

        if dry_run {
            for (source_id, chunks) in ready {
                report.push(source_id, ItemStatus::Planned { chunks: chunks.len() });
            }
            return Ok(report);
        }

        if let Err(error) = self.ensure_index().await {
            return Err(IngestFailure { error, report });
        }

        let ingested_at = chrono::Utc::now().to_rfc3339();
        let mut pending = ready.into_iter();
        while let Some((source_id, chunks)) = pending.next() {
            let outcome = if cancel.is_cancelled() {
                Err(Error::Cancelled)
            } else {
                self.write_document(&source_id, chunks, &ingested_at, cancel)
                    .await
            };
            match outcome {
                Ok(status) => report.push(source_id, status),
                Err(error) => {
                    report.push(source_id, ItemStatus::NotProcessed);
                    for (rest, _) in pending {
                        report.push(rest, ItemStatus::NotProcessed);
                    }
                    return Err(IngestFailure { error, report });
                }
            }
        }

        tracing::info!(
            index = %self.index,
            documents = report.ingested(),
            chunks = report.total_chunks(),
            embedded = report.total_embedded(),
            "ingestion complete"
        );
        Ok(report)
    }

    async fn ensure_index(&self) -> docvec_core::Result<()> {
        let dims = self.embedder.dims();
        if dims == 0 {
            return Err(Error::Embedding(EmbeddingError::Disabled));
        }
        self.indexer.ensure_index(&self.index, dims).await?;
        Ok(())
    }

    /// Extract and chunk every candidate with bounded parallelism.
    ///
    /// Returns documents with chunks in scan order; everything else is
    /// recorded in `report`.
    async fn prepare(
        &self,
        scanner: DocumentScanner,
        report: &mut IngestReport,
        cancel: &CancellationToken,
    ) -> Vec<(String, Vec<Chunk>)> {
        let mut tasks: JoinSet<(usize, String, Prepared)> = JoinSet::new();
        let mut results: Vec<(usize, String, Prepared)> = Vec::new();

        for (position, entry) in scanner.enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            match entry {
                ScanEntry::Skipped { source_id, reason } => {
                    results.push((position, source_id, Prepared::Skipped(reason)));
                }
                ScanEntry::Candidate(candidate) => {
                    while tasks.len() >= self.parallelism {
                        if let Some(done) = tasks.join_next().await {
                            results.push(joined(done));
                        }
                    }
                    let max_bytes = self.documents.max_file_bytes;
                    let chunking = self.chunking;
                    tasks.spawn(async move {
                        let source_id = candidate.source_id.clone();
                        let work = tokio::task::spawn_blocking(move || {
                            prepare_one(&candidate, max_bytes, &chunking)
                        });
                        let prepared = match work.await {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::error!(file = %source_id, error = %e, "document processing crashed");
                                Prepared::Failed(e.to_string())
                            }
                        };
                        (position, source_id, prepared)
                    });
                }
            }
        }
        while let Some(done) = tasks.join_next().await {
            results.push(joined(done));
        }

        results.sort_by_key(|(position, _, _)| *position);
        let mut ready = Vec::new();
        for (_, source_id, prepared) in results {
            match prepared {
                Prepared::Ready(chunks) => ready.push((source_id, chunks)),
                Prepared::Skipped(reason) => report.push(source_id, ItemStatus::Skipped { reason }),
                Prepared::Failed(reason) => report.push(source_id, ItemStatus::Failed { reason }),
            }
        }
        ready
    }

    async fn write_document(
        &self,
        source_id: &str,
        chunks: Vec<Chunk>,
        ingested_at: &str,
        cancel: &CancellationToken,
    ) -> docvec_core::Result<ItemStatus> {
        let chunk_count = chunks.len();
        let model = self.embedder.model_name().to_string();
        let plan = self.indexer.plan_document(&self.index, chunks, &model).await?;

        let texts: Vec<String> = plan.stale.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_texts(&texts, cancel).await?;
        let records: Vec<IndexRecord> = plan
            .stale
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                IndexRecord::from_embedded(EmbeddedChunk { vector, chunk }, &model, ingested_at)
            })
            .collect();

        let pruned = self
            .indexer
            .replace_document(&self.index, source_id, &records, chunk_count, cancel)
            .await?;

        tracing::info!(
            file = source_id,
            chunks = chunk_count,
            embedded = records.len(),
            reused = plan.reused,
            "document indexed"
        );
        Ok(ItemStatus::Ingested {
            chunks: chunk_count,
            embedded: records.len(),
            reused: plan.reused,
            pruned,
        })
    }
}

fn joined(
    done: Result<(usize, String, Prepared), tokio::task::JoinError>,
) -> (usize, String, Prepared) {
    match done {
        Ok(result) => result,
        // The outer task only awaits the blocking one, so it cannot panic itself.
        Err(e) => (usize::MAX, String::from("<unknown>"), Prepared::Failed(e.to_string())),
    }
}

fn prepare_one(candidate: &Candidate, max_file_bytes: u64, chunking: &ChunkConfig) -> Prepared {
    let doc = match read_document(candidate, max_file_bytes) {
        Ok(doc) => doc,
        Err(reason) => return Prepared::Skipped(reason),
    };
    match chunk_document(&doc, chunking) {
        Ok(chunks) => {
            tracing::debug!(file = %doc.source_id, chunks = chunks.len(), "chunked");
            Prepared::Ready(chunks)
        }
        Err(e) => {
            tracing::warn!(file = %doc.source_id, error = %e, "chunking failed, skipping");
            Prepared::Skipped(SkipReason::ChunkingFailed(e.to_string()))
        }
    }
}

/// `docvec ingest`: wire config to the pipeline and print the summary.
pub async fn run_ingest(
    config: &Config,
    root: Option<PathBuf>,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<IngestReport> {
    let mut config = config.clone();
    if let Some(root) = root {
        config.documents.root = root;
    }

    let provider = create_provider(&config.embedding)?;
    let embedder = Embedder::new(provider, EmbedderOptions::from_config(&config.embedding));
    let pool = db::connect(&config).await?;
    let store = Arc::new(SqliteVectorStore::new(pool.clone()));
    let ingestor = Ingestor::new(&config, embedder, store);

    let result = ingestor.run(dry_run, &cancel).await;
    pool.close().await;

    match result {
        Ok(report) => {
            report.print_summary();
            Ok(report)
        }
        Err(failure) => {
            failure.report.print_summary();
            Err(anyhow::Error::new(failure.error).context("ingestion failed"))
        }
    }
}
