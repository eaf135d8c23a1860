//! Per-item outcomes collected by an ingestion run.
//!
//! Every file the scanner sees ends up as exactly one [`ItemOutcome`];
//! the run summary is derived from the list rather than from counters
//! scattered through the pipeline.

use serde::Serialize;

/// Why an item was not ingested. None of these abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("unsupported extension '{0}'")]
    UnsupportedExtension(String),
    #[error("file is {bytes} bytes, limit is {limit}")]
    TooLarge { bytes: u64, limit: u64 },
    #[error("unreadable: {0}")]
    Unreadable(String),
    #[error("no extractable text")]
    NoExtractableText,
    #[error("chunking failed: {0}")]
    ChunkingFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Written to the index. `reused` chunks kept their stored vectors.
    Ingested {
        chunks: usize,
        embedded: usize,
        reused: usize,
        pruned: u64,
    },
    /// Extracted and chunked but not written (dry run).
    Planned { chunks: usize },
    Skipped { reason: SkipReason },
    /// Processing crashed for this item only.
    Failed { reason: String },
    /// Not attempted because the run stopped first.
    NotProcessed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub source_id: String,
    #[serde(flatten)]
    pub status: ItemStatus,
}

/// Result of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub index: String,
    pub items: Vec<ItemOutcome>,
    /// No document survived extraction, so nothing downstream ran.
    pub empty_input: bool,
    pub dry_run: bool,
}

impl IngestReport {
    pub fn push(&mut self, source_id: impl Into<String>, status: ItemStatus) {
        self.items.push(ItemOutcome {
            source_id: source_id.into(),
            status,
        });
    }

    pub fn ingested(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Ingested { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Failed { .. }))
    }

    pub fn not_processed(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::NotProcessed))
    }

    /// Chunks written (or planned, for a dry run).
    pub fn total_chunks(&self) -> usize {
        self.items
            .iter()
            .map(|i| match i.status {
                ItemStatus::Ingested { chunks, .. } | ItemStatus::Planned { chunks } => chunks,
                _ => 0,
            })
            .sum()
    }

    pub fn total_embedded(&self) -> usize {
        self.items
            .iter()
            .map(|i| match i.status {
                ItemStatus::Ingested { embedded, .. } => embedded,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome(&self, source_id: &str) -> Option<&ItemStatus> {
        self.items
            .iter()
            .find(|i| i.source_id == source_id)
            .map(|i| &i.status)
    }

    fn count(&self, pred: impl Fn(&ItemStatus) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.status)).count()
    }

    /// Print the human-readable run summary.
    pub fn print_summary(&self) {
        if self.dry_run {
            println!("ingest {} (dry-run)", self.index);
        } else {
            println!("ingest {}", self.index);
        }
        for item in &self.items {
            match &item.status {
                ItemStatus::Skipped { reason } => {
                    println!("  skipped {}: {}", item.source_id, reason)
                }
                ItemStatus::Failed { reason } => {
                    println!("  failed {}: {}", item.source_id, reason)
                }
                _ => {}
            }
        }
        if self.empty_input {
            println!("  no documents with extractable text; nothing ingested");
            return;
        }
        println!("  documents: {}", self.ingested().max(self.planned()));
        println!("  skipped: {}", self.skipped());
        if self.failed() > 0 {
            println!("  failed: {}", self.failed());
        }
        if self.dry_run {
            println!("  estimated chunks: {}", self.total_chunks());
            return;
        }
        println!("  chunks written: {}", self.total_chunks());
        println!("  chunks embedded: {}", self.total_embedded());
        if self.not_processed() > 0 {
            println!("  not processed: {}", self.not_processed());
        }
        println!("ok");
    }

    fn planned(&self) -> usize {
        self.count(|s| matches!(s, ItemStatus::Planned { .. }))
    }
}
