//! Query-time retrieval.
//!
//! [`Retriever`] embeds the query text and asks the vector store for the
//! top-K nearest records that satisfy an optional metadata [`Filter`].
//! [`run_query`] is the CLI wrapper that wires it to config and prints
//! results.

use std::sync::Arc;

use anyhow::Result;

use docvec_core::filter::Filter;
use docvec_core::models::ScoredRecord;
use docvec_core::store::VectorStore;

use crate::config::Config;
use crate::db;
use crate::embedder::{Embedder, EmbedderOptions};
use crate::embedding::create_provider;
use crate::sqlite_store::SqliteVectorStore;

pub struct Retriever {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    index: String,
    default_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Embedder,
        store: Arc<dyn VectorStore>,
        index: impl Into<String>,
        default_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            index: index.into(),
            default_k,
        }
    }

    /// Top-`k` records most similar to `text`, best first.
    ///
    /// `k` defaults to the configured top-K. Fewer matches than `k` is
    /// not an error, and a filter that matches nothing yields an empty
    /// list. A blank query or `k == 0` returns nothing without calling
    /// the model.
    pub async fn query(
        &self,
        text: &str,
        k: Option<usize>,
        filter: Option<&Filter>,
    ) -> docvec_core::Result<Vec<ScoredRecord>> {
        let k = k.unwrap_or(self.default_k);
        if k == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }
        if let Some(f) = filter {
            f.validate()?;
        }

        let vector = self.embedder.embed_query(text).await?;
        let hits = self.store.query(&self.index, &vector, k, filter).await?;
        tracing::debug!(index = %self.index, k, hits = hits.len(), "query complete");
        Ok(hits)
    }
}

/// `docvec query`: embed, search, and print.
pub async fn run_query(
    config: &Config,
    text: &str,
    k: Option<usize>,
    filter: Option<Filter>,
    json: bool,
) -> Result<()> {
    let provider = create_provider(&config.embedding)?;
    let embedder = Embedder::new(provider, EmbedderOptions::from_config(&config.embedding));
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteVectorStore::new(pool.clone()));
    let retriever = Retriever::new(embedder, store, &config.index.name, config.retrieval.top_k);

    let hits = retriever.query(text, k, filter.as_ref()).await?;
    pool.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
        return Ok(());
    }
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} #{}",
            i + 1,
            hit.score,
            hit.metadata.filename,
            hit.metadata.sequence_index
        );
        println!("    excerpt: \"{}\"", excerpt(&hit.metadata.content, 240));
        println!("    id: {}", hit.id);
        println!();
    }
    Ok(())
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat.to_string(),
    }
}
