//! TOML configuration with environment overrides.
//!
//! ```toml
//! [db]
//! url = "sqlite:./data/docvec.sqlite"
//!
//! [documents]
//! root = "./documents"
//! extensions = ["pdf"]
//!
//! [chunking]
//! size = 512
//! overlap = 50
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [index]
//! name = "documents"
//!
//! [retrieval]
//! top_k = 5
//! ```
//!
//! `DATABASE_URL` overrides `db.url`, `DOCVEC_INDEX` overrides
//! `index.name`, and the OpenAI provider reads its credential from
//! `OPENAI_API_KEY`. Missing credentials or an empty connection string
//! are configuration errors.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub use docvec_core::chunk::ChunkConfig;

/// Extensions the extractor knows how to read.
pub const KNOWN_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Vector store connection string, e.g. `sqlite:./data/docvec.sqlite`.
    #[serde(default = "default_db_url")]
    pub url: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
        }
    }
}

fn default_db_url() -> String {
    "sqlite:./data/docvec.sqlite".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
            extensions: default_extensions(),
            exclude_globs: Vec::new(),
            recursive: false,
            follow_symlinks: false,
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("./documents")
}
fn default_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}
fn default_max_file_bytes() -> u64 {
    100 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for the provider API. Defaults per provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Embedding requests allowed in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
    /// Credential, filled from `OPENAI_API_KEY` at load time.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            api_key: None,
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_concurrency() -> usize {
    2
}
fn default_retry_base_ms() -> u64 {
    500
}
fn default_retry_max_ms() -> u64 {
    30_000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_name")]
    pub name: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            name: default_index_name(),
        }
    }
}

fn default_index_name() -> String {
    "documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Files extracted and chunked concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Records written per upsert transaction.
    #[serde(default = "default_upsert_batch_size")]
    pub upsert_batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            upsert_batch_size: default_upsert_batch_size(),
        }
    }
}

fn default_parallelism() -> usize {
    4
}
fn default_upsert_batch_size() -> usize {
    128
}

/// Read, apply environment overrides, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.apply_env(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Layer environment values over the file values.
    ///
    /// Takes a lookup function so tests do not have to mutate the
    /// process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL").map(|v| v.trim().to_string()) {
            if !url.is_empty() {
                self.db.url = url;
            }
        }
        if let Some(name) = lookup("DOCVEC_INDEX").map(|v| v.trim().to_string()) {
            if !name.is_empty() {
                self.index.name = name;
            }
        }
        self.embedding.api_key = lookup("OPENAI_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }

    /// Check every setting the pipeline relies on.
    pub fn validate(&self) -> Result<()> {
        if self.db.url.trim().is_empty() {
            bail!("db.url (or DATABASE_URL) must not be empty");
        }
        if !self.db.url.starts_with("sqlite:") {
            bail!(
                "Unsupported vector store connection string '{}': expected sqlite:<path>",
                self.db.url
            );
        }

        self.chunking
            .validate()
            .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

        if self.documents.extensions.is_empty() {
            bail!("documents.extensions must list at least one extension");
        }
        for ext in &self.documents.extensions {
            let ext = ext.trim_start_matches('.').to_ascii_lowercase();
            if !KNOWN_EXTENSIONS.contains(&ext.as_str()) {
                bail!(
                    "Unsupported document extension '{}'. Supported: {}",
                    ext,
                    KNOWN_EXTENSIONS.join(", ")
                );
            }
        }

        if self.index.name.trim().is_empty() {
            bail!("index.name must not be empty");
        }
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.ingest.parallelism == 0 || self.ingest.upsert_batch_size == 0 {
            bail!("ingest.parallelism and ingest.upsert_batch_size must be >= 1");
        }

        let emb = &self.embedding;
        match emb.provider.as_str() {
            "disabled" | "ollama" => {}
            "openai" => {
                if emb.api_key.is_none() {
                    bail!("OPENAI_API_KEY environment variable is not set");
                }
            }
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
                other
            ),
        }
        if emb.is_enabled() {
            if emb.dims == 0 {
                bail!("embedding.dims must be > 0 when provider is '{}'", emb.provider);
            }
            if emb.model.trim().is_empty() {
                bail!("embedding.model must be specified when provider is '{}'", emb.provider);
            }
            if emb.batch_size == 0 || emb.concurrency == 0 {
                bail!("embedding.batch_size and embedding.concurrency must be >= 1");
            }
            if emb.timeout_secs == 0 {
                bail!("embedding.timeout_secs must be >= 1");
            }
        }

        Ok(())
    }

    /// Path portion of the `sqlite:` connection string.
    pub fn sqlite_path(&self) -> PathBuf {
        let rest = self.db.url.trim_start_matches("sqlite:");
        PathBuf::from(rest.trim_start_matches("//"))
    }
}
