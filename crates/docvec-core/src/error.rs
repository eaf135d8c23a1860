//! Error taxonomy shared by every pipeline stage.
//!
//! Per-item problems (an unreadable file, a document that fails to chunk)
//! are not errors at this level: the pipeline records them as skipped
//! items. Everything here is fatal for the operation that returned it.

use crate::chunk::ChunkError;
use crate::embedding::EmbeddingError;

/// Fatal pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or inconsistent configuration, including an existing index
    /// declared with a different dimensionality.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A vector's length does not match the index dimensionality.
    #[error("dimension mismatch for index '{index}': expected {expected}, got {actual}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    /// The embedding model returned a different number of vectors than
    /// texts it was given.
    #[error("embedding response misaligned: sent {sent} texts, received {received} vectors")]
    Misaligned { sent: usize, received: usize },

    /// Embedding failed after exhausting retries, or with a permanent error.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// The vector store rejected or failed an operation.
    #[error("vector store error: {0}")]
    Store(String),

    /// The named index has not been created.
    #[error("index '{0}' does not exist")]
    IndexNotFound(String),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// The run was cancelled before all work was issued.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn store(err: impl std::fmt::Display) -> Self {
        Error::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
