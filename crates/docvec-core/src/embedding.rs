//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, the [`EmbeddingError`] they report, plus pure helper
//! functions for vector serialization and similarity computation.
//!
//! Concrete provider implementations (OpenAI, Ollama) and the batching,
//! retrying embedder live in the `docvec` app crate.

use async_trait::async_trait;

/// Errors reported by an embedding backend for one request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbeddingError {
    /// Provider asked us to slow down; `retry_after` is in seconds.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<u64>,
    },
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The provider rejected the input itself (too long, empty, bad model).
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    /// The response could not be parsed or had the wrong shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("embedding provider is disabled")]
    Disabled,
}

impl EmbeddingError {
    /// Whether the request may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::RateLimited { .. }
                | EmbeddingError::Server { .. }
                | EmbeddingError::Network(_)
                | EmbeddingError::Timeout(_)
        )
    }

    /// For rate-limited errors, the wait the provider suggested.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            EmbeddingError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Trait for embedding providers.
///
/// One call embeds one request-sized batch; splitting, retrying and
/// timeouts are the caller's job. Implementations must return exactly
/// one vector per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Largest number of texts accepted in one request.
    fn max_batch_size(&self) -> usize;
    /// Embed one batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use docvec_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or a zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
