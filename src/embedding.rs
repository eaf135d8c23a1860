//! Embedding provider implementations.
//!
//! - **[`DisabledProvider`]**: every request fails with [`EmbeddingError::Disabled`].
//! - **[`OpenAIProvider`]**: `POST {url}/embeddings` on the OpenAI API.
//! - **[`OllamaProvider`]**: `POST {url}/api/embed` on a local Ollama instance.
//!
//! Providers send exactly one request per [`embed_batch`] call and map
//! the outcome onto [`EmbeddingError`]. Batching, retry with backoff, and
//! concurrency limits live in [`crate::embedder`].
//!
//! [`embed_batch`]: EmbeddingProvider::embed_batch

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

pub use docvec_core::embedding::{EmbeddingError, EmbeddingProvider};

use crate::config::EmbeddingConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Inputs per request the OpenAI embeddings endpoint accepts.
const OPENAI_MAX_BATCH: usize = 2048;
const OLLAMA_MAX_BATCH: usize = 256;

/// Build the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    fn max_batch_size(&self) -> usize {
        1
    }
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API.
///
/// The credential comes from `embedding.api_key`, which config loading
/// fills from `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dims: usize,
    timeout_secs: u64,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(key) => key.clone(),
            None => bail!("OPENAI_API_KEY environment variable is not set"),
        };
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint: format!("{}/embeddings", base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn max_batch_size(&self) -> usize {
        OPENAI_MAX_BATCH
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let text = read_success_body(response, self.timeout_secs).await?;
        parse_openai_response(&text)
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbedding {
    index: usize,
    embedding: Vec<f32>,
}

/// Parse an OpenAI embeddings response, returning vectors in input order.
fn parse_openai_response(body: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut parsed: OpenAIResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
    parsed.data.sort_by_key(|d| d.index);
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance.
///
/// Requires Ollama to be running with the model pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dims: usize,
    timeout_secs: u64,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL);
        Ok(Self {
            client: build_client(config.timeout_secs)?,
            endpoint: format!("{}/api/embed", base.trim_end_matches('/')),
            model: config.model.clone(),
            dims: config.dims,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn max_batch_size(&self) -> usize {
        OLLAMA_MAX_BATCH
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let text = read_success_body(response, self.timeout_secs).await?;
        parse_ollama_response(&text)
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    embeddings: Vec<Vec<f32>>,
}

fn parse_ollama_response(body: &str) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let parsed: OllamaResponse = serde_json::from_str(body)
        .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
    Ok(parsed.embeddings)
}

// ============ HTTP helpers ============

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Return the body of a 2xx response, or the classified error.
async fn read_success_body(
    response: reqwest::Response,
    timeout_secs: u64,
) -> Result<String, EmbeddingError> {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response
        .text()
        .await
        .map_err(|e| map_transport_error(e, timeout_secs))?;

    if (200..300).contains(&status) {
        Ok(body)
    } else {
        Err(classify_status(status, retry_after, body))
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn classify_status(status: u16, retry_after: Option<u64>, body: String) -> EmbeddingError {
    match status {
        429 => EmbeddingError::RateLimited {
            message: body,
            retry_after,
        },
        401 | 403 => EmbeddingError::Authentication(body),
        400..=499 => EmbeddingError::MalformedInput(format!("HTTP {}: {}", status, body)),
        _ => EmbeddingError::Server {
            status,
            message: body,
        },
    }
}

fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> EmbeddingError {
    if err.is_timeout() {
        EmbeddingError::Timeout(timeout_secs)
    } else if err.is_decode() {
        EmbeddingError::InvalidResponse(err.to_string())
    } else {
        EmbeddingError::Network(err.to_string())
    }
}
