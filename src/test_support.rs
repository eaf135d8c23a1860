//! Offline embedding provider for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use docvec_core::embedding::{EmbeddingError, EmbeddingProvider};

/// Scripted behaviour for the next call; once the script runs out the
/// provider answers normally.
pub enum Script {
    Fail(EmbeddingError),
    /// Answer with one vector too few.
    DropLast,
    /// Answer normally after a pause.
    Delay(Duration),
    /// Never answer.
    Hang,
}

pub struct FakeProvider {
    dims: usize,
    pub calls: AtomicUsize,
    /// Total texts received across all calls.
    pub texts_seen: AtomicUsize,
    in_flight: AtomicUsize,
    /// Most calls ever running at the same time.
    pub peak_in_flight: AtomicUsize,
    script: Mutex<VecDeque<Script>>,
}

impl FakeProvider {
    pub fn new(dims: usize) -> Self {
        Self::with_script(dims, Vec::new())
    }

    pub fn with_script(dims: usize, script: Vec<Script>) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
            texts_seen: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            script: Mutex::new(script.into()),
        }
    }

    /// Letter-frequency vector: identical texts score 1.0 against each other.
    pub fn vector_for(text: &str, dims: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; dims];
        for b in text.bytes() {
            v[b as usize % dims] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn model_name(&self) -> &str {
        "fake-model"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn max_batch_size(&self) -> usize {
        16
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
        let _guard = InFlight::enter(self);
        let next = self.script.lock().unwrap().pop_front();
        let mut vectors: Vec<Vec<f32>> = texts
            .iter()
            .map(|t| Self::vector_for(t, self.dims))
            .collect();
        match next {
            Some(Script::Fail(err)) => Err(err),
            Some(Script::DropLast) => {
                vectors.pop();
                Ok(vectors)
            }
            Some(Script::Delay(pause)) => {
                tokio::time::sleep(pause).await;
                Ok(vectors)
            }
            Some(Script::Hang) => std::future::pending().await,
            None => Ok(vectors),
        }
    }
}

/// Counts a call as running until dropped, including when a timeout
/// drops the call's future.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(provider: &'a FakeProvider) -> Self {
        let now = provider.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        provider.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(&provider.in_flight)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
