//! Batched, bounded, retrying embedding.
//!
//! [`Embedder`] splits texts into provider-sized batches and runs them
//! concurrently under a shared semaphore. Each batch is retried on
//! transient errors with exponential backoff (or the provider's
//! `Retry-After`). The first permanent failure cancels batches that have
//! not started yet and is returned to the caller. Output vectors are
//! placed by batch position, so the result is always aligned with the
//! input regardless of completion order.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use docvec_core::embedding::{EmbeddingError, EmbeddingProvider};
use docvec_core::{Error, Result};

use crate::config::EmbeddingConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is one more.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32, err: &EmbeddingError) -> Duration {
        if let Some(secs) = err.retry_after_secs() {
            return Duration::from_secs(secs);
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct EmbedderOptions {
    pub batch_size: usize,
    /// Requests in flight at once, shared by every caller of one embedder.
    pub concurrency: usize,
    /// Deadline for a single request attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl EmbedderOptions {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_base_ms),
                max_delay: Duration::from_millis(config.retry_max_ms),
            },
        }
    }
}

#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    options: Arc<EmbedderOptions>,
    limiter: Arc<Semaphore>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: EmbedderOptions) -> Self {
        let limiter = Arc::new(Semaphore::new(options.concurrency.max(1)));
        Self {
            provider,
            options: Arc::new(options),
            limiter,
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.provider.dims()
    }

    fn batch_size(&self) -> usize {
        self.options
            .batch_size
            .min(self.provider.max_batch_size())
            .max(1)
    }

    /// Embed `texts`, returning one vector per text in input order.
    ///
    /// Fails with [`Error::Cancelled`] if `cancel` fires before every
    /// batch has been issued; requests already in flight are not aborted.
    pub async fn embed_texts(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<String>> = texts
            .chunks(self.batch_size())
            .map(|b| b.to_vec())
            .collect();
        let batch_count = batches.len();
        let halt = cancel.child_token();
        let mut tasks = JoinSet::new();

        for (position, batch) in batches.into_iter().enumerate() {
            let provider = Arc::clone(&self.provider);
            let options = Arc::clone(&self.options);
            let limiter = Arc::clone(&self.limiter);
            let halt = halt.clone();
            tasks.spawn(async move {
                let permit = tokio::select! {
                    permit = limiter.acquire_owned() => permit,
                    _ = halt.cancelled() => return (position, Err(Error::Cancelled)),
                };
                let _permit = match permit {
                    Ok(p) => p,
                    Err(_) => return (position, Err(Error::Cancelled)),
                };
                if halt.is_cancelled() {
                    return (position, Err(Error::Cancelled));
                }
                let result =
                    embed_with_retry(provider.as_ref(), position, &batch, &options, &halt).await;
                if result.is_err() {
                    halt.cancel();
                }
                (position, result)
            });
        }

        let mut slots: Vec<Option<Vec<Vec<f32>>>> = vec![None; batch_count];
        let mut failure: Option<Error> = None;
        while let Some(joined) = tasks.join_next().await {
            let (position, result) = match joined {
                Ok(outcome) => outcome,
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => (usize::MAX, Err(Error::Cancelled)),
            };
            match result {
                Ok(vectors) => slots[position] = Some(vectors),
                // Keep the root cause over the cancellations it triggered.
                Err(Error::Cancelled) => {
                    failure.get_or_insert(Error::Cancelled);
                }
                Err(err) => {
                    if matches!(failure, None | Some(Error::Cancelled)) {
                        failure = Some(err);
                    }
                }
            }
        }

        if let Some(err) = failure {
            return Err(err);
        }

        let mut out = Vec::with_capacity(texts.len());
        for slot in slots {
            out.extend(slot.ok_or(Error::Cancelled)?);
        }
        Ok(out)
    }

    /// Embed one query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self
            .embed_texts(&[text.to_string()], &CancellationToken::new())
            .await?;
        vectors.into_iter().next().ok_or(Error::Misaligned {
            sent: 1,
            received: 0,
        })
    }
}

async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    position: usize,
    batch: &[String],
    options: &EmbedderOptions,
    cancel: &CancellationToken,
) -> Result<Vec<Vec<f32>>> {
    let mut attempt = 0u32;
    loop {
        let outcome = match tokio::time::timeout(options.timeout, provider.embed_batch(batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(EmbeddingError::Timeout(options.timeout.as_secs())),
        };

        match outcome {
            Ok(vectors) => {
                if vectors.len() != batch.len() {
                    return Err(Error::Misaligned {
                        sent: batch.len(),
                        received: vectors.len(),
                    });
                }
                return Ok(vectors);
            }
            Err(err) if err.is_retryable() && attempt < options.retry.max_retries => {
                let delay = options.retry.delay_for(attempt, &err);
                attempt += 1;
                tracing::warn!(
                    batch = position,
                    attempt,
                    max_retries = options.retry.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "embedding request failed, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(Error::Cancelled),
                }
            }
            Err(err) => {
                tracing::error!(
                    batch = position,
                    attempts = attempt + 1,
                    error = %err,
                    "embedding request failed"
                );
                return Err(err.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeProvider, Script};
    use std::sync::atomic::Ordering;

    fn options(batch_size: usize, max_retries: u32) -> EmbedderOptions {
        EmbedderOptions {
            batch_size,
            concurrency: 2,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                max_retries,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("chunk number {}", i)).collect()
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        };
        let err = EmbeddingError::Network("reset".into());
        assert_eq!(policy.delay_for(0, &err), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2, &err), Duration::from_secs(2));
        assert_eq!(policy.delay_for(9, &err), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40, &err), Duration::from_secs(30));

        let limited = EmbeddingError::RateLimited {
            message: "slow".into(),
            retry_after: Some(3),
        };
        assert_eq!(policy.delay_for(0, &limited), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_vectors_aligned_across_batches() {
        let provider = Arc::new(FakeProvider::new(8));
        let embedder = Embedder::new(provider.clone(), options(3, 0));
        let input = texts(10);

        let vectors = embedder
            .embed_texts(&input, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(vectors.len(), 10);
        for (text, vector) in input.iter().zip(&vectors) {
            assert_eq!(vector, &FakeProvider::vector_for(text, 8));
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_once() {
        let provider = Arc::new(FakeProvider::with_script(
            8,
            vec![Script::Fail(EmbeddingError::RateLimited {
                message: "429".into(),
                retry_after: None,
            })],
        ));
        let embedder = Embedder::new(provider.clone(), options(64, 3));

        let vectors = embedder
            .embed_texts(&texts(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(vectors.len(), 10);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail() {
        let failures = (0..4)
            .map(|_| Script::Fail(EmbeddingError::Server {
                status: 503,
                message: "down".into(),
            }))
            .collect();
        let provider = Arc::new(FakeProvider::with_script(8, failures));
        let embedder = Embedder::new(provider.clone(), options(64, 2));

        let err = embedder
            .embed_texts(&texts(4), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Embedding(EmbeddingError::Server { .. })));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hung_request_times_out_and_is_retried() {
        let provider = Arc::new(FakeProvider::with_script(8, vec![Script::Hang]));
        let mut opts = options(64, 2);
        opts.timeout = Duration::from_millis(200);
        let embedder = Embedder::new(provider.clone(), opts);

        let started = std::time::Instant::now();
        let vectors = embedder
            .embed_texts(&texts(3), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(vectors.len(), 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_in_flight_requests_never_exceed_concurrency() {
        let pauses = (0..12)
            .map(|_| Script::Delay(Duration::from_millis(20)))
            .collect();
        let provider = Arc::new(FakeProvider::with_script(8, pauses));
        let embedder = Embedder::new(provider.clone(), options(1, 0));

        let vectors = embedder
            .embed_texts(&texts(12), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(vectors.len(), 12);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 12);
        assert_eq!(provider.peak_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_during_request_stops_retries() {
        let provider = Arc::new(FakeProvider::with_script(8, vec![Script::Hang]));
        let mut opts = options(2, 3);
        opts.concurrency = 1;
        opts.timeout = Duration::from_millis(200);
        opts.retry.base_delay = Duration::from_secs(10);
        opts.retry.max_delay = Duration::from_secs(10);
        let embedder = Embedder::new(provider.clone(), opts);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = embedder.embed_texts(&texts(4), &cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let provider = Arc::new(FakeProvider::with_script(
            8,
            vec![Script::Fail(EmbeddingError::Authentication("bad key".into()))],
        ));
        let embedder = Embedder::new(provider.clone(), options(64, 5));

        let err = embedder
            .embed_texts(&texts(2), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Embedding(EmbeddingError::Authentication(_))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrong_vector_count_is_misaligned() {
        let provider = Arc::new(FakeProvider::with_script(8, vec![Script::DropLast]));
        let embedder = Embedder::new(provider, options(64, 5));

        let err = embedder
            .embed_texts(&texts(3), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Misaligned { sent: 3, received: 2 }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let provider = Arc::new(FakeProvider::new(8));
        let embedder = Embedder::new(provider.clone(), options(2, 0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = embedder.embed_texts(&texts(6), &cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let provider = Arc::new(FakeProvider::new(8));
        let embedder = Embedder::new(provider.clone(), options(2, 0));
        let vectors = embedder
            .embed_texts(&[], &CancellationToken::new())
            .await
            .unwrap();
        assert!(vectors.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embed_query() {
        let provider = Arc::new(FakeProvider::new(4));
        let embedder = Embedder::new(provider, options(8, 0));
        let v = embedder.embed_query("hello").await.unwrap();
        assert_eq!(v, FakeProvider::vector_for("hello", 4));
    }
}
