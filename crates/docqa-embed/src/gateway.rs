use std::sync::Arc;
use std::time::Duration;

use docqa_core::config::EmbeddingConfig;
use docqa_core::types::clip_chars;
use docqa_core::{Embedding, EmbeddingError, EmbeddingProvider, RetryPolicy};
use tracing::debug;

/// Single entry point for turning text into a validated [`Embedding`].
///
/// Inputs are clipped to `max_input_chars` characters, every provider call is
/// bounded by `timeout`, and nothing but an [`EmbeddingError`] ever leaves this
/// type.
pub struct EmbeddingGateway {
    provider: Arc<dyn EmbeddingProvider>,
    max_input_chars: usize,
    timeout: Duration,
}

impl EmbeddingGateway {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, max_input_chars: usize, timeout: Duration) -> Self {
        Self { provider, max_input_chars: max_input_chars.max(1), timeout }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, cfg: &EmbeddingConfig) -> Self {
        Self::new(provider, cfg.max_input_chars, cfg.timeout())
    }

    pub fn embedder_id(&self) -> &str {
        self.provider.embedder_id()
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::invalid_response("empty input text"));
        }
        let clipped = clip_chars(text, self.max_input_chars);
        let raw = match tokio::time::timeout(self.timeout, self.provider.embed(clipped, self.timeout)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(EmbeddingError::timeout(format!(
                    "no response within {}ms",
                    self.timeout.as_millis()
                )))
            }
        };
        Embedding::try_new(raw).map_err(|e| EmbeddingError::invalid_response(e.to_string()))
    }

    /// Up to `max_attempts` calls to [`embed`](Self::embed), `delay` apart.
    /// Returns the first success or the last failure.
    pub async fn embed_with_retry(
        &self,
        text: &str,
        max_attempts: usize,
        delay: Duration,
    ) -> Result<Embedding, EmbeddingError> {
        self.embed_with_policy(text, &RetryPolicy::fixed(max_attempts, delay)).await
    }

    pub async fn embed_with_policy(&self, text: &str, policy: &RetryPolicy) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            // retrying cannot make blank input embeddable
            return self.embed(text).await;
        }
        policy
            .run(
                |attempt| {
                    debug!(attempt, embedder = self.embedder_id(), "embedding text");
                    self.embed(text)
                },
                |_| true,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records what it was asked to embed.
    struct Recorder {
        seen: Mutex<Vec<String>>,
        reply: Vec<f32>,
    }

    #[async_trait]
    impl EmbeddingProvider for Recorder {
        fn embedder_id(&self) -> &str {
            "recorder"
        }

        async fn embed(&self, text: &str, _timeout: Duration) -> Result<Vec<f32>, EmbeddingError> {
            self.seen.lock().unwrap().push(text.to_string());
            Ok(self.reply.clone())
        }
    }

    struct Sleeper;

    #[async_trait]
    impl EmbeddingProvider for Sleeper {
        fn embedder_id(&self) -> &str {
            "sleeper"
        }

        async fn embed(&self, _text: &str, _timeout: Duration) -> Result<Vec<f32>, EmbeddingError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0])
        }
    }

    fn recorder(reply: Vec<f32>) -> Arc<Recorder> {
        Arc::new(Recorder { seen: Mutex::new(Vec::new()), reply })
    }

    #[tokio::test]
    async fn long_input_is_clipped_not_rejected() {
        let provider = recorder(vec![0.1, 0.2]);
        let gateway = EmbeddingGateway::new(provider.clone(), 5, Duration::from_secs(1));
        let out = gateway.embed("abcdefghij").await.expect("embeds");
        assert_eq!(out.dim(), 2);
        assert_eq!(provider.seen.lock().unwrap().as_slice(), ["abcde"]);
    }

    #[tokio::test]
    async fn blank_input_never_reaches_the_provider() {
        let provider = recorder(vec![0.1]);
        let gateway = EmbeddingGateway::new(provider.clone(), 100, Duration::from_secs(1));
        let err = gateway.embed_with_retry("  \n ", 3, Duration::from_millis(1)).await.unwrap_err();
        assert_eq!(err.kind(), docqa_core::EmbeddingErrorKind::InvalidResponse);
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_finite_vectors_are_invalid_responses() {
        let gateway = EmbeddingGateway::new(recorder(vec![f32::NAN]), 100, Duration::from_secs(1));
        let err = gateway.embed("hello").await.unwrap_err();
        assert_eq!(err.kind(), docqa_core::EmbeddingErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let gateway = EmbeddingGateway::new(Arc::new(Sleeper), 100, Duration::from_millis(20));
        let err = gateway.embed("hello").await.unwrap_err();
        assert_eq!(err.kind(), docqa_core::EmbeddingErrorKind::Timeout);
    }
}
