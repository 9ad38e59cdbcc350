use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use docqa_core::{Embedding, RetryPolicy};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::gateway::EmbeddingGateway;

/// Receives `(processed, total)` after every finished item.
pub type ProgressSink = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Stop flag for one batch. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop handing out new items. Calls already in flight still finish.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Embeds many texts through a fixed pool of worker tasks.
///
/// Workers claim the next unprocessed index from a shared cursor, so the pool
/// never grows past `max_workers` and results land at their original index no
/// matter which worker finishes first.
pub struct BatchEmbedder {
    gateway: Arc<EmbeddingGateway>,
    retry: RetryPolicy,
}

impl BatchEmbedder {
    pub fn new(gateway: Arc<EmbeddingGateway>, retry: RetryPolicy) -> Self {
        Self { gateway, retry }
    }

    pub fn gateway(&self) -> &Arc<EmbeddingGateway> {
        &self.gateway
    }

    /// One slot per input; a failed item is `None`.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        max_workers: usize,
        progress: Option<ProgressSink>,
    ) -> Vec<Option<Embedding>> {
        self.embed_batch_cancellable(texts, max_workers, progress, &CancelToken::new()).await
    }

    /// Like [`embed_batch`](Self::embed_batch), but stops scheduling once
    /// `cancel` fires. Items never scheduled stay `None`.
    pub async fn embed_batch_cancellable(
        &self,
        texts: &[String],
        max_workers: usize,
        progress: Option<ProgressSink>,
        cancel: &CancelToken,
    ) -> Vec<Option<Embedding>> {
        let total = texts.len();
        let mut results: Vec<Option<Embedding>> = vec![None; total];
        if total == 0 {
            return results;
        }

        let workers = max_workers.clamp(1, total);
        let texts = Arc::new(texts.to_vec());
        let cursor = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel(workers * 2);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let texts = Arc::clone(&texts);
            let cursor = Arc::clone(&cursor);
            let cancel = cancel.clone();
            let gateway = Arc::clone(&self.gateway);
            let retry = self.retry;
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        debug!(worker, "batch cancelled, worker stopping");
                        break;
                    }
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(text) = texts.get(index) else { break };
                    let outcome = gateway.embed_with_policy(text, &retry).await;
                    if tx.send((index, outcome)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut processed = 0usize;
        while let Some((index, outcome)) = rx.recv().await {
            processed += 1;
            match outcome {
                Ok(vector) => results[index] = Some(vector),
                Err(err) => warn!(index, error = %err, "embedding failed, leaving slot empty"),
            }
            if let Some(sink) = &progress {
                sink(processed, total);
            }
        }

        for joined in futures::future::join_all(handles).await {
            if let Err(err) = joined {
                warn!(error = %err, "embedding worker ended abnormally");
            }
        }
        results
    }
}
