use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::{Document, DocumentStore, EmbeddingError, EmbeddingErrorKind, EmbeddingProvider, JobStatus, RetryPolicy};
use docqa_embed::{BatchEmbedder, CancelToken, EmbeddingGateway, EmbeddingJobs, HashingEmbedder, JobRegistry, OllamaEmbedder, OpenAiEmbedder};
use docqa_vector::MemoryDocumentStore;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Fails the first `failures` calls for every text, then returns `[len, 1.0]`.
struct Flaky {
    failures: usize,
    calls: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl EmbeddingProvider for Flaky {
    fn embedder_id(&self) -> &str {
        "flaky"
    }

    async fn embed(&self, text: &str, _timeout: Duration) -> Result<Vec<f32>, EmbeddingError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(text.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        if n <= self.failures {
            return Err(EmbeddingError::connection(format!("refused (call {n})")));
        }
        Ok(vec![text.len() as f32, 1.0])
    }
}

/// Sleeps longer for earlier items so completions arrive in reverse order.
/// Texts starting with "bad" always fail.
struct Staggered {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for Staggered {
    fn embedder_id(&self) -> &str {
        "staggered"
    }

    async fn embed(&self, text: &str, _timeout: Duration) -> Result<Vec<f32>, EmbeddingError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let n: u64 = text.trim_start_matches(|c: char| !c.is_ascii_digit()).parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(60u64.saturating_sub(n * 10))).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if text.starts_with("bad") {
            return Err(EmbeddingError::invalid_response("HTTP 500"));
        }
        Ok(vec![n as f32, 1.0])
    }
}

fn staggered() -> Arc<Staggered> {
    Arc::new(Staggered { in_flight: AtomicUsize::new(0), peak: AtomicUsize::new(0) })
}

fn gateway(provider: Arc<dyn EmbeddingProvider>) -> Arc<EmbeddingGateway> {
    Arc::new(EmbeddingGateway::new(provider, 4_000, Duration::from_secs(5)))
}

#[tokio::test]
async fn embed_with_retry_succeeds_on_third_attempt() {
    let provider = Arc::new(Flaky { failures: 2, calls: Mutex::new(HashMap::new()) });
    let gw = gateway(provider.clone());
    let v = gw.embed_with_retry("hello", 3, Duration::from_millis(5)).await.expect("third attempt wins");
    assert_eq!(v.as_slice(), &[5.0, 1.0]);
    assert_eq!(provider.calls.lock().unwrap()["hello"], 3);
}

#[tokio::test]
async fn embed_with_retry_returns_last_failure() {
    let provider = Arc::new(Flaky { failures: 5, calls: Mutex::new(HashMap::new()) });
    let gw = gateway(provider.clone());
    let err = gw.embed_with_retry("hello", 3, Duration::from_millis(1)).await.unwrap_err();
    assert_eq!(err.kind(), EmbeddingErrorKind::Connection);
    assert!(err.message.contains("call 3"), "last failure surfaces: {err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn batch_preserves_order_and_length_despite_delays() {
    let provider = staggered();
    let embedder = BatchEmbedder::new(gateway(provider.clone()), RetryPolicy::none());
    let texts: Vec<String> = (0..6).map(|i| format!("item {i}")).collect();

    let out = embedder.embed_batch(&texts, 3, None).await;

    assert_eq!(out.len(), texts.len());
    for (i, slot) in out.iter().enumerate() {
        assert_eq!(slot.as_ref().map(|v| v.as_slice()[0]), Some(i as f32), "slot {i}");
    }
    assert!(provider.peak.load(Ordering::SeqCst) <= 3, "pool never exceeds max_workers");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_items_leave_none_and_progress_is_reported() {
    let embedder = BatchEmbedder::new(gateway(staggered()), RetryPolicy::fixed(2, Duration::from_millis(1)));
    let texts = vec!["ok 1".to_string(), "bad 2".to_string(), "ok 3".to_string()];
    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let updates = Arc::clone(&updates);
        Arc::new(move |processed: usize, total: usize| updates.lock().unwrap().push((processed, total)))
    };

    let out = embedder.embed_batch(&texts, 8, Some(sink)).await;

    assert!(out[0].is_some());
    assert!(out[1].is_none(), "failure is absorbed at its own index");
    assert!(out[2].is_some());
    assert_eq!(*updates.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
}

#[tokio::test]
async fn empty_batch_is_empty() {
    let embedder = BatchEmbedder::new(gateway(staggered()), RetryPolicy::none());
    assert!(embedder.embed_batch(&[], 4, None).await.is_empty());
}

#[tokio::test]
async fn cancelled_batch_schedules_nothing() {
    let provider = staggered();
    let embedder = BatchEmbedder::new(gateway(provider.clone()), RetryPolicy::none());
    let cancel = CancelToken::new();
    cancel.cancel();
    let out = embedder.embed_batch_cancellable(&["a 1".to_string(), "a 2".to_string()], 2, None, &cancel).await;
    assert_eq!(out, vec![None, None]);
    assert_eq!(provider.peak.load(Ordering::SeqCst), 0);

    let out = embedder.embed_batch(&["a 1".to_string()], 1, None).await;
    assert!(out[0].is_some(), "a cancelled token does not stick to the embedder");
}

fn sample_store() -> Arc<MemoryDocumentStore> {
    let docs = vec![
        Document::new("d1", "Harvest", "apples and pears", "farm"),
        Document::new("d2", "Tools", "a rusty plough", "farm"),
        Document::new("d3", "Letters", "dear grandmother", "family"),
    ];
    Arc::new(MemoryDocumentStore::with_documents(docs))
}

fn jobs_for(store: Arc<MemoryDocumentStore>) -> EmbeddingJobs {
    let embedder = Arc::new(BatchEmbedder::new(gateway(Arc::new(HashingEmbedder::new(32))), RetryPolicy::none()));
    EmbeddingJobs::new(store, embedder, Arc::new(JobRegistry::new(Duration::from_secs(60))), 4, 2_000)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn backfill_for_one_source_commits_the_whole_batch() {
    let store = sample_store();
    let jobs = jobs_for(store.clone());

    let task_id = jobs.start_backfill(Some("farm")).unwrap().expect("work to do");
    assert!(task_id.starts_with("farm_"));

    let done = tokio::time::timeout(Duration::from_secs(5), jobs.wait_for(&task_id, Duration::from_millis(5)))
        .await
        .expect("job finishes")
        .expect("still registered");
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!((done.total, done.processed, done.embedded, done.percentage), (2, 2, 2, 100));
    assert!(done.finished_at.is_some());

    let coverage = store.coverage(None).unwrap();
    assert_eq!((coverage.with_embedding, coverage.without_embedding), (2, 1));
    assert!(jobs.start_backfill(Some("farm")).unwrap().is_none(), "nothing left for that source");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_batch_job_reports_progress_by_task_id() {
    let store = sample_store();
    let jobs = jobs_for(store.clone());

    let task_id = jobs.start_batch_job(vec![("d3".to_string(), "dear grandmother".to_string())]);
    let done = tokio::time::timeout(Duration::from_secs(5), jobs.wait_for(&task_id, Duration::from_millis(5)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(store.documents_with_embeddings().unwrap().len(), 1);
    assert!(jobs.get_progress("unknown-task").is_none());
}

async fn finished(jobs: &EmbeddingJobs, task_id: &str) -> docqa_core::ProgressState {
    tokio::time::timeout(Duration::from_secs(5), jobs.wait_for(task_id, Duration::from_millis(5)))
        .await
        .expect("job finishes")
        .expect("still registered")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_one_job_leaves_later_jobs_alone() {
    let store = sample_store();
    let embedder = Arc::new(BatchEmbedder::new(gateway(staggered()), RetryPolicy::none()));
    let jobs = EmbeddingJobs::new(store.clone(), embedder, Arc::new(JobRegistry::new(Duration::from_secs(60))), 2, 2_000);

    let first = jobs.start_batch_job(vec![
        ("d1".to_string(), "slow 0".to_string()),
        ("d2".to_string(), "slow 0".to_string()),
    ]);
    assert!(jobs.cancel(&first));
    let second = jobs.start_batch_job(vec![("d3".to_string(), "item 3".to_string())]);

    let first_state = finished(&jobs, &first).await;
    assert_eq!(first_state.status, JobStatus::Failed);
    assert_eq!(first_state.error.as_deref(), Some("cancelled"));

    let second_state = finished(&jobs, &second).await;
    assert_eq!(second_state.status, JobStatus::Completed);
    assert_eq!(second_state.embedded, 1);

    let embedded: Vec<String> = store.documents_with_embeddings().unwrap().into_iter().map(|(id, _)| id).collect();
    assert_eq!(embedded, ["d3"]);
    assert!(!jobs.cancel(&first), "finished jobs cannot be cancelled");
}

#[tokio::test]
async fn ollama_embedder_posts_model_and_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .and(body_partial_json(serde_json::json!({"model": "nomic-embed-text", "prompt": "hi there"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"embedding": [0.1, 0.2, 0.3]})))
        .expect(1)
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&server.uri(), "nomic-embed-text").unwrap();
    let v = embedder.embed("hi there", Duration::from_secs(5)).await.unwrap();
    assert_eq!(v, vec![0.1, 0.2, 0.3]);
    assert_eq!(embedder.embedder_id(), "ollama:nomic-embed-text");
}

#[tokio::test]
async fn ollama_errors_map_to_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embeddings"))
        .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&server.uri(), "nomic-embed-text").unwrap();
    let err = embedder.embed("hi", Duration::from_secs(5)).await.unwrap_err();
    assert_eq!(err.kind(), EmbeddingErrorKind::InvalidResponse);
    assert!(err.message.contains("model not loaded"));
}

#[tokio::test]
async fn ollama_slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"embedding": [1.0]}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let embedder = OllamaEmbedder::new(&server.uri(), "m").unwrap();
    let err = embedder.embed("hi", Duration::from_millis(50)).await.unwrap_err();
    assert_eq!(err.kind(), EmbeddingErrorKind::Timeout);
}

#[tokio::test]
async fn unreachable_ollama_is_a_connection_error() {
    let embedder = OllamaEmbedder::new("http://127.0.0.1:9", "m").unwrap();
    let err = embedder.embed("hi", Duration::from_secs(2)).await.unwrap_err();
    assert_eq!(err.kind(), EmbeddingErrorKind::Connection);
}

#[tokio::test]
async fn openai_embedder_sends_bearer_and_reads_first_vector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(serde_json::json!({"model": "text-embedding-3-small", "input": ["hello"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{"index": 0, "embedding": [0.5, -0.5]}]
        })))
        .mount(&server)
        .await;

    let embedder =
        OpenAiEmbedder::new("sk-test", &format!("{}/v1", server.uri()), "text-embedding-3-small", None).unwrap();
    let v = embedder.embed("hello", Duration::from_secs(5)).await.unwrap();
    assert_eq!(v, vec![0.5, -0.5]);
}

#[test]
fn provider_is_built_from_config() {
    let mut cfg = docqa_core::config::EmbeddingConfig::default();
    cfg.provider = docqa_core::config::EmbeddingBackend::Hashing;
    cfg.dimensions = Some(16);
    let provider = docqa_embed::embedding_provider_from_config(&cfg).unwrap();
    assert_eq!(provider.embedder_id(), "hashing:d16");
}
