//! Background embedding jobs and the registry pollers read their progress from.
//!
//! A job embeds its whole batch first and only then writes the vectors back
//! through [`DocumentStore::persist_embeddings`], so searches never see a
//! half-embedded batch.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use docqa_core::config::EmbeddingConfig;
use docqa_core::{DocumentId, DocumentStore, ProgressState, TaskId};
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::{BatchEmbedder, CancelToken, ProgressSink};

/// Process-wide progress map with a fixed retention after completion.
pub struct JobRegistry {
    jobs: RwLock<HashMap<TaskId, ProgressState>>,
    retention: Duration,
}

impl JobRegistry {
    pub fn new(retention: Duration) -> Self {
        Self { jobs: RwLock::new(HashMap::new()), retention }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Register a new job. Expired jobs are reaped first so a process that
    /// never polls still keeps the map bounded.
    pub fn create(&self, task_id: &str, total: usize) -> ProgressState {
        self.reap_expired();
        let state = ProgressState::new(task_id, total);
        self.write().insert(task_id.to_string(), state.clone());
        state
    }

    pub fn mark_running(&self, task_id: &str) {
        self.modify(task_id, ProgressState::mark_running);
    }

    pub fn update(&self, task_id: &str, processed: usize, total: usize) {
        self.modify(task_id, |s| s.record_progress(processed, total));
    }

    pub fn complete(&self, task_id: &str, embedded: usize) {
        self.modify(task_id, |s| s.complete(embedded));
    }

    pub fn fail(&self, task_id: &str, error: &str) {
        self.modify(task_id, |s| s.fail(error));
    }

    /// Snapshot of a job; `None` once it is unknown or reaped.
    pub fn get(&self, task_id: &str) -> Option<ProgressState> {
        self.reap_expired();
        self.read().get(task_id).cloned()
    }

    /// Drop finished jobs older than the retention window.
    pub fn reap_expired(&self) -> usize {
        let now = Utc::now();
        let retention = self.retention;
        let mut jobs = self.write();
        let before = jobs.len();
        jobs.retain(|_, state| match state.finished_at {
            Some(finished) => (now - finished).to_std().unwrap_or(Duration::ZERO) < retention,
            None => true,
        });
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn modify(&self, task_id: &str, f: impl FnOnce(&mut ProgressState)) {
        match self.write().get_mut(task_id) {
            Some(state) => f(state),
            None => warn!(task_id, "progress update for unknown job"),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TaskId, ProgressState>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskId, ProgressState>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Starts batch embedding jobs against a document store.
pub struct EmbeddingJobs {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<BatchEmbedder>,
    registry: Arc<JobRegistry>,
    cancels: Arc<Mutex<HashMap<TaskId, CancelToken>>>,
    max_workers: usize,
    input_chars: usize,
}

impl EmbeddingJobs {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<BatchEmbedder>,
        registry: Arc<JobRegistry>,
        max_workers: usize,
        input_chars: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            registry,
            cancels: Arc::default(),
            max_workers: max_workers.max(1),
            input_chars: input_chars.max(1),
        }
    }

    pub fn from_config(store: Arc<dyn DocumentStore>, embedder: Arc<BatchEmbedder>, cfg: &EmbeddingConfig) -> Self {
        let registry = Arc::new(JobRegistry::new(cfg.job_retention()));
        Self::new(store, embedder, registry, cfg.max_workers, cfg.job_input_chars)
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Spawn a job embedding `items` (`(document id, text)` pairs) and return
    /// its task id right away. Must be called from within a Tokio runtime.
    pub fn start_batch_job(&self, items: Vec<(DocumentId, String)>) -> TaskId {
        self.spawn_job(format!("batch_{}", Uuid::new_v4()), items)
    }

    /// Embed every document still lacking a vector, optionally for one source
    /// only. `Ok(None)` when there is nothing to do.
    pub fn start_backfill(&self, source: Option<&str>) -> anyhow::Result<Option<TaskId>> {
        let pending = self.store.documents_missing_embeddings(source)?;
        if pending.is_empty() {
            info!(source = source.unwrap_or("all"), "every document already has an embedding");
            return Ok(None);
        }
        let items = pending.iter().map(|d| (d.id.clone(), d.embedding_text(self.input_chars))).collect();
        let task_id = format!("{}_{}", source.unwrap_or("all"), Uuid::new_v4());
        Ok(Some(self.spawn_job(task_id, items)))
    }

    pub fn get_progress(&self, task_id: &str) -> Option<ProgressState> {
        self.registry.get(task_id)
    }

    /// Abandon one running job: it schedules no further items and its
    /// vectors are discarded. Other jobs are unaffected. `false` when the
    /// job is unknown or already finished.
    pub fn cancel(&self, task_id: &str) -> bool {
        match lock(&self.cancels).get(task_id) {
            Some(token) => {
                token.cancel();
                info!(task_id, "embedding job cancel requested");
                true
            }
            None => false,
        }
    }

    /// Poll until the job finishes. `None` if it disappears from the registry.
    pub async fn wait_for(&self, task_id: &str, poll_every: Duration) -> Option<ProgressState> {
        loop {
            let state = self.get_progress(task_id)?;
            if state.is_finished() {
                return Some(state);
            }
            tokio::time::sleep(poll_every).await;
        }
    }

    fn spawn_job(&self, task_id: TaskId, items: Vec<(DocumentId, String)>) -> TaskId {
        self.registry.create(&task_id, items.len());
        let cancel = CancelToken::new();
        lock(&self.cancels).insert(task_id.clone(), cancel.clone());
        let job = JobRun {
            task_id: task_id.clone(),
            cancel,
            cancels: Arc::clone(&self.cancels),
            store: Arc::clone(&self.store),
            embedder: Arc::clone(&self.embedder),
            registry: Arc::clone(&self.registry),
            max_workers: self.max_workers,
        };
        tokio::spawn(job.run(items));
        task_id
    }
}

fn lock(cancels: &Mutex<HashMap<TaskId, CancelToken>>) -> MutexGuard<'_, HashMap<TaskId, CancelToken>> {
    cancels.lock().unwrap_or_else(PoisonError::into_inner)
}

struct JobRun {
    task_id: TaskId,
    cancel: CancelToken,
    cancels: Arc<Mutex<HashMap<TaskId, CancelToken>>>,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<BatchEmbedder>,
    registry: Arc<JobRegistry>,
    max_workers: usize,
}

impl JobRun {
    async fn run(self, items: Vec<(DocumentId, String)>) {
        let outcome = self.execute(items).await;
        // Unregister before publishing the final state so a finished job is never cancellable.
        lock(&self.cancels).remove(&self.task_id);
        match outcome {
            Ok(embedded) => self.registry.complete(&self.task_id, embedded),
            Err(reason) => self.registry.fail(&self.task_id, &reason),
        }
    }

    async fn execute(&self, items: Vec<(DocumentId, String)>) -> Result<usize, String> {
        let total = items.len();
        let workers = self.max_workers.min(total.max(1));
        info!(task_id = %self.task_id, total, workers, "embedding job started");
        self.registry.mark_running(&self.task_id);

        let (ids, texts): (Vec<DocumentId>, Vec<String>) = items.into_iter().unzip();
        let sink: ProgressSink = {
            let registry = Arc::clone(&self.registry);
            let task_id = self.task_id.clone();
            Arc::new(move |processed, total| registry.update(&task_id, processed, total))
        };
        let vectors = self.embedder.embed_batch_cancellable(&texts, workers, Some(sink), &self.cancel).await;

        if self.cancel.is_cancelled() {
            warn!(task_id = %self.task_id, "embedding job cancelled, discarding results");
            return Err("cancelled".to_string());
        }

        let batch: Vec<_> = ids.into_iter().zip(vectors).filter_map(|(id, v)| v.map(|v| (id, v))).collect();
        match self.store.persist_embeddings(&batch) {
            Ok(embedded) => {
                info!(task_id = %self.task_id, total, embedded, failed = total - embedded, "embedding job finished");
                Ok(embedded)
            }
            Err(err) => {
                warn!(task_id = %self.task_id, error = %err, "storing embeddings failed");
                Err(err.to_string())
            }
        }
    }
}
