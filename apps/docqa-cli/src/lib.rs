//! Wiring shared by the `docqa` and `docqa-indexer` binaries: configuration,
//! the on-disk document snapshot and the embedding/answering stacks built on
//! top of it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use docqa_core::config::{Config, RagConfig};
use docqa_core::data_processor::DataProcessor;
use docqa_core::{Error, ProgressState};
use docqa_embed::{embedding_provider_from_config, BatchEmbedder, EmbeddingGateway, EmbeddingJobs};
use docqa_hybrid::{generation_provider_from_config, RagEngine};
use docqa_vector::MemoryDocumentStore;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

const POLL_EVERY: Duration = Duration::from_millis(200);

/// Log to stderr so answers on stdout stay clean. `RUST_LOG` overrides the
/// default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub paragraphs: usize,
    pub added: usize,
}

pub struct Workspace {
    pub rag: RagConfig,
    pub store: Arc<MemoryDocumentStore>,
    pub store_path: PathBuf,
}

impl Workspace {
    /// Load `config.toml` (plus environment overrides) and the snapshot it
    /// points at.
    pub fn open() -> Result<Self> {
        let config = Config::load().context("failed to load configuration")?;
        Self::from_rag(config.rag()?)
    }

    pub fn from_rag(rag: RagConfig) -> Result<Self> {
        rag.validate()?;
        let store_path = rag.data.store_path();
        let store = MemoryDocumentStore::load(&store_path)
            .with_context(|| format!("failed to load document snapshot {}", store_path.display()))?;
        info!(path = %store_path.display(), documents = store.len(), "document store opened");
        Ok(Self { rag, store: Arc::new(store), store_path })
    }

    pub fn save(&self) -> Result<()> {
        self.store
            .save(&self.store_path)
            .with_context(|| format!("failed to write document snapshot {}", self.store_path.display()))
    }

    /// Split every `.txt` file under `dir` into paragraph documents and add
    /// them to the store. Existing ids are replaced.
    pub fn ingest(&self, dir: &Path, limit: Option<usize>) -> Result<IngestReport> {
        let processor = DataProcessor::new();
        let docs = match limit {
            Some(n) => processor.process_directory_limited(dir, n)?,
            None => processor.process_directory(dir)?,
        };
        let paragraphs = docs.len();
        let added = self.store.add_documents(docs);
        Ok(IngestReport { paragraphs, added })
    }

    pub fn embedding_gateway(&self) -> Result<Arc<EmbeddingGateway>> {
        let provider = embedding_provider_from_config(&self.rag.embedding)?;
        Ok(Arc::new(EmbeddingGateway::from_config(provider, &self.rag.embedding)))
    }

    pub fn jobs(&self) -> Result<EmbeddingJobs> {
        let batch = Arc::new(BatchEmbedder::new(self.embedding_gateway()?, self.rag.embedding.retry_policy()));
        Ok(EmbeddingJobs::from_config(self.store.clone(), batch, &self.rag.embedding))
    }

    pub fn engine(&self) -> Result<RagEngine> {
        let generator = if self.rag.generation.enabled {
            Some(generation_provider_from_config(&self.rag.generation)?)
        } else {
            None
        };
        RagEngine::from_config(&self.rag, self.store.clone(), self.embedding_gateway()?, generator)
    }
}

/// Embed every document of `source` (or the whole store) that still lacks a
/// vector, drawing a progress bar while the job runs. `None` when there was
/// nothing to embed.
pub async fn run_backfill(jobs: &EmbeddingJobs, source: Option<&str>, show_progress: bool) -> Result<Option<ProgressState>> {
    let Some(task_id) = jobs.start_backfill(source)? else {
        return Ok(None);
    };

    let pb = if show_progress {
        let total = jobs.get_progress(&task_id).map_or(0, |s| s.total);
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} paragraphs ({percent}%) {msg}")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let state = loop {
        let state = jobs
            .get_progress(&task_id)
            .ok_or_else(|| Error::NotFound(format!("embedding job {task_id}")))?;
        pb.set_position(state.processed as u64);
        if state.is_finished() {
            break state;
        }
        tokio::time::sleep(POLL_EVERY).await;
    };
    pb.finish_with_message(format!("{:?}", state.status).to_lowercase());
    Ok(Some(state))
}
