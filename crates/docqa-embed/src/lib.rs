//! Embedding side of the pipeline: a guarded gateway over one provider, a
//! bounded worker pool for batches, and the job registry that tracks
//! long-running ingestion.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use docqa_core::config::{EmbeddingBackend, EmbeddingConfig};
use docqa_core::EmbeddingProvider;
use tracing::info;

pub mod batch;
pub mod gateway;
pub mod jobs;
pub mod providers;

pub use batch::{BatchEmbedder, CancelToken, ProgressSink};
pub use gateway::EmbeddingGateway;
pub use jobs::{EmbeddingJobs, JobRegistry};
pub use providers::{HashingEmbedder, OllamaEmbedder, OpenAiEmbedder};

/// Dimensionality used by the hashing embedder when none is configured.
pub const DEFAULT_HASHING_DIM: usize = 384;

/// Build the provider selected in configuration.
pub fn embedding_provider_from_config(cfg: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match cfg.provider {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(cfg.base_url(), cfg.model())?),
        EmbeddingBackend::OpenAi => {
            let key = cfg
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .ok_or_else(|| anyhow!("embedding.api_key (or OPENAI_API_KEY) is required for the openai provider"))?;
            Arc::new(OpenAiEmbedder::new(&key, cfg.base_url(), cfg.model(), cfg.dimensions)?)
        }
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(cfg.dimensions.unwrap_or(DEFAULT_HASHING_DIM))),
    };
    info!(embedder = provider.embedder_id(), "embedding provider ready");
    Ok(provider)
}
