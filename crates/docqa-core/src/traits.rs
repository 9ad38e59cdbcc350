use std::time::Duration;

use async_trait::async_trait;

use crate::error::{EmbeddingError, GenerationError};
use crate::types::{Document, DocumentId, Embedding, EmbeddingCoverage};

/// Turns text into a vector. Implementations call a local model or a
/// remote API and must honour `timeout` for the outbound request.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `ollama:nomic-embed-text`).
    fn embedder_id(&self) -> &str;
    async fn embed(&self, text: &str, timeout: Duration) -> Result<Vec<f32>, EmbeddingError>;
}

/// Everything a generative-text backend needs for one answer.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system_prompt: String,
    /// Context plus question, already assembled.
    pub prompt: String,
    pub max_output_tokens: usize,
    pub temperature: f32,
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn provider_id(&self) -> &str;
    /// Rate-limit and quota responses must come back as
    /// `GenerationErrorKind::RateLimited` so callers can retry them.
    async fn generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String, GenerationError>;
}

/// Read/write surface of the document store. The store is owned outside the
/// retrieval core; readers must never observe a half-applied embedding batch.
pub trait DocumentStore: Send + Sync {
    /// `(id, raw vector)` for every document carrying an embedding. Vectors are
    /// not validated here; the similarity index skips malformed ones.
    fn documents_with_embeddings(&self) -> anyhow::Result<Vec<(DocumentId, Vec<f32>)>>;
    /// Documents for the given ids; unknown ids are ignored.
    fn documents_by_ids(&self, ids: &[DocumentId]) -> anyhow::Result<Vec<Document>>;
    fn all_documents(&self) -> anyhow::Result<Vec<Document>>;
    fn documents_missing_embeddings(&self, source: Option<&str>) -> anyhow::Result<Vec<Document>>;
    fn persist_embedding(&self, id: &str, vector: &Embedding) -> anyhow::Result<()>;

    /// Attach a whole batch of vectors. Implementations backed by shared
    /// memory override this to apply the batch under one write.
    fn persist_embeddings(&self, batch: &[(DocumentId, Embedding)]) -> anyhow::Result<usize> {
        for (id, vector) in batch {
            self.persist_embedding(id, vector)?;
        }
        Ok(batch.len())
    }

    fn coverage(&self, source: Option<&str>) -> anyhow::Result<EmbeddingCoverage> {
        let docs = self.all_documents()?;
        let in_scope: Vec<&Document> =
            docs.iter().filter(|d| source.map_or(true, |s| d.source == s)).collect();
        let with = in_scope.iter().filter(|d| d.has_embedding()).count();
        Ok(EmbeddingCoverage::from_counts(in_scope.len(), with))
    }
}
