//! Domain types shared by the embedding, retrieval and generation stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

pub type DocumentId = String;
pub type TaskId = String;

/// A stored document row.
///
/// - `source`: logical grouping key (one uploaded file maps to one source)
/// - `embedding`: attached after ingestion; when present its length is the
///   process-wide dimensionality of the active embedding provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub content: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    pub fn new(
        id: impl Into<DocumentId>,
        title: impl Into<String>,
        content: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            source: source.into(),
            embedding: None,
        }
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|v| !v.is_empty())
    }

    /// Text submitted to the embedding provider during ingestion: title and
    /// content joined by a space, clipped to `max_chars` characters.
    pub fn embedding_text(&self, max_chars: usize) -> String {
        let joined = format!("{} {}", self.title, self.content);
        clip_chars(&joined, max_chars).to_string()
    }
}

/// A validated embedding: non-empty with finite components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn try_new(values: Vec<f32>) -> Result<Self, IndexError> {
        if values.is_empty() {
            return Err(IndexError::InvalidVector("empty vector".to_string()));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(IndexError::InvalidVector(format!("non-finite component at {pos}")));
        }
        Ok(Self(values))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = IndexError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::try_new(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(e: Embedding) -> Self {
        e.0
    }
}

impl AsRef<[f32]> for Embedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// One ranked hit from the similarity index. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub document_id: DocumentId,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Documents sharing one `source`, built fresh for every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceGroup {
    pub source_id: String,
    /// Members ordered by descending per-document score.
    pub documents: Vec<ScoredDocument>,
    pub merged_content: String,
    pub titles: Vec<String>,
    pub average_score: f32,
}

impl SourceGroup {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Character ceilings for the context section of a prompt.
///
/// `per_item_char_limit * max_items` may exceed `total_char_limit`; packing
/// enforces whichever bound is tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub total_char_limit: usize,
    pub per_item_char_limit: usize,
    pub max_items: usize,
    /// Smallest content slice worth keeping when the last source is clipped.
    pub min_slice_chars: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self { total_char_limit: 15_000, per_item_char_limit: 2_000, max_items: 5, min_slice_chars: 200 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Live state of one batch embedding job, as seen by pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub task_id: TaskId,
    pub total: usize,
    pub processed: usize,
    /// Items that produced a vector; `processed - embedded` failed.
    pub embedded: usize,
    pub percentage: u8,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressState {
    pub fn new(task_id: impl Into<TaskId>, total: usize) -> Self {
        Self {
            task_id: task_id.into(),
            total,
            processed: 0,
            embedded: 0,
            percentage: 0,
            status: JobStatus::Pending,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
    }

    pub fn record_progress(&mut self, processed: usize, total: usize) {
        self.total = total;
        self.processed = processed.min(total);
        self.percentage = percentage(self.processed, total);
    }

    pub fn complete(&mut self, embedded: usize) {
        self.processed = self.total;
        self.embedded = embedded;
        self.percentage = 100;
        self.status = JobStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }
}

fn percentage(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    // processed <= total, so the quotient fits in 0..=100
    u8::try_from(processed * 100 / total).unwrap_or(100)
}

/// How much of the store (or of one source) already carries embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingCoverage {
    pub total: usize,
    pub with_embedding: usize,
    pub without_embedding: usize,
    pub percentage: f64,
}

impl EmbeddingCoverage {
    pub fn from_counts(total: usize, with_embedding: usize) -> Self {
        let percentage = if total == 0 {
            0.0
        } else {
            let raw = with_embedding as f64 / total as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };
        Self { total, with_embedding, without_embedding: total.saturating_sub(with_embedding), percentage }
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Clip `text` so that the result, marker included, holds at most `max_chars`
/// characters. Text that already fits is returned unchanged.
pub fn truncate_with_marker(text: &str, max_chars: usize, marker: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = marker.chars().count();
    if max_chars <= marker_len {
        return clip_chars(text, max_chars).to_string();
    }
    let mut out = clip_chars(text, max_chars - marker_len).to_string();
    out.push_str(marker);
    out
}
