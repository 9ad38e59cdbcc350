//! The question-answering flow: embed the question, rank stored vectors,
//! group hits per source, pack the best sources into a prompt and ask the
//! generation provider.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use docqa_core::config::RagConfig;
use docqa_core::{
    DocumentStore, GenerationError, GenerationProvider, RetryPolicy, ScoredDocument, SourceGroup,
};
use docqa_embed::EmbeddingGateway;
use docqa_text::RelevanceFilter;
use docqa_vector::{SimilarityIndex, SourceAggregator};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::answer::AnswerGateway;
use crate::packer::ContextPacker;
use crate::prompt::{build_system_prompt, NOT_FOUND_TEXT};

/// Sources quoted verbatim when generation fails.
const DEGRADED_SOURCES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalPath {
    Vector,
    /// Embeddings were unavailable; documents were ranked by keyword overlap.
    Keyword,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub groups: Vec<SourceGroup>,
    pub path: RetrievalPath,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub source: String,
    pub titles: Vec<String>,
    pub score: f32,
}

impl From<&SourceGroup> for SourceSummary {
    fn from(group: &SourceGroup) -> Self {
        Self { source: group.source_id.clone(), titles: group.titles.clone(), score: group.average_score }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Generated,
    /// Retrieval found nothing; generation was skipped.
    NotFound,
    /// Generation is disabled; the best source's content is returned.
    Retrieved,
    /// Generation failed after retries; the answer quotes raw excerpts.
    Degraded { error: GenerationError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,
    pub sources: Vec<SourceSummary>,
}

impl Answer {
    fn not_found() -> Self {
        Self { text: NOT_FOUND_TEXT.to_string(), outcome: AnswerOutcome::NotFound, sources: Vec::new() }
    }
}

pub struct RagEngine {
    store: Arc<dyn DocumentStore>,
    embeddings: Arc<EmbeddingGateway>,
    embed_retry: RetryPolicy,
    index: SimilarityIndex,
    aggregator: SourceAggregator,
    relevance: RelevanceFilter,
    packer: ContextPacker,
    answers: Option<AnswerGateway>,
    system_prompt: String,
}

impl RagEngine {
    /// `generator` is ignored when `generation.enabled` is false.
    pub fn from_config(
        cfg: &RagConfig,
        store: Arc<dyn DocumentStore>,
        embeddings: Arc<EmbeddingGateway>,
        generator: Option<Arc<dyn GenerationProvider>>,
    ) -> Result<Self> {
        cfg.validate()?;
        let answers = generator
            .filter(|_| cfg.generation.enabled)
            .map(|provider| AnswerGateway::from_config(provider, &cfg.generation));
        Ok(Self {
            store,
            embeddings,
            embed_retry: cfg.embedding.retry_policy(),
            index: SimilarityIndex::from_config(&cfg.retrieval),
            aggregator: SourceAggregator::from_config(&cfg.retrieval),
            relevance: RelevanceFilter::new()?,
            packer: ContextPacker::new(cfg.context.budget()),
            answers,
            system_prompt: build_system_prompt(&cfg.persona),
        })
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Ranked source groups for `question`. Falls back to keyword ranking
    /// over all documents when no vectors are stored or the question cannot
    /// be embedded.
    pub async fn retrieve(&self, question: &str) -> Result<Retrieval> {
        let candidates = self.store.documents_with_embeddings()?;
        if candidates.is_empty() {
            info!("no stored embeddings, using keyword ranking");
            return self.keyword_retrieve(question);
        }

        let query = match self.embeddings.embed_with_policy(question, &self.embed_retry).await {
            Ok(query) => query,
            Err(err) => {
                warn!(error = %err, "question embedding failed, using keyword ranking");
                return self.keyword_retrieve(question);
            }
        };

        let hits = self.index.search(&query, &candidates);
        debug!(candidates = candidates.len(), hits = hits.len(), "vector search done");
        let ids: Vec<_> = hits.iter().map(|h| h.document_id.clone()).collect();
        let mut docs: HashMap<_, _> =
            self.store.documents_by_ids(&ids)?.into_iter().map(|d| (d.id.clone(), d)).collect();
        let ranked: Vec<ScoredDocument> = hits
            .iter()
            .filter_map(|h| docs.remove(&h.document_id).map(|document| ScoredDocument { document, score: h.score }))
            .collect();

        Ok(Retrieval { groups: self.aggregator.aggregate(ranked), path: RetrievalPath::Vector })
    }

    fn keyword_retrieve(&self, question: &str) -> Result<Retrieval> {
        let all = self.store.all_documents()?;
        let keywords = self.relevance.keywords(question);
        let best_possible = (keywords.len().max(1) * 4) as f32;
        let picked = self.relevance.filter(question, all, self.packer.budget().max_items);
        let ranked: Vec<ScoredDocument> = picked
            .into_iter()
            .map(|document| {
                #[allow(clippy::cast_precision_loss)]
                let score = self.relevance.score(&keywords, &document) as f32 / best_possible;
                ScoredDocument { document, score }
            })
            .collect();
        // keyword scores are not similarities; keep every picked document
        let aggregator = SourceAggregator { min_score: f32::MIN, ..self.aggregator.clone() };
        Ok(Retrieval { groups: aggregator.aggregate(ranked), path: RetrievalPath::Keyword })
    }

    pub async fn ask(&self, question: &str) -> Result<Answer> {
        if question.trim().is_empty() {
            return Ok(Answer::not_found());
        }
        let retrieval = self.retrieve(question).await?;
        if retrieval.groups.is_empty() {
            info!("nothing relevant retrieved");
            return Ok(Answer::not_found());
        }

        let retrieved = retrieval.groups.len();
        let max_items = self.packer.budget().max_items;
        let ranked = self.relevance.filter(question, retrieval.groups, max_items);
        let packed = self.packer.pack(&ranked);
        if packed.is_empty() {
            return Ok(Answer::not_found());
        }
        let sources: Vec<SourceSummary> = packed.iter().map(SourceSummary::from).collect();
        info!(path = ?retrieval.path, retrieved, packed = packed.len(), "context assembled");

        let Some(answers) = &self.answers else {
            let text = packed[0].merged_content.clone();
            return Ok(Answer { text, outcome: AnswerOutcome::Retrieved, sources });
        };

        let context = self.packer.render(&packed, retrieved);
        match answers.generate(&self.system_prompt, &context, question).await {
            Ok(text) => Ok(Answer { text, outcome: AnswerOutcome::Generated, sources }),
            Err(error) => {
                warn!(error = %error, "generation failed, answering with raw excerpts");
                Ok(Answer { text: degraded_text(&packed), outcome: AnswerOutcome::Degraded { error }, sources })
            }
        }
    }
}

fn degraded_text(packed: &[SourceGroup]) -> String {
    packed
        .iter()
        .take(DEGRADED_SOURCES)
        .map(|g| format!("[Source: {}]\n{}", g.source_id, g.merged_content))
        .collect::<Vec<_>>()
        .join("\n\n")
}
