use docqa_core::config::RetrievalConfig;
use docqa_core::vector_math::{cosine_similarity, validate_vector};
use docqa_core::{DocumentId, Embedding, SimilarityMatch};
use tracing::debug;

/// Exhaustive cosine ranking. Scores below `threshold` are dropped, the rest
/// sorted descending (ties keep candidate order) and cut to `top_k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityIndex {
    pub top_k: usize,
    pub threshold: f32,
}

impl SimilarityIndex {
    pub fn new(top_k: usize, threshold: f32) -> Self {
        Self { top_k, threshold }
    }

    pub fn from_config(cfg: &RetrievalConfig) -> Self {
        Self::new(cfg.top_k, cfg.similarity_threshold)
    }

    pub fn search(&self, query: &Embedding, candidates: &[(DocumentId, Vec<f32>)]) -> Vec<SimilarityMatch> {
        let dim = query.dim();
        let mut matches: Vec<SimilarityMatch> = candidates
            .iter()
            .filter_map(|(id, vector)| {
                if let Err(err) = validate_vector(vector, dim) {
                    debug!(document_id = %id, error = %err, "skipping candidate vector");
                    return None;
                }
                let score = cosine_similarity(query.as_slice(), vector);
                (score >= self.threshold).then(|| SimilarityMatch { document_id: id.clone(), score })
            })
            .collect();
        // sort_by is stable, so equal scores keep candidate order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(self.top_k);
        matches
    }
}
