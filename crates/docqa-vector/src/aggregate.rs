use std::collections::{HashMap, HashSet};

use docqa_core::config::RetrievalConfig;
use docqa_core::types::truncate_with_marker;
use docqa_core::{ScoredDocument, SourceGroup};

pub const TRUNCATION_MARKER: &str = " (truncated)";
const UNKNOWN_SOURCE: &str = "unknown";

/// Collapses ranked documents into one [`SourceGroup`] per source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAggregator {
    /// Documents scoring below this are left out before grouping.
    pub min_score: f32,
    pub max_sources: usize,
    /// Ceiling for `merged_content`, marker included.
    pub merged_char_limit: usize,
}

impl SourceAggregator {
    pub fn new(min_score: f32, max_sources: usize, merged_char_limit: usize) -> Self {
        Self { min_score, max_sources, merged_char_limit }
    }

    pub fn from_config(cfg: &RetrievalConfig) -> Self {
        Self::new(cfg.similarity_threshold, cfg.max_sources, cfg.merged_char_limit)
    }

    pub fn aggregate(&self, ranked: Vec<ScoredDocument>) -> Vec<SourceGroup> {
        let mut seen_ids = HashSet::new();
        let mut slots: HashMap<String, usize> = HashMap::new();
        let mut buckets: Vec<(String, Vec<ScoredDocument>)> = Vec::new();

        for scored in ranked {
            if scored.score < self.min_score || !seen_ids.insert(scored.document.id.clone()) {
                continue;
            }
            let source = match scored.document.source.trim() {
                "" => UNKNOWN_SOURCE.to_string(),
                s => s.to_string(),
            };
            let slot = *slots.entry(source.clone()).or_insert_with(|| {
                buckets.push((source, Vec::new()));
                buckets.len() - 1
            });
            buckets[slot].1.push(scored);
        }

        let mut groups: Vec<SourceGroup> = buckets.into_iter().map(|(id, docs)| self.build_group(id, docs)).collect();
        groups.sort_by(|a, b| b.average_score.total_cmp(&a.average_score));
        groups.truncate(self.max_sources);
        groups
    }

    fn build_group(&self, source_id: String, mut documents: Vec<ScoredDocument>) -> SourceGroup {
        documents.sort_by(|a, b| b.score.total_cmp(&a.score));

        let merged = documents
            .iter()
            .map(|d| d.document.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let merged_content = truncate_with_marker(&merged, self.merged_char_limit, TRUNCATION_MARKER);

        let mut titles: Vec<String> = Vec::new();
        for d in &documents {
            let title = d.document.title.trim();
            if !title.is_empty() && !titles.iter().any(|t| t == title) {
                titles.push(title.to_string());
            }
        }

        #[allow(clippy::cast_precision_loss)]
        let average_score = documents.iter().map(|d| d.score).sum::<f32>() / documents.len().max(1) as f32;
        SourceGroup { source_id, documents, merged_content, titles, average_score }
    }
}
