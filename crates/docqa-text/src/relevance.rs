use std::borrow::Cow;

use anyhow::Result;
use docqa_core::{Document, ScoredDocument, SourceGroup};
use tracing::debug;

use crate::keywords::KeywordExtractor;

const TITLE_WEIGHT: u32 = 3;
const CONTENT_WEIGHT: u32 = 1;
/// Only the first few keywords of a question take part in scoring.
pub const MAX_KEYWORDS: usize = 5;

/// Anything with a title and a body the filter can match keywords against.
pub trait Searchable {
    fn title(&self) -> Cow<'_, str>;
    fn body(&self) -> &str;
}

impl Searchable for Document {
    fn title(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.title)
    }

    fn body(&self) -> &str {
        &self.content
    }
}

impl Searchable for ScoredDocument {
    fn title(&self) -> Cow<'_, str> {
        self.document.title()
    }

    fn body(&self) -> &str {
        self.document.body()
    }
}

impl Searchable for SourceGroup {
    fn title(&self) -> Cow<'_, str> {
        Cow::Owned(self.titles.join(" "))
    }

    fn body(&self) -> &str {
        &self.merged_content
    }
}

/// Keyword-overlap ranking: 3 points per keyword found in the title, 1 per
/// keyword found in the body.
pub struct RelevanceFilter {
    keywords: KeywordExtractor,
}

impl RelevanceFilter {
    pub fn new() -> Result<Self> {
        Ok(Self { keywords: KeywordExtractor::new()? })
    }

    pub fn keywords(&self, question: &str) -> Vec<String> {
        let mut kws = self.keywords.extract(question);
        kws.truncate(MAX_KEYWORDS);
        kws
    }

    pub fn score<T: Searchable>(&self, keywords: &[String], item: &T) -> u32 {
        let title = item.title().to_lowercase();
        let body = item.body().to_lowercase();
        keywords
            .iter()
            .map(|kw| {
                let mut s = 0;
                if title.contains(kw.as_str()) {
                    s += TITLE_WEIGHT;
                }
                if body.contains(kw.as_str()) {
                    s += CONTENT_WEIGHT;
                }
                s
            })
            .sum()
    }

    /// At most `max_docs` items, best keyword overlap first; equal scores keep
    /// input order. With no overlap at all this is just the first `max_docs`
    /// items, so a non-empty input never yields an empty result.
    pub fn filter<T: Searchable>(&self, question: &str, items: Vec<T>, max_docs: usize) -> Vec<T> {
        let keywords = self.keywords(question);
        if keywords.is_empty() {
            debug!("no usable keywords, keeping input order");
            return items.into_iter().take(max_docs).collect();
        }
        let mut scored: Vec<(u32, T)> = items.into_iter().map(|item| (self.score(&keywords, &item), item)).collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!(keywords = ?keywords, best = scored.first().map_or(0, |s| s.0), "keyword relevance ranked");
        scored.into_iter().take(max_docs).map(|(_, item)| item).collect()
    }
}
