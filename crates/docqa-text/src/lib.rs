//! docqa-text
//!
//! Keyword extraction and the keyword-overlap relevance filter used when
//! vector retrieval is unavailable, and to re-rank retrieved documents before
//! they are packed into a prompt.
pub mod keywords;
pub mod relevance;

pub use keywords::KeywordExtractor;
pub use relevance::{RelevanceFilter, Searchable};
