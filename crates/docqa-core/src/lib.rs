#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

//! Shared data model, error taxonomy and provider traits for the docqa
//! retrieval pipeline.

pub mod config;
pub mod data_processor;
pub mod error;
pub mod retry;
pub mod traits;
pub mod types;
pub mod vector_math;

pub use error::{
    EmbeddingError, EmbeddingErrorKind, Error, GenerationError, GenerationErrorKind, IndexError,
    Result,
};
pub use retry::{Backoff, RetryPolicy};
pub use traits::{DocumentStore, EmbeddingProvider, GenerationProvider, GenerationRequest};
pub use types::{
    ContextBudget, Document, DocumentId, Embedding, EmbeddingCoverage, JobStatus, ProgressState,
    ScoredDocument, SimilarityMatch, SourceGroup, TaskId,
};
pub use vector_math::cosine_similarity;
