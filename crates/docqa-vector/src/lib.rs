//! In-memory vector retrieval: brute-force cosine ranking over stored
//! document vectors, per-source aggregation of the hits, and the snapshot
//! backed document store they read from.

pub mod aggregate;
pub mod index;
pub mod store;

pub use aggregate::SourceAggregator;
pub use index::SimilarityIndex;
pub use store::MemoryDocumentStore;
