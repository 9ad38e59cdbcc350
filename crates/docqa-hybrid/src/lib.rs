//! Question answering on top of the retrieval crates: context packing,
//! prompt assembly, the generation gateway and the engine wiring them up.

pub mod answer;
pub mod engine;
pub mod packer;
pub mod prompt;
pub mod providers;

pub use answer::AnswerGateway;
pub use engine::{Answer, AnswerOutcome, RagEngine, Retrieval, RetrievalPath, SourceSummary};
pub use packer::ContextPacker;
pub use providers::{generation_provider_from_config, AnthropicProvider, GeminiProvider, OpenAiProvider};
