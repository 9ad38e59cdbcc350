//! Embedding providers. Remote ones share the reqwest error mapping below.

use docqa_core::EmbeddingError;

mod hashing;
mod ollama;
mod openai;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

fn transport_error(err: &reqwest::Error) -> EmbeddingError {
    if err.is_timeout() {
        EmbeddingError::timeout(err.to_string())
    } else if err.is_decode() {
        EmbeddingError::invalid_response(err.to_string())
    } else {
        EmbeddingError::connection(err.to_string())
    }
}

async fn status_error(resp: reqwest::Response) -> EmbeddingError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
    EmbeddingError::invalid_response(format!("HTTP {status}: {}", body.trim()))
}
