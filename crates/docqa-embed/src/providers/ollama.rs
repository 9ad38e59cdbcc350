use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docqa_core::{EmbeddingError, EmbeddingProvider};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{status_error, transport_error};

/// Ollama's `/api/embeddings` endpoint, one prompt per request.
pub struct OllamaEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    id: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        anyhow::ensure!(!model.trim().is_empty(), "missing Ollama model name");
        let client = Client::builder().build().context("failed to build Ollama HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            id: format!("ollama:{model}"),
        })
    }
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    embedding: Option<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    fn embedder_id(&self) -> &str {
        &self.id
    }

    async fn embed(&self, text: &str, timeout: Duration) -> Result<Vec<f32>, EmbeddingError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&OllamaRequest { model: &self.model, prompt: text })
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        if !resp.status().is_success() {
            return Err(status_error(resp).await);
        }
        let parsed: OllamaResponse = resp.json().await.map_err(|e| transport_error(&e))?;
        parsed
            .embedding
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EmbeddingError::invalid_response("response carried no embedding"))
    }
}
