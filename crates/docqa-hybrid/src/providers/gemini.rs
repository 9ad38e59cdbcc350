use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docqa_core::{GenerationError, GenerationProvider, GenerationRequest};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{error_from_response, non_empty, transport_error};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini `generateContent` REST endpoint.
pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    id: String,
}

impl GeminiProvider {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        anyhow::ensure!(!model.trim().is_empty(), "missing Gemini model name");
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(api_key.trim()).context("invalid Gemini API key")?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder().default_headers(headers).build().context("failed to build Gemini HTTP client")?;
        Ok(Self {
            client,
            endpoint: format!("{}/v1beta/models/{model}:generateContent", base_url.trim_end_matches('/')),
            id: format!("gemini:{model}"),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: &GenerationRequest, timeout: Duration) -> Result<String, GenerationError> {
        let body = GeminiRequest {
            system_instruction: GeminiContent { role: None, parts: vec![GeminiPart { text: &request.system_prompt }] },
            contents: vec![GeminiContent { role: Some("user"), parts: vec![GeminiPart { text: &request.prompt }] }],
            generation_config: GeminiGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }
        let parsed: GeminiResponse = resp.json().await.map_err(|e| transport_error(&e))?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
            .unwrap_or_default();
        non_empty(text, "Gemini")
    }
}
