//! Generation backends. All of them map HTTP failures through [`classify`]
//! so retry decisions look the same whichever provider is configured.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use docqa_core::config::{GenerationBackend, GenerationConfig};
use docqa_core::{GenerationError, GenerationProvider};
use reqwest::StatusCode;
use tracing::info;

mod anthropic;
mod gemini;
mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Build the provider selected in configuration. The API key comes from
/// `generation.api_key` or the provider's usual environment variable.
pub fn generation_provider_from_config(cfg: &GenerationConfig) -> Result<Arc<dyn GenerationProvider>> {
    let (env_var, default_base) = match cfg.provider {
        GenerationBackend::Gemini => ("GEMINI_API_KEY", gemini::DEFAULT_BASE_URL),
        GenerationBackend::OpenAi => ("OPENAI_API_KEY", openai::DEFAULT_BASE_URL),
        GenerationBackend::Anthropic => ("ANTHROPIC_API_KEY", anthropic::DEFAULT_BASE_URL),
    };
    let api_key = cfg
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(env_var).ok())
        .ok_or_else(|| anyhow!("generation.api_key (or {env_var}) is not set"))?;
    let base_url = cfg.base_url.as_deref().unwrap_or(default_base);

    let provider: Arc<dyn GenerationProvider> = match cfg.provider {
        GenerationBackend::Gemini => Arc::new(GeminiProvider::new(&api_key, base_url, cfg.model())?),
        GenerationBackend::OpenAi => Arc::new(OpenAiProvider::new(&api_key, base_url, cfg.model())?),
        GenerationBackend::Anthropic => Arc::new(AnthropicProvider::new(&api_key, base_url, cfg.model())?),
    };
    info!(provider = provider.provider_id(), "generation provider ready");
    Ok(provider)
}

/// Map a non-success response onto a [`GenerationError`] kind.
pub fn classify(status: StatusCode, body: &str) -> GenerationError {
    let lower = body.to_lowercase();
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("resource_exhausted")
    {
        GenerationError::rate_limited(message)
    } else if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || lower.contains("api key")
        || lower.contains("api_key")
    {
        GenerationError::invalid_credentials(message)
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::GATEWAY_TIMEOUT {
        GenerationError::timeout(message)
    } else if status.is_client_error() {
        GenerationError::malformed(message)
    } else {
        GenerationError::unknown(message)
    }
}

fn transport_error(err: &reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::timeout(err.to_string())
    } else if err.is_decode() {
        GenerationError::malformed(format!("unreadable response: {err}"))
    } else {
        GenerationError::unknown(err.to_string())
    }
}

async fn error_from_response(resp: reqwest::Response) -> GenerationError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
    classify(status, &body)
}

fn non_empty(text: String, provider: &str) -> Result<String, GenerationError> {
    if text.trim().is_empty() {
        Err(GenerationError::unknown(format!("{provider} response carried no text")))
    } else {
        Ok(text)
    }
}
