use std::sync::Arc;
use std::time::Duration;

use docqa_core::config::GenerationConfig;
use docqa_core::{GenerationError, GenerationProvider, GenerationRequest, RetryPolicy};
use tracing::{debug, warn};

use crate::prompt::{assembled_len, user_prompt};

/// Sends assembled prompts to a generation provider.
///
/// Rate-limit failures are retried per the configured policy; every other
/// [`GenerationError`] goes straight back to the caller.
pub struct AnswerGateway {
    provider: Arc<dyn GenerationProvider>,
    retry: RetryPolicy,
    timeout: Duration,
    max_prompt_chars: usize,
    max_output_tokens: usize,
    temperature: f32,
}

impl AnswerGateway {
    pub fn new(
        provider: Arc<dyn GenerationProvider>,
        retry: RetryPolicy,
        timeout: Duration,
        max_prompt_chars: usize,
        max_output_tokens: usize,
        temperature: f32,
    ) -> Self {
        Self { provider, retry, timeout, max_prompt_chars, max_output_tokens, temperature }
    }

    pub fn from_config(provider: Arc<dyn GenerationProvider>, cfg: &GenerationConfig) -> Self {
        Self::new(
            provider,
            cfg.retry_policy(),
            cfg.timeout(),
            cfg.max_prompt_chars,
            cfg.max_output_tokens,
            cfg.temperature,
        )
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    /// Build the request for `question`. When system prompt plus context plus
    /// question would exceed `max_prompt_chars`, the context is dropped whole.
    pub fn build_request(&self, system_prompt: &str, context: &str, question: &str) -> GenerationRequest {
        let mut prompt = user_prompt(context, question);
        let size = assembled_len(system_prompt, &prompt);
        if size > self.max_prompt_chars && !context.is_empty() {
            warn!(size, limit = self.max_prompt_chars, "prompt too long, sending the question without context");
            prompt = user_prompt("", question);
        }
        GenerationRequest {
            system_prompt: system_prompt.to_string(),
            prompt,
            max_output_tokens: self.max_output_tokens,
            temperature: self.temperature,
        }
    }

    pub async fn generate(&self, system_prompt: &str, context: &str, question: &str) -> Result<String, GenerationError> {
        let request = self.build_request(system_prompt, context, question);
        self.send(&request).await
    }

    pub async fn send(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.retry
            .run(
                |attempt| {
                    debug!(attempt, provider = self.provider_id(), "calling generation provider");
                    self.call_once(request)
                },
                GenerationError::is_retryable,
            )
            .await
    }

    async fn call_once(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        match tokio::time::timeout(self.timeout, self.provider.generate(request, self.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::timeout(format!("no response within {}s", self.timeout.as_secs()))),
        }
    }
}
