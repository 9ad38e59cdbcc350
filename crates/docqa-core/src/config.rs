//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge compiled defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_RETRIEVAL__TOP_K=50`). Provides a helper to expand `~` and `${VAR}`
//! in configured paths.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;
use crate::retry::{Backoff, RetryPolicy};
use crate::types::ContextBudget;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new()
            .merge(Serialized::defaults(RagConfig::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    /// Build from an explicit figment (tests, embedding into other services).
    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config = Self { figment: Figment::from(Serialized::defaults(RagConfig::default())).merge(figment) };
        config.rag()?.validate()?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The fully typed view over every merged layer.
    pub fn rag(&self) -> anyhow::Result<RagConfig> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract configuration: {}", e))
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        let rag = self.rag()?;
        rag.validate()?;
        if matches!(env, "prod" | "production") && rag.embedding.provider == EmbeddingBackend::Hashing {
            return Err(invalid("the hashing embedder is for development only; pick a real provider for prod"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    Error::InvalidConfig(message.into()).into()
}

/// Typed configuration for the whole retrieval/generation pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub persona: PersonaConfig,
    pub data: DataConfig,
}

impl RagConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let t = self.retrieval.similarity_threshold;
        if !(-1.0..=1.0).contains(&t) {
            return Err(invalid(format!("retrieval.similarity_threshold must lie in [-1, 1], got {t}")));
        }
        if self.retrieval.top_k == 0 {
            return Err(invalid("retrieval.top_k must be positive"));
        }
        if self.retrieval.max_sources == 0 {
            return Err(invalid("retrieval.max_sources must be positive"));
        }
        if self.embedding.max_workers == 0 {
            return Err(invalid("embedding.max_workers must be positive"));
        }
        if self.embedding.job_retention_secs == 0 {
            return Err(invalid("embedding.job_retention_secs must be positive so finished jobs can be polled"));
        }
        if self.embedding.max_input_chars == 0 {
            return Err(invalid("embedding.max_input_chars must be positive"));
        }
        if self.context.per_item_char_limit == 0 || self.context.max_items == 0 {
            return Err(invalid("context.per_item_char_limit and context.max_items must be positive"));
        }
        if self.context.min_slice_chars >= self.context.total_char_limit {
            return Err(invalid(format!(
                "context.min_slice_chars ({}) must be below context.total_char_limit ({})",
                self.context.min_slice_chars, self.context.total_char_limit
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub similarity_threshold: f32,
    pub top_k: usize,
    pub max_sources: usize,
    /// Ceiling for a source's merged content before packing.
    pub merged_char_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { similarity_threshold: 0.2, top_k: 500, max_sources: 100, merged_char_limit: 3_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub total_char_limit: usize,
    pub per_item_char_limit: usize,
    pub max_items: usize,
    pub min_slice_chars: usize,
}

impl ContextConfig {
    pub fn budget(&self) -> ContextBudget {
        ContextBudget {
            total_char_limit: self.total_char_limit,
            per_item_char_limit: self.per_item_char_limit,
            max_items: self.max_items,
            min_slice_chars: self.min_slice_chars,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        let b = ContextBudget::default();
        Self {
            total_char_limit: b.total_char_limit,
            per_item_char_limit: b.per_item_char_limit,
            max_items: b.max_items,
            min_slice_chars: b.min_slice_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Ollama,
    #[serde(alias = "openai-compatible")]
    OpenAi,
    /// Deterministic token-hashing vectors; no network.
    Hashing,
}

impl EmbeddingBackend {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Hashing => "",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => "nomic-embed-text",
            Self::OpenAi => "text-embedding-3-small",
            Self::Hashing => "hashing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingBackend,
    /// Falls back to the provider's usual endpoint when unset.
    pub base_url: Option<String>,
    /// Falls back to the provider's default model when unset.
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub dimensions: Option<usize>,
    pub max_input_chars: usize,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub retry_delay_ms: u64,
    pub max_workers: usize,
    /// Clip for the `"{title} {content}"` text embedded by ingestion jobs.
    pub job_input_chars: usize,
    pub job_retention_secs: u64,
}

impl EmbeddingConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or_else(|| self.provider.default_base_url())
    }

    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts.max(1), Duration::from_millis(self.retry_delay_ms))
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingBackend::Ollama,
            base_url: None,
            model: None,
            api_key: None,
            dimensions: None,
            max_input_chars: 4_000,
            timeout_secs: 30,
            max_attempts: 3,
            retry_delay_ms: 1_000,
            max_workers: 8,
            job_input_chars: 2_000,
            job_retention_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    Gemini,
    OpenAi,
    Anthropic,
}

impl GenerationBackend {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.5-flash-lite",
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub enabled: bool,
    pub provider: GenerationBackend,
    /// Falls back to the provider's default model when unset.
    pub model: Option<String>,
    pub api_key: Option<String>,
    /// Overrides the provider's public endpoint (proxies, tests).
    pub base_url: Option<String>,
    pub max_output_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Retries after the first attempt, for rate-limit signals only.
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub backoff: Backoff,
    /// Largest assembled prompt (system prompt + context + question) sent upstream.
    pub max_prompt_chars: usize,
}

impl GenerationConfig {
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or_else(|| self.provider.default_model())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries + 1, Duration::from_millis(self.retry_base_delay_ms), self.backoff)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: GenerationBackend::Gemini,
            model: None,
            api_key: None,
            base_url: None,
            max_output_tokens: 512,
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 2,
            retry_base_delay_ms: 3_000,
            backoff: Backoff::Linear,
            max_prompt_chars: 15_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub name: String,
    pub description: Option<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self { name: "the archive assistant".to_string(), description: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub store_path: String,
    pub raw_txt_dir: String,
}

impl DataConfig {
    pub fn store_path(&self) -> PathBuf {
        expand_path(&self.store_path)
    }

    pub fn raw_txt_dir(&self) -> PathBuf {
        expand_path(&self.raw_txt_dir)
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { store_path: "data/documents.json".to_string(), raw_txt_dir: "data/txt".to_string() }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
