//! Environment-based configuration
//!
//! # Environment Variables
//!
//! | Variable | Purpose | Default |
//! |----------|---------|---------|
//! | `LLM_PROVIDER` | `openai`, `deepseek`, `gemini` or `bedrock` | `openai` |
//! | `LLM_MODEL` | Model name | per provider |
//! | `LLM_BASE_URL` | OpenAI-compatible endpoint override | per provider |
//! | `LLM_TEMPERATURE` | Sampling temperature | unset |
//! | `LLM_MAX_TOKENS` | Response token cap | unset |
//! | `TASKER_MAX_ITERATIONS` | Recursion limit of the bots | `10` |
//! | `TASKER_MAX_RETRIES` | Tool retries in the tasker executor | `2` |
//! | `OPENAI_API_KEY` | OpenAI key | required for OpenAI |
//! | `DEEPSEEK_API_KEY` | DeepSeek key | required for DeepSeek |
//! | `GOOGLE_API_KEY` / `GEMINI_API_KEY` | Gemini key | required for Gemini |
//! | `AWS_BEARER_TOKEN_BEDROCK` | Bedrock API key | required for Bedrock |
//! | `AWS_REGION` | Bedrock region | `us-east-1` |
//! | `EMBEDDING_MODEL` | Model used to index uploaded files | per provider |
//!
//! Every provider is reached through its OpenAI-compatible chat completions
//! endpoint; what differs is the base URL, the key and the message quirks.
//!
//! ```ignore
//! use rig_taskerbot::config::{BotConfig, ProviderKind};
//!
//! let config = BotConfig::from_env()?.with_provider(ProviderKind::Gemini);
//! let llm = config.llm_provider()?;
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rig::client::{CompletionClient, EmbeddingsClient};
use rig::providers::openai::{self, CompletionsClient};
use tracing::info;

use crate::compat::RigAgentAdapter;
use crate::documents::{Embedder, RigEmbedder};
use crate::error::TaskerError;
use crate::llm::{LLMConfig, LLMProvider, ProviderQuirks};
use crate::tasker::{DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_RETRIES};

pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Supported model vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    OpenAI,
    DeepSeek,
    Gemini,
    Bedrock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Bedrock => "bedrock",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4o-mini",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Gemini => "gemini-2.0-flash",
            ProviderKind::Bedrock => "openai.gpt-oss-20b-1:0",
        }
    }

    /// Embedding model served on the provider's endpoint, if it has one
    pub fn default_embedding_model(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAI => Some("text-embedding-3-small"),
            ProviderKind::Gemini => Some("text-embedding-004"),
            ProviderKind::DeepSeek | ProviderKind::Bedrock => None,
        }
    }

    /// Variables holding the API key, in lookup order
    pub fn key_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAI => &["OPENAI_API_KEY"],
            ProviderKind::DeepSeek => &["DEEPSEEK_API_KEY"],
            ProviderKind::Gemini => &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            ProviderKind::Bedrock => &["AWS_BEARER_TOKEN_BEDROCK"],
        }
    }

    pub fn quirks(&self) -> ProviderQuirks {
        match self {
            ProviderKind::OpenAI => ProviderQuirks::none(),
            ProviderKind::DeepSeek => ProviderQuirks::deepseek(),
            ProviderKind::Gemini => ProviderQuirks::gemini(),
            ProviderKind::Bedrock => ProviderQuirks::bedrock(),
        }
    }

    /// OpenAI-compatible endpoint; `None` means the OpenAI default
    pub fn base_url(&self, aws_region: &str) -> Option<String> {
        match self {
            ProviderKind::OpenAI => None,
            ProviderKind::DeepSeek => Some("https://api.deepseek.com/v1".to_string()),
            ProviderKind::Gemini => {
                Some("https://generativelanguage.googleapis.com/v1beta/openai/".to_string())
            }
            ProviderKind::Bedrock => Some(format!(
                "https://bedrock-runtime.{aws_region}.amazonaws.com/openai/v1"
            )),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = TaskerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" | "gpt" => Ok(ProviderKind::OpenAI),
            "deepseek" => Ok(ProviderKind::DeepSeek),
            "gemini" | "google" => Ok(ProviderKind::Gemini),
            "bedrock" | "aws" => Ok(ProviderKind::Bedrock),
            other => Err(TaskerError::Config(format!("unknown LLM provider '{other}'"))),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider selection, sampling settings and loop limits
#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub provider: ProviderKind,
    /// Falls back to the provider's default model
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub max_iterations: usize,
    pub max_retries: usize,
    pub aws_region: String,
    /// Falls back to the provider's default embedding model
    pub embedding_model: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_retries: DEFAULT_MAX_RETRIES,
            aws_region: DEFAULT_AWS_REGION.to_string(),
            embedding_model: None,
        }
    }
}

impl BotConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Result<Self, TaskerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; unset or empty variables keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TaskerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(provider) = var("LLM_PROVIDER") {
            config.provider = provider.parse()?;
        }
        config.model = var("LLM_MODEL");
        config.base_url = var("LLM_BASE_URL");

        if let Some(temperature) = var("LLM_TEMPERATURE") {
            config.temperature = Some(parse_var("LLM_TEMPERATURE", &temperature)?);
        }
        if let Some(max_tokens) = var("LLM_MAX_TOKENS") {
            config.max_tokens = Some(parse_var("LLM_MAX_TOKENS", &max_tokens)?);
        }
        if let Some(iterations) = var("TASKER_MAX_ITERATIONS") {
            config.max_iterations = parse_var("TASKER_MAX_ITERATIONS", &iterations)?;
        }
        if let Some(retries) = var("TASKER_MAX_RETRIES") {
            config.max_retries = parse_var("TASKER_MAX_RETRIES", &retries)?;
        }
        if let Some(region) = var("AWS_REGION") {
            config.aws_region = region;
        }
        config.embedding_model = var("EMBEDDING_MODEL");

        Ok(config)
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_retries(mut self, max: usize) -> Self {
        self.max_retries = max;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    pub fn embedding_model_name(&self) -> Option<&str> {
        self.embedding_model
            .as_deref()
            .or_else(|| self.provider.default_embedding_model())
    }

    pub fn endpoint(&self) -> Option<String> {
        self.base_url
            .clone()
            .or_else(|| self.provider.base_url(&self.aws_region))
    }

    pub fn llm_config(&self) -> LLMConfig {
        let mut config = LLMConfig::new(self.model_name());
        config.temperature = self.temperature;
        config.max_tokens = self.max_tokens;
        config
    }

    /// Look up the provider's API key with `lookup`
    pub fn api_key_from<F>(&self, lookup: F) -> Result<String, TaskerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = self.provider.key_vars();
        vars.iter()
            .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
            .ok_or_else(|| {
                TaskerError::Config(format!(
                    "{} is required when using provider '{}'",
                    vars.join(" or "),
                    self.provider
                ))
            })
    }

    /// Create the configured provider.
    ///
    /// # Errors
    ///
    /// [`TaskerError::Config`] when the API key is missing or the client
    /// cannot be built.
    pub fn llm_provider(&self) -> Result<Arc<dyn LLMProvider>, TaskerError> {
        let key = self.api_key_from(|name| std::env::var(name).ok())?;
        let model = self.model_name().to_string();
        let endpoint = self.endpoint();

        let client: CompletionsClient = match &endpoint {
            Some(url) => CompletionsClient::builder().api_key(&key).base_url(url).build(),
            None => CompletionsClient::new(&key),
        }
        .map_err(|e| TaskerError::Config(format!("failed to create {} client: {e}", self.provider)))?;

        let mut builder = client.agent(&model);
        if let Some(temperature) = self.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        info!(provider = %self.provider, model = %model, endpoint = ?endpoint, "LLM provider ready");

        Ok(Arc::new(
            RigAgentAdapter::with_names(builder.build(), self.provider.as_str(), model)
                .with_quirks(self.provider.quirks()),
        ))
    }

    /// Create the embedder used to index uploaded files.
    ///
    /// # Errors
    ///
    /// [`TaskerError::Config`] when the provider has no embedding model and
    /// `EMBEDDING_MODEL` is unset, or when the key or client is missing.
    pub fn embedder(&self) -> Result<Arc<dyn Embedder>, TaskerError> {
        let model = self.embedding_model_name().ok_or_else(|| {
            TaskerError::Config(format!(
                "provider '{}' has no default embedding model, set EMBEDDING_MODEL",
                self.provider
            ))
        })?;
        let key = self.api_key_from(|name| std::env::var(name).ok())?;
        let endpoint = self.endpoint();

        let client: openai::Client = match &endpoint {
            Some(url) => openai::Client::builder().api_key(&key).base_url(url).build(),
            None => openai::Client::new(&key),
        }
        .map_err(|e| TaskerError::Config(format!("failed to create {} embedding client: {e}", self.provider)))?;

        info!(provider = %self.provider, model = %model, "Embedder ready");
        Ok(Arc::new(RigEmbedder::new(client.embedding_model(model))))
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, TaskerError> {
    value
        .trim()
        .parse()
        .map_err(|_| TaskerError::Config(format!("{name} has an invalid value: '{value}'")))
}
