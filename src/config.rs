//! # Configuration Module
//!
//! Loads the CLI configuration from environment variables (and `.env`).
//! Provider settings are delegated to [`BotConfig`]; this module adds the
//! things only the command-line front end cares about: the bot's persona,
//! the email webhook, MCP servers, files to index and where history is kept.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use rig_taskerbot::{BotConfig, BotProfile};

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider, model, sampling and loop limits
    pub bot: BotConfig,

    /// System instructions for ChatBot mode
    pub instructions: String,

    /// What the TaskerBot is for
    pub function_purpose: String,

    /// Voice used in TaskerBot answers
    pub personality_tone: String,

    /// Hard limits for the TaskerBot
    pub limitations: String,

    /// Where `send_email` posts messages; emails are only logged when unset
    pub email_webhook_url: Option<String>,

    /// Bearer token sent to the webhook
    pub email_webhook_token: Option<String>,

    /// JSON file with `{"content", "is_bot"}` records to resume from
    pub history_file: Option<PathBuf>,

    /// JSON map of MCP servers whose tools are added to the registry
    pub mcp_config: Option<PathBuf>,

    /// Files indexed as context for ChatBot mode
    pub documents: Vec<PathBuf>,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for Config {
    fn default() -> Self {
        Self {
            bot: BotConfig::default(),
            instructions: "You are a helpful assistant. Answer briefly and use tools when they help."
                .to_string(),
            function_purpose: "General assistant that can send emails and keep contact details"
                .to_string(),
            personality_tone: "Friendly and concise".to_string(),
            limitations: "Never invent contact details or email addresses.".to_string(),
            email_webhook_url: None,
            email_webhook_token: None,
            history_file: None,
            mcp_config: None,
            documents: Vec::new(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Example
    /// ```ignore
    /// let config = Config::from_env()?;
    /// println!("Using model: {}", config.bot.model_name());
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config {
            bot: BotConfig::from_env().context("Invalid LLM settings")?,
            ..Config::default()
        };

        if let Some(val) = non_empty("BOT_INSTRUCTIONS") {
            config.instructions = val;
        }

        if let Some(val) = non_empty("BOT_FUNCTION_PURPOSE") {
            config.function_purpose = val;
        }

        if let Some(val) = non_empty("BOT_PERSONALITY") {
            config.personality_tone = val;
        }

        if let Some(val) = non_empty("BOT_LIMITATIONS") {
            config.limitations = val;
        }

        config.email_webhook_url = non_empty("EMAIL_WEBHOOK_URL");
        config.email_webhook_token = non_empty("EMAIL_WEBHOOK_TOKEN");
        config.history_file = non_empty("TASKERBOT_HISTORY_FILE").map(PathBuf::from);
        config.mcp_config = non_empty("MCP_CONFIG").map(PathBuf::from);

        Ok(config)
    }

    /// Profile handed to the TaskerBot's planner and responder
    pub fn profile(&self) -> BotProfile {
        BotProfile::new(&self.function_purpose)
            .with_personality(&self.personality_tone)
            .with_limitations(&self.limitations)
    }

    /// Validate the configuration before any model is contacted.
    pub fn validate(&self) -> Result<()> {
        if let Some(temperature) = self.bot.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                anyhow::bail!("LLM_TEMPERATURE must be between 0.0 and 2.0, got: {temperature}");
            }
        }

        if self.bot.max_iterations == 0 {
            anyhow::bail!("TASKER_MAX_ITERATIONS must be at least 1");
        }

        if self.bot.model_name().is_empty() {
            anyhow::bail!("LLM_MODEL cannot be empty");
        }

        if let Some(missing) = self.documents.iter().find(|p| !p.is_file()) {
            anyhow::bail!("Document not found: {}", missing.display());
        }

        if let Some(url) = &self.email_webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("EMAIL_WEBHOOK_URL must be an http(s) URL, got: {url}");
            }
        }

        Ok(())
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
