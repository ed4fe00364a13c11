//! # Agent Module
//!
//! Wraps the two bot flavours behind one type so the REPL does not care
//! which one it is talking to:
//! - `tasker`: plan, run one tool, validate, repeat, then answer
//! - `chat`: a single agent that calls tools until it can answer
//!
//! History can be loaded from and saved to a JSON file of
//! `{"content": ..., "is_bot": ...}` records. In chat mode files can be
//! indexed as extra context when the provider offers an embedding model.

use anyhow::{Context, Result};
use clap::ValueEnum;
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use rig_taskerbot::state::{HistoryRecord, Message, Role};
use rig_taskerbot::{ChatBot, DynTool, Embedder, LLMProvider, ResponseModel, TaskerBot, TracingObserver};

use crate::config::Config;
use crate::tools::build_registry;

// =============================================================================
// MODE
// =============================================================================
/// Which bot answers the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Planner / executor / validator loop
    Tasker,
    /// Single tool-calling agent
    Chat,
}

// =============================================================================
// ASSISTANT
// =============================================================================
pub enum Assistant {
    Tasker(TaskerBot),
    Chat(ChatBot),
}

impl Assistant {
    /// Build the provider from `config` and wrap it in the chosen bot.
    ///
    /// `extra_tools` come from MCP servers. Chat mode also gets an embedder
    /// when the provider has an embedding model.
    pub fn from_config(mode: Mode, config: &Config, extra_tools: Vec<DynTool>) -> Result<Self> {
        let llm = config
            .bot
            .llm_provider()
            .context("Failed to create the LLM provider")?;

        let embedder = match mode {
            Mode::Chat if config.bot.embedding_model_name().is_some() => match config.bot.embedder() {
                Ok(embedder) => Some(embedder),
                Err(e) => {
                    warn!(error = %e, "File indexing disabled");
                    None
                }
            },
            _ => None,
        };

        Ok(Self::new(mode, llm, config, extra_tools, embedder))
    }

    pub fn new(
        mode: Mode,
        llm: Arc<dyn LLMProvider>,
        config: &Config,
        extra_tools: Vec<DynTool>,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        let registry = build_registry(config, extra_tools);
        let observer = Arc::new(TracingObserver);

        info!(mode = ?mode, provider = llm.name(), "Creating assistant");

        match mode {
            Mode::Tasker => Assistant::Tasker(
                TaskerBot::with_retries(llm, config.profile(), registry, config.bot.max_retries)
                    .with_max_iterations(config.bot.max_iterations)
                    .with_observer(observer),
            ),
            Mode::Chat => {
                let mut bot = ChatBot::new(llm, registry, &config.instructions)
                    .with_config(config.bot.llm_config())
                    .with_max_iterations(config.bot.max_iterations)
                    .with_observer(observer);
                if let Some(embedder) = embedder {
                    bot = bot.with_embedder(embedder);
                }
                Assistant::Chat(bot)
            }
        }
    }

    /// Index a text file as context for later chat turns.
    ///
    /// Returns the number of chunks added.
    pub async fn process_file(&mut self, path: &Path) -> Result<usize> {
        let Assistant::Chat(bot) = self else {
            anyhow::bail!("Files can only be used in chat mode");
        };

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let chunks = bot
            .process_file(&text)
            .await
            .with_context(|| format!("Failed to index {}", path.display()))?;

        info!(path = %path.display(), chunks, "File indexed");
        Ok(chunks)
    }

    pub fn history(&self) -> &[Message] {
        match self {
            Assistant::Tasker(bot) => bot.history(),
            Assistant::Chat(bot) => bot.history(),
        }
    }

    pub fn load_history(&mut self, records: &[HistoryRecord]) {
        match self {
            Assistant::Tasker(bot) => bot.load_conversation_history(records),
            Assistant::Chat(bot) => bot.load_conversation_history(records),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Assistant::Tasker(bot) => bot.clear_history(),
            Assistant::Chat(bot) => bot.clear_memory(),
        }
    }

    /// Run one full turn and return the structured response.
    pub async fn ask(&mut self, query: &str) -> Result<ResponseModel> {
        let response = match self {
            Assistant::Tasker(bot) => bot.get_response(query).await?,
            Assistant::Chat(bot) => bot.get_response(query).await?,
        };

        debug!(
            tools = ?response.tools_used(),
            tokens = response.token_usage.total_tokens,
            "Turn finished"
        );
        Ok(response)
    }

    /// Run one turn, writing the answer to `out` as it arrives.
    ///
    /// Returns the full answer text.
    pub async fn ask_stream<W: Write>(&mut self, query: &str, out: &mut W) -> Result<String> {
        let mut stream = match self {
            Assistant::Tasker(bot) => bot.get_response_stream(query).await?,
            Assistant::Chat(bot) => bot.get_response_stream(query).await?,
        };

        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            write!(out, "{chunk}")?;
            out.flush()?;
            answer.push_str(&chunk);
        }
        writeln!(out)?;

        Ok(answer)
    }
}

// =============================================================================
// HISTORY FILES
// =============================================================================
/// Read history records; a missing file means an empty history.
pub fn load_history_file(path: &Path) -> Result<Vec<HistoryRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history file {}", path.display()))?;
    let records: Vec<HistoryRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("History file {} is not a JSON array of records", path.display()))?;

    info!(records = records.len(), path = %path.display(), "History loaded");
    Ok(records)
}

/// Keep only the user and assistant text of `messages`
pub fn to_records(messages: &[Message]) -> Vec<HistoryRecord> {
    messages
        .iter()
        .filter_map(|m| match m.role {
            Role::User => Some(HistoryRecord::user(&m.content)),
            Role::Assistant if !m.has_tool_calls() && !m.content.trim().is_empty() => {
                Some(HistoryRecord::bot(&m.content))
            }
            _ => None,
        })
        .collect()
}

pub fn save_history_file(path: &Path, messages: &[Message]) -> Result<()> {
    let records = to_records(messages);
    let json = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write history file {}", path.display()))?;

    debug!(records = records.len(), path = %path.display(), "History saved");
    Ok(())
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rig_taskerbot::state::ToolCall;
    use rig_taskerbot::tools::ToolDefinition;
    use rig_taskerbot::{LLMConfig, LLMResponse, TaskerError};

    /// Answers every request with the same text
    struct FixedLLM(&'static str);

    #[async_trait]
    impl LLMProvider for FixedLLM {
        async fn complete(
            &self,
            _messages: &[Message],
            _tools: &[ToolDefinition],
            _config: Option<&LLMConfig>,
        ) -> Result<LLMResponse, TaskerError> {
            Ok(LLMResponse::new(Message::assistant(self.0)))
        }

        fn name(&self) -> &str {
            "fixed"
        }

        fn default_model(&self) -> &str {
            "fixed-model"
        }
    }

    fn assistant(mode: Mode) -> Assistant {
        Assistant::new(mode, Arc::new(FixedLLM("Hello there")), &Config::default(), Vec::new(), None)
    }

    /// One dimension per letter a-z
    struct LetterEmbedder;

    #[async_trait]
    impl Embedder for LetterEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, TaskerError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; 26];
                    for c in t.to_ascii_lowercase().bytes().filter(u8::is_ascii_lowercase) {
                        v[(c - b'a') as usize] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_chat_mode_answers_and_remembers() {
        let mut bot = assistant(Mode::Chat);

        let response = bot.ask("hi").await.unwrap();

        assert_eq!(response.content, "Hello there");
        assert_eq!(bot.history().len(), 2);

        bot.clear();
        assert!(bot.history().is_empty());
    }

    #[tokio::test]
    async fn test_tasker_mode_answers() {
        let mut bot = assistant(Mode::Tasker);

        let response = bot.ask("hi").await.unwrap();

        assert_eq!(response.content, "Hello there");
        assert!(response.tool_calls_used.is_empty());
    }

    #[tokio::test]
    async fn test_stream_writes_answer() {
        let mut bot = assistant(Mode::Chat);
        let mut out = Vec::new();

        let answer = bot.ask_stream("hi", &mut out).await.unwrap();

        assert_eq!(answer, "Hello there");
        assert_eq!(String::from_utf8(out).unwrap(), "Hello there\n");
        assert_eq!(bot.history().len(), 2);
    }

    #[tokio::test]
    async fn test_process_file_in_chat_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("faq.md");
        std::fs::write(&path, "Refunds take 5 days.\n\nShipping is free.").unwrap();

        let mut chat = Assistant::new(
            Mode::Chat,
            Arc::new(FixedLLM("ok")),
            &Config::default(),
            Vec::new(),
            Some(Arc::new(LetterEmbedder)),
        );
        assert_eq!(chat.process_file(&path).await.unwrap(), 1);

        let err = chat.process_file(&dir.path().join("missing.md")).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to read"));

        let mut tasker = assistant(Mode::Tasker);
        let err = tasker.process_file(&path).await.unwrap_err();
        assert_eq!(err.to_string(), "Files can only be used in chat mode");
    }

    #[test]
    fn test_history_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        assert!(load_history_file(&path).unwrap().is_empty());

        let messages = vec![
            Message::user("My name is Erley"),
            Message::assistant_with_tool_calls("", vec![ToolCall::new("send_email", serde_json::json!({}))]),
            Message::tool("sent", "call_1"),
            Message::assistant("Nice to meet you, Erley"),
        ];
        save_history_file(&path, &messages).unwrap();

        let records = load_history_file(&path).unwrap();
        assert_eq!(
            records,
            vec![HistoryRecord::user("My name is Erley"), HistoryRecord::bot("Nice to meet you, Erley")]
        );
    }
}
