//! rig-taskerbot: tool-using conversational agents for Rig
//!
//! - `TaskerBot`: planner, executor and validator loop with a recursion limit
//! - `ChatBot`: single-agent tool-calling chat
//! - `TextClassifier`: structured extraction through a forced tool call
//! - `LLMProvider` trait: one seam over OpenAI, DeepSeek, Gemini and Bedrock
//! - `ToolRegistry`: schema-checked tools (email, CRM contacts, MCP servers)
//! - `DocumentIndex`: uploaded-file context for the ChatBot
//!
//! # LLM Providers
//!
//! Use `BotConfig` to build a provider from the environment, or wrap any Rig
//! agent yourself with `RigAgentAdapter`:
//!
//! ```rust,ignore
//! use rig_taskerbot::{BotConfig, BotProfile, TaskerBot, ToolRegistry, default_tools};
//!
//! let config = BotConfig::from_env()?;
//! let llm = config.llm_provider()?;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register_all(default_tools());
//!
//! let mut bot = TaskerBot::new(llm, BotProfile::default(), registry)
//!     .with_max_iterations(config.max_iterations);
//! let response = bot.get_response("Email ana@example.com the meeting notes").await?;
//! println!("{}", response.content);
//! ```

mod extract;

pub mod chat;
pub mod classifier;
pub mod compat;
pub mod config;
pub mod documents;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod prompts;
pub mod response;
pub mod runtime;
pub mod state;
pub mod tasker;
pub mod tools;

// Re-exports for convenience
pub use error::{TaskerError, ToolError};
pub use state::{ConversationState, HistoryRecord, Message, Role, ToolCall};
pub use runtime::ToolRuntime;
pub use prompts::BotProfile;
pub use response::{ResponseModel, ResponseStream, ToolCallRecord, ToolCallStatus};

pub use tasker::{
    Executor, HeuristicValidator, LlmPlanner, LlmResponder, LlmValidator, Planner,
    RegistryExecutor, Responder, TaskerBot, TracingObserver, TurnObserver, Validator,
};
pub use chat::ChatBot;
pub use classifier::{ClassificationSchema, FieldKind, TextClassifier};
pub use documents::{DocumentIndex, Embedder, RigEmbedder};
pub use mcp::{load_mcp_tools, McpClient, McpServers, McpToolSet};

pub use tools::{
    default_tools, DynTool, EmailTool, EmailTransport, InMemoryContactStore, LogTransport,
    SaveContactTool, Tool, ToolDefinition, ToolRegistry, WebhookTransport,
};

// Configuration exports
pub use config::{BotConfig, ProviderKind};

// LLM Provider exports
pub use llm::{LLMConfig, LLMProvider, LLMResponse, LLMResponseStream, MessageChunk, ProviderQuirks, TokenUsage};

// Rig compatibility layer exports
pub use compat::RigAgentAdapter;
