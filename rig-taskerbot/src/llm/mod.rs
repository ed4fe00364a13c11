//! LLM Provider abstractions
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  TaskerBot / ChatBot / TextClassifier       │
//! └─────────────────────┬───────────────────────┘
//!                       │ uses
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │            LLMProvider (trait)              │
//! │  - complete(messages, tools, config)        │
//! │  - stream(messages, tools, config)          │
//! └─────────────────────┬───────────────────────┘
//!                       │ implemented by
//!                       ▼
//! ┌─────────────────────────────────────────────┐
//! │  RigAgentAdapter  (+ ProviderQuirks)        │
//! └─────────────────────┬───────────────────────┘
//!          ┌────────────┼────────────┬───────────┐
//!          ▼            ▼            ▼           ▼
//!       OpenAI      DeepSeek      Gemini      Bedrock
//! ```

mod config;
mod message;
mod provider;

pub use config::{LLMConfig, TokenUsage};
pub use message::{normalize_messages, ProviderQuirks, EMPTY_TOOL_RESULT, RESUME_PLACEHOLDER, SYSTEM_PREFIX};
pub use provider::{LLMProvider, LLMResponse, LLMResponseStream, MessageChunk};

#[cfg(test)]
pub(crate) mod scripted;
