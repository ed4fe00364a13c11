//! LLM Provider trait definition
//!
//! The one seam between the bots and a model backend. Production code wraps
//! a Rig agent with `RigAgentAdapter`; tests script responses with small
//! in-crate mocks.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

use super::config::{LLMConfig, TokenUsage};
use crate::error::TaskerError;
use crate::state::Message;
use crate::tools::ToolDefinition;

/// LLM completion response
#[derive(Debug, Clone)]
pub struct LLMResponse {
    /// Assistant message, possibly carrying tool calls
    pub message: Message,
    /// Token usage, when the provider reports it
    pub usage: Option<TokenUsage>,
}

impl LLMResponse {
    pub fn new(message: Message) -> Self {
        Self { message, usage: None }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Streaming response chunk
#[derive(Debug, Clone)]
pub struct MessageChunk {
    pub content: String,
    pub is_final: bool,
    /// Usually only present on the final chunk
    pub usage: Option<TokenUsage>,
}

type ChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk, TaskerError>> + Send>>;

/// Lazy stream of chunks from one in-flight model call
pub struct LLMResponseStream {
    inner: ChunkStream,
}

impl LLMResponseStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<MessageChunk, TaskerError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
        }
    }

    /// Single-chunk stream for providers without native streaming
    pub fn from_complete(response: LLMResponse) -> Self {
        let chunk = MessageChunk {
            content: response.message.content,
            is_final: true,
            usage: response.usage,
        };
        Self::new(futures::stream::once(async move { Ok(chunk) }))
    }

    /// Pull the next chunk, `None` once the call is exhausted
    pub async fn next_chunk(&mut self) -> Option<Result<MessageChunk, TaskerError>> {
        self.inner.next().await
    }

    pub fn into_inner(self) -> ChunkStream {
        self.inner
    }
}

impl std::fmt::Debug for LLMResponseStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMResponseStream").finish_non_exhaustive()
    }
}

/// Provider-agnostic chat completion.
///
/// `messages` is the full conversation including system messages; providers
/// that need a different message shape normalise it themselves before
/// dispatch (see [`crate::llm::ProviderQuirks`]).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, TaskerError>;

    /// Streaming completion; falls back to `complete()` by default
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponseStream, TaskerError> {
        let response = self.complete(messages, tools, config).await?;
        Ok(LLMResponseStream::from_complete(response))
    }

    /// Provider name for logging
    fn name(&self) -> &str;

    fn default_model(&self) -> &str;
}
