//! What a bot turn hands back to the caller

use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::TaskerError;
use crate::llm::{LLMResponseStream, TokenUsage};
use crate::state::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Success,
    Failed,
}

/// One tool invocation made during a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_name: String,
    pub args: serde_json::Value,
    pub output: String,
    pub status: ToolCallStatus,
}

impl ToolCallRecord {
    pub fn succeeded(&self) -> bool {
        self.status == ToolCallStatus::Success
    }
}

/// Result of `get_response`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseModel {
    /// Final user-facing answer
    pub content: String,
    pub tool_calls_used: Vec<ToolCallRecord>,
    pub token_usage: TokenUsage,
    /// Human-readable trace of the turn
    pub logs: Vec<String>,
}

impl ResponseModel {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn tools_used(&self) -> Vec<&str> {
        self.tool_calls_used.iter().map(|r| r.tool_name.as_str()).collect()
    }
}

/// Lazy stream of answer fragments, borrowing the bot until it is exhausted
pub type ResponseStream<'a> = Pin<Box<dyn Stream<Item = Result<String, TaskerError>> + Send + 'a>>;

struct PendingTurn<'a> {
    chunks: LLMResponseStream,
    user: Message,
    history: &'a mut Vec<Message>,
    text: String,
}

/// Forward text chunks to the caller and, once the model call is exhausted,
/// append `user` and the accumulated answer to `history`.
///
/// Nothing is committed if the stream errors, is dropped early, or produced
/// no text.
pub(crate) fn commit_on_completion<'a>(
    chunks: LLMResponseStream,
    user: Message,
    history: &'a mut Vec<Message>,
) -> ResponseStream<'a> {
    let pending = PendingTurn { chunks, user, history, text: String::new() };

    Box::pin(futures::stream::unfold(Some(pending), |pending| async move {
        let mut turn = pending?;
        loop {
            match turn.chunks.next_chunk().await {
                Some(Ok(chunk)) if chunk.content.is_empty() => continue,
                Some(Ok(chunk)) => {
                    turn.text.push_str(&chunk.content);
                    return Some((Ok(chunk.content), Some(turn)));
                }
                Some(Err(e)) => return Some((Err(e), None)),
                None => {
                    if !turn.text.is_empty() {
                        turn.history.push(turn.user);
                        turn.history.push(Message::assistant(&turn.text));
                    }
                    return None;
                }
            }
        }
    }))
}
