// src/state.rs
//! Conversation state shared by the bots
//!
//! Messages are immutable once pushed; `ConversationState` only ever grows
//! during a turn.

use serde::{Deserialize, Serialize};

use crate::llm::TokenUsage;

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Create a call with a freshly generated id
    pub fn new(name: &str, arguments: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.to_string(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Message {
    fn with_role(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            tool_call_id: None,
            tool_calls: None,
            status: None,
        }
    }

    pub fn user(content: &str) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::with_role(Role::Assistant, content)
        }
    }

    pub fn system(content: &str) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn tool(content: &str, tool_call_id: &str) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.to_string()),
            ..Self::with_role(Role::Tool, content)
        }
    }

    pub fn tool_with_status(content: &str, tool_call_id: &str, status: &str) -> Self {
        Self {
            status: Some(status.to_string()),
            ..Self::tool(content, tool_call_id)
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|tc| !tc.is_empty())
    }
}

/// One entry of externally stored chat history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryRecord {
    pub content: String,
    pub is_bot: bool,
}

impl HistoryRecord {
    pub fn user(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_bot: false }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_bot: true }
    }
}

impl From<&HistoryRecord> for Message {
    fn from(record: &HistoryRecord) -> Self {
        if record.is_bot {
            Message::assistant(&record.content)
        } else {
            Message::user(&record.content)
        }
    }
}

/// Append-only message log with an iteration counter and token totals.
///
/// Owned by exactly one turn. Callers that keep history across turns clone the
/// committed messages out with [`ConversationState::messages`].
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<Message>,
    iteration: usize,
    usage: TokenUsage,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a state from prior messages
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn from_history(records: &[HistoryRecord]) -> Self {
        Self::with_messages(records.iter().map(Message::from).collect())
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Completed planning passes in this turn
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Bump the iteration counter and return the new value
    pub fn advance_iteration(&mut self) -> usize {
        self.iteration += 1;
        self.iteration
    }

    pub fn record_usage(&mut self, usage: Option<&TokenUsage>) {
        if let Some(usage) = usage {
            self.usage += usage.clone();
        }
    }

    pub fn usage(&self) -> &TokenUsage {
        &self.usage
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Most recent user message, i.e. the task of the current turn
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}
