//! Shared test doubles for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use rig_taskerbot::llm::{LLMConfig, LLMProvider, LLMResponse};
use rig_taskerbot::state::{Message, ToolCall};
use rig_taskerbot::tools::{EmailReceipt, EmailTransport, OutgoingEmail, ToolDefinition};
use rig_taskerbot::{TaskerError, ToolError};

/// Provider that replays queued responses and records every request
#[derive(Default)]
pub struct QueuedLLM {
    responses: Mutex<VecDeque<Result<LLMResponse, String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl QueuedLLM {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.response(LLMResponse::new(Message::assistant(text)))
    }

    pub fn tool_call(self, name: &str, args: serde_json::Value) -> Self {
        let call = ToolCall::new(name, args);
        self.response(LLMResponse::new(Message::assistant_with_tool_calls("", vec![call])))
    }

    pub fn response(self, response: LLMResponse) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, error: &str) -> Self {
        self.responses.lock().unwrap().push_back(Err(error.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LLMProvider for QueuedLLM {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, TaskerError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(TaskerError::LlmError(e)),
            None => Err(TaskerError::LlmError("no scripted response left".to_string())),
        }
    }

    fn name(&self) -> &str {
        "queued"
    }

    fn default_model(&self) -> &str {
        "queued-model"
    }
}

/// Email transport that counts deliveries; clones share the counter
#[derive(Clone, Default)]
pub struct CountingTransport {
    sent: Arc<AtomicUsize>,
}

impl CountingTransport {
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailTransport for CountingTransport {
    async fn send(&self, _email: &OutgoingEmail) -> Result<EmailReceipt, ToolError> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(EmailReceipt {
            id: format!("test-{n}"),
            sent_at: Utc::now(),
        })
    }
}
