//! Scripted provider for unit tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{LLMConfig, LLMProvider, LLMResponse};
use crate::error::TaskerError;
use crate::state::Message;
use crate::tools::ToolDefinition;

/// Replays queued responses in order and records every request it saw
#[derive(Default)]
pub(crate) struct ScriptedLLM {
    responses: Mutex<VecDeque<Result<LLMResponse, String>>>,
    requests: Mutex<Vec<(Vec<Message>, Option<LLMConfig>)>>,
}

impl ScriptedLLM {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.push(Ok(LLMResponse::new(Message::assistant(text))))
    }

    pub fn response(self, response: LLMResponse) -> Self {
        self.push(Ok(response))
    }

    pub fn fail(self, error: &str) -> Self {
        self.push(Err(error.to_string()))
    }

    fn push(self, item: Result<LLMResponse, String>) -> Self {
        self.responses.lock().unwrap().push_back(item);
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].0.clone()
    }

    pub fn config(&self, index: usize) -> Option<LLMConfig> {
        self.requests.lock().unwrap()[index].1.clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedLLM {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, TaskerError> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), config.cloned()));

        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(TaskerError::LlmError(error)),
            None => Err(TaskerError::LlmError("script exhausted".to_string())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted"
    }
}
