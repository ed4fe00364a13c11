//! Final answer synthesis

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::Metered;
use crate::llm::{LLMConfig, LLMProvider, LLMResponse, LLMResponseStream};
use crate::prompts::{self, BotProfile, APOLOGY};
use crate::state::{ConversationState, Message};

pub const RESPONDER_TEMPERATURE: f64 = 0.3;

/// Turns the finished loop into the user-facing answer
#[async_trait]
pub trait Responder: Send + Sync {
    /// Never fails; implementations answer with an apology instead
    async fn respond(&self, state: &ConversationState, reasoning: &str) -> Metered<String>;

    /// Streaming variant; a single chunk by default
    async fn respond_stream(&self, state: &ConversationState, reasoning: &str) -> LLMResponseStream {
        let answer = self.respond(state, reasoning).await;
        let mut response = LLMResponse::new(Message::assistant(&answer.value));
        response.usage = answer.usage;
        LLMResponseStream::from_complete(response)
    }
}

pub struct LlmResponder {
    llm: Arc<dyn LLMProvider>,
    profile: BotProfile,
    config: LLMConfig,
}

impl LlmResponder {
    pub fn new(llm: Arc<dyn LLMProvider>, profile: BotProfile) -> Self {
        let config = LLMConfig::new(llm.default_model()).with_temperature(RESPONDER_TEMPERATURE);
        Self { llm, profile, config }
    }

    pub fn with_config(mut self, config: LLMConfig) -> Self {
        self.config = config;
        self
    }

    fn request(&self, state: &ConversationState, reasoning: &str) -> Vec<Message> {
        let user_message = state
            .last_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let prompt = prompts::responder_prompt(
            &self.profile,
            user_message,
            reasoning,
            &prompts::results_summary(state),
        );
        vec![Message::user(&prompt)]
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn respond(&self, state: &ConversationState, reasoning: &str) -> Metered<String> {
        let messages = self.request(state, reasoning);
        match self.llm.complete(&messages, &[], Some(&self.config)).await {
            Ok(response) => Metered::new(response.message.content).with_usage(response.usage),
            Err(e) => {
                warn!(error = %e, "Responder call failed");
                Metered::new(APOLOGY.to_string())
            }
        }
    }

    async fn respond_stream(&self, state: &ConversationState, reasoning: &str) -> LLMResponseStream {
        let messages = self.request(state, reasoning);
        match self.llm.stream(&messages, &[], Some(&self.config)).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Responder stream failed");
                LLMResponseStream::from_complete(LLMResponse::new(Message::assistant(APOLOGY)))
            }
        }
    }
}

/// Uses the planner's reasoning verbatim, for callers that want no extra model call
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoResponder;

#[async_trait]
impl Responder for EchoResponder {
    async fn respond(&self, state: &ConversationState, reasoning: &str) -> Metered<String> {
        if reasoning.trim().is_empty() {
            Metered::new(prompts::results_summary(state))
        } else {
            Metered::new(reasoning.trim().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedLLM;

    fn state() -> ConversationState {
        let mut state = ConversationState::new();
        state.push(Message::user("what is my name?"));
        state
    }

    #[tokio::test]
    async fn test_llm_responder_prompt_and_temperature() {
        let llm = Arc::new(ScriptedLLM::new().reply("Your name is Erley."));
        let responder = LlmResponder::new(llm.clone(), BotProfile::new("Help").with_personality("Warm"));

        let answer = responder.respond(&state(), "The user said they are Erley").await;

        assert_eq!(answer.value, "Your name is Erley.");
        let prompt = &llm.request(0)[0].content;
        assert!(prompt.contains("## PERSONALITY\nWarm"));
        assert!(prompt.contains("## USER MESSAGE\nwhat is my name?"));
        assert!(prompt.contains("Planner Reasoning:\nThe user said they are Erley"));
        assert_eq!(llm.config(0).and_then(|c| c.temperature), Some(RESPONDER_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_llm_responder_apologises_on_error() {
        let responder = LlmResponder::new(Arc::new(ScriptedLLM::new().fail("down")), BotProfile::default());
        assert_eq!(responder.respond(&state(), "").await.value, APOLOGY);
    }

    #[tokio::test]
    async fn test_default_stream_is_single_chunk() {
        let mut stream = EchoResponder.respond_stream(&state(), "Hi Erley").await;
        let chunk = stream.next_chunk().await.unwrap().unwrap();
        assert_eq!(chunk.content, "Hi Erley");
        assert!(chunk.is_final);
        assert!(stream.next_chunk().await.is_none());
    }
}
