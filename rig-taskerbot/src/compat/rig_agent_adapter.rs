//! `LLMProvider` implementation over a Rig `Agent<M>`
//!
//! Tools are passed per request and never executed by Rig: the bots run their
//! own tool loops, so the adapter only forwards definitions and reads back
//! tool-call metadata.
//!
//! ```rust,ignore
//! use rig::client::CompletionClient;
//! use rig_taskerbot::compat::RigAgentAdapter;
//! use rig_taskerbot::llm::ProviderQuirks;
//!
//! let client = rig::providers::gemini::Client::new(&key)?;
//! let agent = client.agent("gemini-2.0-flash").build();
//! let provider = RigAgentAdapter::with_names(agent, "gemini", "gemini-2.0-flash")
//!     .with_quirks(ProviderQuirks::gemini());
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use futures::StreamExt;

use rig::agent::Agent;
use rig::completion::{
    Completion, CompletionModel, CompletionRequestBuilder, GetTokenUsage, Message as RigMessage,
    ToolDefinition as RigToolDefinition,
};
use rig::message::{AssistantContent, ToolCall as RigToolCall};
use rig::streaming::StreamedAssistantContent;
use rig::OneOrMany;
use tracing::debug;

use crate::error::TaskerError;
use crate::llm::{
    normalize_messages, LLMConfig, LLMProvider, LLMResponse, LLMResponseStream, MessageChunk,
    ProviderQuirks, TokenUsage,
};
use crate::state::{Message, Role, ToolCall};
use crate::tools::ToolDefinition;

pub struct RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    agent: Arc<Agent<M>>,
    provider_name: String,
    model_name: String,
    quirks: ProviderQuirks,
}

impl<M> RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    pub fn new(agent: Agent<M>) -> Self {
        Self::with_names(agent, "rig", "rig-agent")
    }

    /// Adapter with provider/model names used in logs and `default_model()`
    pub fn with_names(
        agent: Agent<M>,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            agent: Arc::new(agent),
            provider_name: provider_name.into(),
            model_name: model_name.into(),
            quirks: ProviderQuirks::none(),
        }
    }

    pub fn with_quirks(mut self, quirks: ProviderQuirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn quirks(&self) -> ProviderQuirks {
        self.quirks
    }

    async fn request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<CompletionRequestBuilder<M>, TaskerError> {
        let normalized = normalize_messages(messages, self.quirks);
        let conversation = build_rig_conversation(&normalized);
        debug!(
            provider = %self.provider_name,
            history = conversation.history.len(),
            tools = tools.len(),
            "Dispatching completion"
        );

        let mut builder = self
            .agent
            .completion(conversation.prompt, conversation.history)
            .await
            .map_err(|e| TaskerError::LlmError(format!("{} completion error: {}", self.provider_name, e)))?;

        if let Some(system_preamble) = conversation.preamble {
            let preamble = match self.agent.preamble.as_deref() {
                Some(agent_preamble) => format!("{}\n\n{}", agent_preamble, system_preamble),
                None => system_preamble,
            };
            builder = builder.preamble(preamble);
        }

        if let Some(cfg) = config {
            if let Some(temperature) = cfg.temperature {
                builder = builder.temperature(temperature);
            }
            if let Some(max_tokens) = cfg.max_tokens {
                builder = builder.max_tokens(max_tokens);
            }
        }

        let rig_tools = to_rig_tool_definitions(tools);
        if !rig_tools.is_empty() {
            builder = builder.tools(rig_tools);
        }

        Ok(builder)
    }
}

#[async_trait]
impl<M> LLMProvider for RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponse, TaskerError> {
        let response = self
            .request(messages, tools, config)
            .await?
            .send()
            .await
            .map_err(|e| TaskerError::LlmError(format!("{} completion error: {}", self.provider_name, e)))?;

        let message = message_from_rig_choice(&response.choice);
        let usage = TokenUsage::from_rig_usage(&response.usage);

        let mut llm_response = LLMResponse::new(message);
        if !usage.is_empty() {
            llm_response = llm_response.with_usage(usage);
        }
        Ok(llm_response)
    }

    async fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        config: Option<&LLMConfig>,
    ) -> Result<LLMResponseStream, TaskerError> {
        let provider = self.provider_name.clone();
        let stream = self
            .request(messages, tools, config)
            .await?
            .stream()
            .await
            .map_err(|e| TaskerError::LlmError(format!("{} stream error: {}", provider, e)))?;

        let mapped = stream.filter_map(move |item| {
            let provider = provider.clone();
            async move {
                match item {
                    Ok(StreamedAssistantContent::Text(text)) => Some(Ok(MessageChunk {
                        content: text.text,
                        is_final: false,
                        usage: None,
                    })),
                    Ok(StreamedAssistantContent::Final(response)) => {
                        let usage = response
                            .token_usage()
                            .map(|usage| TokenUsage::from_rig_usage(&usage))
                            .filter(|usage| !usage.is_empty());
                        Some(Ok(MessageChunk {
                            content: String::new(),
                            is_final: true,
                            usage,
                        }))
                    }
                    Ok(_) => None,
                    Err(err) => Some(Err(TaskerError::LlmError(format!(
                        "{} stream error: {}",
                        provider, err
                    )))),
                }
            }
        });

        Ok(LLMResponseStream::new(mapped))
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn default_model(&self) -> &str {
        &self.model_name
    }
}

struct RigConversation {
    prompt: RigMessage,
    history: Vec<RigMessage>,
    preamble: Option<String>,
}

/// System messages become the preamble; the last remaining message is the prompt.
fn build_rig_conversation(messages: &[Message]) -> RigConversation {
    let mut system_parts = Vec::new();
    let mut rig_messages = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                if !message.content.trim().is_empty() {
                    system_parts.push(message.content.clone());
                }
            }
            Role::User => rig_messages.push(RigMessage::user(message.content.clone())),
            Role::Assistant => rig_messages.push(convert_assistant_message(message)),
            Role::Tool => rig_messages.push(convert_tool_message(message)),
        }
    }

    let prompt = rig_messages.pop().unwrap_or_else(|| RigMessage::user(""));
    let preamble = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));

    RigConversation {
        prompt,
        history: rig_messages,
        preamble,
    }
}

fn convert_assistant_message(message: &Message) -> RigMessage {
    let mut contents = Vec::new();

    if !message.content.is_empty() {
        contents.push(AssistantContent::text(message.content.clone()));
    }

    for call in message.tool_calls.iter().flatten() {
        contents.push(AssistantContent::tool_call(
            call.id.clone(),
            call.name.clone(),
            call.arguments.clone(),
        ));
    }

    let content = OneOrMany::many(contents).unwrap_or_else(|_| OneOrMany::one(AssistantContent::text("")));
    RigMessage::Assistant { id: None, content }
}

fn convert_tool_message(message: &Message) -> RigMessage {
    let tool_id = message
        .tool_call_id
        .clone()
        .unwrap_or_else(|| "tool".to_string());
    RigMessage::tool_result(tool_id, message.content.clone())
}

fn to_rig_tool_definitions(tools: &[ToolDefinition]) -> Vec<RigToolDefinition> {
    tools
        .iter()
        .map(|tool| RigToolDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        })
        .collect()
}

fn message_from_rig_choice(choice: &OneOrMany<AssistantContent>) -> Message {
    let mut content_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for item in choice.iter() {
        match item {
            AssistantContent::Text(text) => content_parts.push(text.text.clone()),
            AssistantContent::ToolCall(tool_call) => tool_calls.push(convert_rig_tool_call(tool_call)),
            AssistantContent::Reasoning(_) => {}
            AssistantContent::Image(_) => {}
        }
    }

    let content = content_parts.join("");
    if tool_calls.is_empty() {
        Message::assistant(&content)
    } else {
        Message::assistant_with_tool_calls(&content, tool_calls)
    }
}

fn convert_rig_tool_call(tool_call: &RigToolCall) -> ToolCall {
    ToolCall {
        id: tool_call.id.clone(),
        name: tool_call.function.name.clone(),
        arguments: tool_call.function.arguments.clone(),
    }
}

impl<M> std::fmt::Debug for RigAgentAdapter<M>
where
    M: CompletionModel + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RigAgentAdapter")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .field("quirks", &self.quirks)
            .finish()
    }
}
