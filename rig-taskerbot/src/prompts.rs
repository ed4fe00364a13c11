//! Prompt templates shared by the bots
//!
//! Templates are plain `format!` strings. Empty profile fields render as
//! `(none)`.

use crate::state::{ConversationState, Role};

/// Tool names that unlock an extra behavioural rule in the system prompt
pub const KNOWLEDGE_TOOL: &str = "search_knowledge_documents";
pub const POLICY_TOOL: &str = "accept_policies";
pub const CONTACT_TOOL: &str = "create_or_update_contact";

/// Fallback answer when the model cannot be reached
pub const APOLOGY: &str = "I apologize, but I encountered an error processing your request.";

/// Who the bot is and what it must not do
#[derive(Debug, Clone, Default)]
pub struct BotProfile {
    /// What the bot is for
    pub function_purpose: String,
    /// Voice used for the final answer
    pub personality_tone: String,
    /// Hard limits the bot must respect
    pub limitations: String,
    /// Per-deployment facts (opening hours, prices, ...)
    pub dynamic_info: String,
}

impl BotProfile {
    pub fn new(function_purpose: impl Into<String>) -> Self {
        Self {
            function_purpose: function_purpose.into(),
            ..Self::default()
        }
    }

    pub fn with_personality(mut self, tone: impl Into<String>) -> Self {
        self.personality_tone = tone.into();
        self
    }

    pub fn with_limitations(mut self, limitations: impl Into<String>) -> Self {
        self.limitations = limitations.into();
        self
    }

    pub fn with_dynamic_info(mut self, info: impl Into<String>) -> Self {
        self.dynamic_info = info.into();
        self
    }
}

/// Rules that only apply when the matching tool is registered
pub fn conditional_rules<'a>(tool_names: impl IntoIterator<Item = &'a str>) -> String {
    let names: Vec<&str> = tool_names.into_iter().collect();
    let mut rules = Vec::new();

    if names.contains(&KNOWLEDGE_TOOL) {
        rules.push(format!(
            "## CORPORATE RULE: MANDATORY USE OF `{KNOWLEDGE_TOOL}`\n\
             If the user's query might be answered by internal documents:\n\
             - ALWAYS call `{KNOWLEDGE_TOOL}` FIRST before responding\n\
             - Use the user's message as the query\n\
             - Never invent information that might exist in documents"
        ));
    }

    if names.contains(&POLICY_TOOL) {
        rules.push(format!(
            "## POLICY ACCEPTANCE HANDLING\n\
             - On the FIRST user message of the conversation, ask whether they accept the privacy policies and terms of use.\n\
             - Do NOT call `{POLICY_TOOL}` automatically; wait for explicit confirmation (\"yes\", \"sí\", \"acepto\", \"ok\").\n\
             - As soon as the user confirms, call `{POLICY_TOOL}` with their confirmation in `user_message`.\n\
             - After `{POLICY_TOOL}` succeeds, NEVER ask for acceptance again."
        ));
    }

    if names.contains(&CONTACT_TOOL) {
        rules.push(format!(
            "## AUTOMATIC CONTACT UPDATE\n\
             If the user provides contact information (name, email, phone):\n\
             - ALWAYS call `{CONTACT_TOOL}` immediately\n\
             - Include whatever was provided; do not wait for every field\n\
             - Do this BEFORE any other action"
        ));
    }

    rules.join("\n\n")
}

/// System prompt of the single-agent chat bot
pub fn chat_system_prompt(instructions: &str, rules: &str, context: Option<&str>) -> String {
    let mut prompt = instructions.trim().to_string();
    if !rules.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(rules);
    }
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nContext:\n");
        prompt.push_str(context.trim());
    }
    prompt
}

/// Append retrieved file chunks to a system prompt
pub fn with_file_context(mut prompt: String, context: &str) -> String {
    if !context.trim().is_empty() {
        prompt.push_str("\n\nContext from uploaded files:\n");
        prompt.push_str(context.trim());
    }
    prompt
}

pub fn planner_system_prompt(profile: &BotProfile, rules: &str) -> String {
    format!(
        "# ROLE\n\
         You are the planning step of an assistant that works in a loop: you decide, \
         a tool runs, a reviewer checks the result, and you decide again.\n\n\
         # PURPOSE\n{purpose}\n\n\
         # LIMITATIONS (MANDATORY)\n{limitations}\n\n\
         # RULES\n{rules}\n\n\
         # HOW TO ANSWER\n\
         - To act, call exactly ONE tool. If native tool calling is unavailable, reply with \
         {{\"tool\": \"<name>\", \"arguments\": {{...}}}}.\n\
         - When no tool is needed or the task is complete, reply with your final reasoning \
         or {{\"final_answer\": \"...\"}}.\n\
         - Never call a tool that already succeeded for the same request.",
        purpose = or_none(&profile.function_purpose),
        limitations = or_none(&profile.limitations),
        rules = or_none(rules),
    )
}

/// Per-iteration user message appended after the history
pub fn planner_analysis_input(state: &ConversationState) -> String {
    let request = state
        .last_user_message()
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let mut parts = vec![format!("## User Request\n{request}")];

    let executed = executed_tools(state);
    if !executed.is_empty() {
        let lines: Vec<String> = executed
            .iter()
            .map(|(name, status, _)| format!("- {name}: {status}"))
            .collect();
        parts.push(format!("## Tools Already Executed\n{}", lines.join("\n")));
    }

    if let Some((name, status, output)) = executed.last() {
        parts.push(format!(
            "## Last Observation\nTool: {name}\nStatus: {status}\nResult: {output}"
        ));
    }

    parts.push(
        "## Your Task\n\
         Analyze the situation and decide:\n\
         - Do you need to call a tool? If yes, call it.\n\
         - Do you have enough information? If yes, explain your reasoning and FINISH."
            .to_string(),
    );

    parts.join("\n\n")
}

pub fn validator_prompt(task: &str, tool_name: &str, arguments: &str, output: &str) -> String {
    format!(
        "# RESULT REVIEW\n\
         Verify whether the tool result below moves the user's request forward.\n\n\
         ## User Request\n{task}\n\n\
         ## Tool\n{tool_name}\n\n\
         ## Arguments\n{arguments}\n\n\
         ## Result\n{output}\n\n\
         Reply with exactly two lines:\n\
         Status: approved|rejected\n\
         Feedback: <one sentence for the planner>"
    )
}

pub fn responder_prompt(
    profile: &BotProfile,
    user_message: &str,
    reasoning: &str,
    results_summary: &str,
) -> String {
    format!(
        "# RESPONSE GENERATOR\n\n\
         ## PERSONALITY\n{personality}\n\n\
         ## LIMITATIONS (MANDATORY)\n{limitations}\n\n\
         ## USER MESSAGE\n{user_message}\n\n\
         ## CONTEXT\n\
         Dynamic Context:\n{dynamic}\n\n\
         Planner Reasoning:\n{reasoning}\n\n\
         Information from Tools:\n{results_summary}\n\n\
         ## INSTRUCTIONS\n\
         1. Follow all limitations strictly\n\
         2. Use only the planner reasoning and tool information above\n\
         3. Be conversational and natural, and match the user's language\n\
         4. Never invent information\n\n\
         Generate the response below:",
        personality = or_none(&profile.personality_tone),
        limitations = or_none(&profile.limitations),
        dynamic = or_none(&profile.dynamic_info),
        reasoning = or_none(reasoning),
    )
}

/// One line per tool message of the current turn
pub fn results_summary(state: &ConversationState) -> String {
    let executed = executed_tools(state);
    if executed.is_empty() {
        return "No tools were executed. The user may need to provide more information.".to_string();
    }
    executed
        .iter()
        .map(|(name, status, output)| match *status {
            "success" => format!("From {name}: {output}"),
            _ => format!("{name} failed: {output}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// (tool name, status, output) for every tool message after the last user turn
fn executed_tools(state: &ConversationState) -> Vec<(String, &'static str, String)> {
    let messages = state.messages();
    let start = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .map(|i| i + 1)
        .unwrap_or(0);

    let mut names = std::collections::HashMap::new();
    let mut executed = Vec::new();
    for message in &messages[start..] {
        for call in message.tool_calls.iter().flatten() {
            names.insert(call.id.as_str(), call.name.clone());
        }
        if message.role == Role::Tool {
            let name = message
                .tool_call_id
                .as_deref()
                .and_then(|id| names.get(id).cloned())
                .unwrap_or_else(|| "unknown".to_string());
            let status = match message.status.as_deref() {
                Some("error") => "failed",
                _ => "success",
            };
            executed.push((name, status, message.content.clone()));
        }
    }
    executed
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Message, ToolCall};

    #[test]
    fn test_rules_only_for_registered_tools() {
        let rules = conditional_rules(["create_or_update_contact", "send_email"]);
        assert!(rules.contains("AUTOMATIC CONTACT UPDATE"));
        assert!(!rules.contains("POLICY ACCEPTANCE"));
        assert!(conditional_rules(["send_email"]).is_empty());
    }

    #[test]
    fn test_chat_system_prompt_sections() {
        let prompt = chat_system_prompt("You are Sonia.", "## RULE", Some("Open 9-5"));
        assert!(prompt.starts_with("You are Sonia."));
        assert!(prompt.contains("## RULE"));
        assert!(prompt.ends_with("Context:\nOpen 9-5"));

        assert_eq!(chat_system_prompt("Hi", "", Some("  ")), "Hi");
    }

    #[test]
    fn test_analysis_input_lists_current_turn_tools() {
        let call = ToolCall::new("send_email", serde_json::json!({}));
        let mut state = ConversationState::new();
        state.push(Message::user("old request"));
        state.push(Message::tool("stale", "old"));
        state.push(Message::user("email Ana"));
        state.push(Message::assistant_with_tool_calls("", vec![call.clone()]));
        state.push(Message::tool_with_status("ERROR: timeout", &call.id, "error"));

        let input = planner_analysis_input(&state);

        assert!(input.contains("## User Request\nemail Ana"));
        assert!(input.contains("- send_email: failed"));
        assert!(input.contains("Result: ERROR: timeout"));
        assert!(!input.contains("stale"));
    }

    #[test]
    fn test_results_summary_without_tools() {
        let mut state = ConversationState::new();
        state.push(Message::user("hi"));
        assert!(results_summary(&state).starts_with("No tools were executed"));
    }

    #[test]
    fn test_planner_prompt_fills_empty_sections() {
        let prompt = planner_system_prompt(&BotProfile::new("Book appointments"), "");
        assert!(prompt.contains("Book appointments"));
        assert!(prompt.contains("# LIMITATIONS (MANDATORY)\n(none)"));
    }
}
