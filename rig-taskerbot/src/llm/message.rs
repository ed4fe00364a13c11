//! Provider message-shape normalisation
//!
//! Providers disagree on where system text may appear and on which role may
//! open a conversation. The bots always build the same logical history;
//! `normalize_messages` reshapes it for one provider right before dispatch.

use crate::state::{Message, Role};

/// Prefix used when a system message has to travel as a user turn
pub const SYSTEM_PREFIX: &str = "[System]: ";

/// Placeholder user turn for providers that reject an assistant-first history
pub const RESUME_PLACEHOLDER: &str = "[Conversation resumed]";

/// Stand-in content for a tool result that came back blank
pub const EMPTY_TOOL_RESULT: &str = "(empty result)";

/// Message-shape constraints of one provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProviderQuirks {
    /// Collapse the leading run of system messages into one
    pub merge_leading_system: bool,
    /// Rewrite system messages after the first content turn as `[System]: ` user turns
    pub inline_late_system: bool,
    /// The first non-system message must come from the user
    pub leading_user_turn: bool,
    /// Drop messages with neither text nor tool calls; blank tool results
    /// are filled with a placeholder instead
    pub drop_empty: bool,
}

impl ProviderQuirks {
    /// No rewriting
    pub fn none() -> Self {
        Self::default()
    }

    pub fn deepseek() -> Self {
        Self {
            merge_leading_system: true,
            inline_late_system: true,
            ..Self::default()
        }
    }

    pub fn gemini() -> Self {
        Self {
            merge_leading_system: true,
            inline_late_system: true,
            leading_user_turn: true,
            drop_empty: true,
        }
    }

    pub fn bedrock() -> Self {
        Self {
            merge_leading_system: true,
            inline_late_system: true,
            leading_user_turn: true,
            drop_empty: false,
        }
    }

    pub fn is_noop(&self) -> bool {
        *self == Self::none()
    }
}

/// Reshape `messages` to satisfy `quirks`.
///
/// Relative order of user, assistant and tool messages is never changed.
pub fn normalize_messages(messages: &[Message], quirks: ProviderQuirks) -> Vec<Message> {
    if quirks.is_noop() {
        return messages.to_vec();
    }

    let leading = messages
        .iter()
        .take_while(|m| m.role == Role::System)
        .count();
    let (system, rest) = messages.split_at(leading);

    let mut out = Vec::with_capacity(messages.len() + 1);

    if quirks.merge_leading_system {
        let merged = system
            .iter()
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if !merged.is_empty() {
            out.push(Message::system(&merged));
        }
    } else {
        out.extend(system.iter().cloned());
    }

    let mut body: Vec<Message> = rest
        .iter()
        .filter(|m| {
            !(quirks.drop_empty
                && m.role != Role::Tool
                && m.content.trim().is_empty()
                && !m.has_tool_calls())
        })
        .map(|m| {
            if quirks.inline_late_system && m.role == Role::System {
                Message::user(&format!("{SYSTEM_PREFIX}{}", m.content))
            } else if quirks.drop_empty && m.role == Role::Tool && m.content.trim().is_empty() {
                // every tool call keeps its result
                Message {
                    content: EMPTY_TOOL_RESULT.to_string(),
                    ..m.clone()
                }
            } else {
                m.clone()
            }
        })
        .collect();

    if quirks.leading_user_turn {
        if let Some(at) = body.iter().position(|m| m.role != Role::System) {
            if body[at].role != Role::User {
                body.insert(at, Message::user(RESUME_PLACEHOLDER));
            }
        }
    }

    out.extend(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_identity() {
        let messages = vec![
            Message::system("a"),
            Message::system("b"),
            Message::user("hi"),
        ];
        assert_eq!(normalize_messages(&messages, ProviderQuirks::none()), messages);
    }

    #[test]
    fn test_gemini_merges_leading_system() {
        let messages = vec![
            Message::system("instructions"),
            Message::system("context"),
            Message::user("hi"),
        ];

        let out = normalize_messages(&messages, ProviderQuirks::gemini());

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[0].content, "instructions\n\ncontext");
        assert_eq!(out[1].content, "hi");
    }

    #[test]
    fn test_late_system_becomes_user_turn() {
        let messages = vec![
            Message::system("rules"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::system("be brief"),
        ];

        let out = normalize_messages(&messages, ProviderQuirks::deepseek());

        assert_eq!(out.last().unwrap().role, Role::User);
        assert_eq!(out.last().unwrap().content, "[System]: be brief");
    }

    #[test]
    fn test_assistant_first_history_gets_user_placeholder() {
        let messages = vec![
            Message::system("rules"),
            Message::assistant("Welcome back!"),
            Message::user("thanks"),
        ];

        let out = normalize_messages(&messages, ProviderQuirks::gemini());

        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[1].role, Role::User);
        assert_eq!(out[1].content, RESUME_PLACEHOLDER);
        assert_eq!(out[2].content, "Welcome back!");
    }

    #[test]
    fn test_gemini_drops_empty_messages_but_keeps_tool_calls() {
        let call = crate::state::ToolCall::new("send_email", serde_json::json!({}));
        let messages = vec![
            Message::user("send it"),
            Message::assistant(""),
            Message::assistant_with_tool_calls("", vec![call]),
        ];

        let out = normalize_messages(&messages, ProviderQuirks::gemini());

        assert_eq!(out.len(), 2);
        assert!(out[1].has_tool_calls());
    }

    #[test]
    fn test_blank_tool_result_is_kept_with_placeholder() {
        let call = crate::state::ToolCall::new("send_email", serde_json::json!({}));
        let messages = vec![
            Message::user("send it"),
            Message::assistant_with_tool_calls("", vec![call]),
            Message::tool("", "call_1"),
        ];

        let out = normalize_messages(&messages, ProviderQuirks::gemini());

        let roles: Vec<Role> = out.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
        assert_eq!(out[2].content, EMPTY_TOOL_RESULT);
        assert_eq!(out[2].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_blank_leading_system_is_omitted() {
        let messages = vec![Message::system("  "), Message::user("hi")];
        let out = normalize_messages(&messages, ProviderQuirks::bedrock());
        assert_eq!(out, vec![Message::user("hi")]);
    }
}
