//! # Tools Module
//!
//! Assembles the tool registry the agents are allowed to use:
//! - `send_email`, delivered through a webhook when `EMAIL_WEBHOOK_URL` is
//!   set and only logged otherwise
//! - `create_or_update_contact`, backed by an in-memory store that lives as
//!   long as the process
//! - whatever the configured MCP servers provide

use std::sync::Arc;
use tracing::info;

use rig_taskerbot::tools::{DynTool, InMemoryContactStore};
use rig_taskerbot::{EmailTool, LogTransport, SaveContactTool, ToolRegistry, WebhookTransport};

use crate::config::Config;

// =============================================================================
// REGISTRY
// =============================================================================
/// Build the registry for one CLI session.
///
/// `extra` tools (from MCP servers) are registered last and replace a
/// built-in tool of the same name.
pub fn build_registry(config: &Config, extra: Vec<DynTool>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_all(vec![
        email_tool(config),
        Arc::new(SaveContactTool::new(InMemoryContactStore::new())),
    ]);
    registry.register_all(extra);

    info!(tools = ?registry.names(), "Tools registered");
    registry
}

fn email_tool(config: &Config) -> DynTool {
    match &config.email_webhook_url {
        Some(url) => {
            let mut transport = WebhookTransport::new(url);
            if let Some(token) = &config.email_webhook_token {
                transport = transport.with_bearer_token(token);
            }
            info!(url = %url, "Emails will be posted to webhook");
            Arc::new(EmailTool::new(transport))
        }
        None => {
            info!("EMAIL_WEBHOOK_URL not set, emails will only be logged");
            Arc::new(EmailTool::new(LogTransport))
        }
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rig_taskerbot::Tool;

    #[test]
    fn test_registry_has_email_and_contacts() {
        let registry = build_registry(&Config::default(), Vec::new());

        assert_eq!(registry.names(), vec!["create_or_update_contact", "send_email"]);
    }

    struct LookupOrder;

    #[async_trait::async_trait]
    impl Tool for LookupOrder {
        fn definition(&self) -> rig_taskerbot::ToolDefinition {
            rig_taskerbot::ToolDefinition {
                name: "lookup_order".to_string(),
                description: "Find an order".to_string(),
                parameters: serde_json::json!({"type": "object"}),
            }
        }

        async fn execute(
            &self,
            _args: serde_json::Value,
            _runtime: &rig_taskerbot::ToolRuntime,
        ) -> Result<rig_taskerbot::tools::ToolResult, rig_taskerbot::ToolError> {
            Ok(rig_taskerbot::tools::ToolResult::new("shipped"))
        }
    }

    #[test]
    fn test_extra_tools_are_registered() {
        let registry = build_registry(&Config::default(), vec![Arc::new(LookupOrder)]);

        assert_eq!(registry.names(), vec!["create_or_update_contact", "lookup_order", "send_email"]);
    }

    #[test]
    fn test_webhook_config_keeps_tool_schema() {
        let config = Config {
            email_webhook_url: Some("https://hooks.example.com/email".to_string()),
            email_webhook_token: Some("secret".to_string()),
            ..Config::default()
        };

        let registry = build_registry(&config, Vec::new());
        let email = registry.get("send_email").unwrap();

        let required = email.definition().parameters["required"].clone();
        assert_eq!(required, serde_json::json!(["to_email", "subject", "message"]));
    }
}
