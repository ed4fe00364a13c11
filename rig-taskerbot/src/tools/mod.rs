//! Tool implementations
//!
//! - `registry`: the `Tool` trait and `ToolRegistry`
//! - `schema`: argument checking against a tool's JSON schema
//! - `email`: `send_email` over a pluggable transport
//! - `contact`: `create_or_update_contact` CRM upsert

mod contact;
mod email;
mod registry;
pub mod schema;

pub use contact::{
    Contact, ContactStore, InMemoryContactStore, SaveContactTool, StoredContact, UpsertOutcome,
    CONTACT_TOOL_NAME,
};
pub use email::{
    EmailReceipt, EmailTool, EmailTransport, LogTransport, OutgoingEmail, WebhookTransport,
    EMAIL_TOOL_NAME,
};
pub use registry::{DynTool, Tool, ToolDefinition, ToolRegistry, ToolResult};
pub use schema::validate_arguments;

use std::sync::Arc;

/// Email (log transport) plus an in-memory CRM, enough for a local demo
pub fn default_tools() -> Vec<DynTool> {
    vec![
        Arc::new(EmailTool::new(LogTransport)),
        Arc::new(SaveContactTool::new(InMemoryContactStore::new())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tools() {
        let mut registry = ToolRegistry::new();
        registry.register_all(default_tools());

        assert_eq!(registry.names(), vec![CONTACT_TOOL_NAME, EMAIL_TOOL_NAME]);
    }
}
