//! CRM contact tool
//!
//! `create_or_update_contact` upserts a contact into a [`ContactStore`]. The
//! match key is the email address when one is given, otherwise the
//! case-folded name. A contact first saved by name alone moves to its email
//! key once an email is known.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ToolError;
use crate::runtime::ToolRuntime;
use crate::tools::{Tool, ToolDefinition, ToolResult};

pub const CONTACT_TOOL_NAME: &str = "create_or_update_contact";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Contact {
    fn key(&self) -> String {
        match &self.email {
            Some(email) if !email.trim().is_empty() => email.trim().to_lowercase(),
            _ => self.name_key(),
        }
    }

    fn name_key(&self) -> String {
        self.name.trim().to_lowercase()
    }
}

/// Outcome of an upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredContact {
    pub contact: Contact,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn upsert(&self, contact: Contact) -> Result<UpsertOutcome, ToolError>;

    async fn find(&self, key: &str) -> Result<Option<StoredContact>, ToolError>;
}

/// Process-local store, mostly for demos and tests
#[derive(Debug, Default)]
pub struct InMemoryContactStore {
    contacts: RwLock<HashMap<String, StoredContact>>,
}

impl InMemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.contacts.read().await.len()
    }
}

#[async_trait]
impl ContactStore for InMemoryContactStore {
    async fn upsert(&self, contact: Contact) -> Result<UpsertOutcome, ToolError> {
        let key = contact.key();
        let mut contacts = self.contacts.write().await;

        // Adopt a name-only record saved before the email was known
        if !contacts.contains_key(&key) {
            let name_key = contact.name_key();
            let name_only = contacts
                .get(&name_key)
                .is_some_and(|stored| stored.contact.email.is_none());
            if name_key != key && name_only {
                if let Some(stored) = contacts.remove(&name_key) {
                    contacts.insert(key.clone(), stored);
                }
            }
        }

        let outcome = match contacts.get(&key) {
            Some(existing) => {
                // Keep previously known fields the new call leaves out
                let merged = Contact {
                    name: contact.name,
                    email: contact.email.or_else(|| existing.contact.email.clone()),
                    phone: contact.phone.or_else(|| existing.contact.phone.clone()),
                };
                contacts.insert(key, StoredContact { contact: merged, updated_at: Utc::now() });
                UpsertOutcome::Updated
            }
            None => {
                contacts.insert(key, StoredContact { contact, updated_at: Utc::now() });
                UpsertOutcome::Created
            }
        };

        Ok(outcome)
    }

    async fn find(&self, key: &str) -> Result<Option<StoredContact>, ToolError> {
        Ok(self.contacts.read().await.get(&key.trim().to_lowercase()).cloned())
    }
}

pub struct SaveContactTool<S: ContactStore> {
    store: S,
}

impl<S: ContactStore> SaveContactTool<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: ContactStore + 'static> Tool for SaveContactTool<S> {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: CONTACT_TOOL_NAME.to_string(),
            description: "Create or update the user's contact record in the CRM. Call it as soon as the user shares their name, email or phone.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Full name", "minLength": 1},
                    "email": {"type": "string", "description": "Email address"},
                    "phone": {"type": "string", "description": "Phone number"}
                },
                "required": ["name"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        runtime: &ToolRuntime,
    ) -> Result<ToolResult, ToolError> {
        let contact: Contact = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if contact.name.trim().is_empty() {
            return Err(ToolError::InvalidArguments("name must not be blank".to_string()));
        }

        let name = contact.name.clone();
        let outcome = self.store.upsert(contact).await?;
        debug!(tool_call_id = runtime.tool_call_id(), ?outcome, "Contact saved");

        let verb = match outcome {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
        };
        Ok(ToolResult::new(format!("Contact {name} {verb}"))
            .with_data(serde_json::json!({"status": verb, "name": name})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_then_update_by_email() {
        let tool = SaveContactTool::new(InMemoryContactStore::new());
        let runtime = ToolRuntime::new();

        let first = tool
            .execute(json!({"name": "Erley", "email": "Erley@Example.com"}), &runtime)
            .await
            .unwrap();
        assert_eq!(first.message, "Contact Erley created");

        let second = tool
            .execute(json!({"name": "Erley R.", "email": "erley@example.com", "phone": "555"}), &runtime)
            .await
            .unwrap();
        assert_eq!(second.data.unwrap()["status"], "updated");

        let stored = tool.store().find("erley@example.com").await.unwrap().unwrap();
        assert_eq!(stored.contact.name, "Erley R.");
        assert_eq!(stored.contact.phone.as_deref(), Some("555"));
        assert_eq!(tool.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_update_keeps_known_fields() {
        let store = InMemoryContactStore::new();
        store
            .upsert(Contact { name: "Ana".into(), email: None, phone: Some("123".into()) })
            .await
            .unwrap();
        store
            .upsert(Contact { name: "Ana".into(), email: None, phone: None })
            .await
            .unwrap();

        let stored = store.find("ana").await.unwrap().unwrap();
        assert_eq!(stored.contact.phone.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_email_added_later_updates_name_only_contact() {
        let tool = SaveContactTool::new(InMemoryContactStore::new());
        let runtime = ToolRuntime::new();

        let first = tool.execute(json!({"name": "Ana", "phone": "123"}), &runtime).await.unwrap();
        assert_eq!(first.message, "Contact Ana created");

        let second = tool
            .execute(json!({"name": "ana", "email": "ana@x.co"}), &runtime)
            .await
            .unwrap();
        assert_eq!(second.message, "Contact ana updated");
        assert_eq!(tool.store().len().await, 1);

        let stored = tool.store().find("ana@x.co").await.unwrap().unwrap();
        assert_eq!(stored.contact.phone.as_deref(), Some("123"));
        assert!(tool.store().find("ana").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_name_different_email_stays_separate() {
        let store = InMemoryContactStore::new();
        store
            .upsert(Contact { name: "Ana".into(), email: Some("ana@one.co".into()), phone: None })
            .await
            .unwrap();
        let outcome = store
            .upsert(Contact { name: "Ana".into(), email: Some("ana@two.co".into()), phone: None })
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_blank_name_rejected() {
        let tool = SaveContactTool::new(InMemoryContactStore::new());
        let err = tool
            .execute(json!({"name": "  "}), &ToolRuntime::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
