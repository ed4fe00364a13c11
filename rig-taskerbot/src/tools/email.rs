//! Email Tool - sends a message through a pluggable transport
//!
//! The tool only validates and forwards; delivery belongs to an
//! [`EmailTransport`]. Two transports ship with the crate:
//!
//! - [`WebhookTransport`]: POSTs the email as JSON to an HTTP endpoint
//! - [`LogTransport`]: records the email in the tracing log and nowhere else

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ToolError;
use crate::runtime::ToolRuntime;
use crate::tools::{Tool, ToolDefinition, ToolResult};

/// Tool name exposed to the model
pub const EMAIL_TOOL_NAME: &str = "send_email";

const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to_email: String,
    pub subject: String,
    pub message: String,
}

/// Delivery receipt returned by a transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailReceipt {
    pub id: String,
    pub sent_at: DateTime<Utc>,
}

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailReceipt, ToolError>;
}

/// Transport that logs instead of sending
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailReceipt, ToolError> {
        info!(to = %email.to_email, subject = %email.subject, "Email accepted by log transport");
        Ok(EmailReceipt {
            id: format!("log-{}", uuid::Uuid::new_v4().simple()),
            sent_at: Utc::now(),
        })
    }
}

/// Transport that POSTs `OutgoingEmail` as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookTransport {
    url: String,
    bearer_token: Option<String>,
    client: Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct WebhookReply {
    #[serde(default)]
    id: Option<String>,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
            client: Client::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl EmailTransport for WebhookTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<EmailReceipt, ToolError> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(email);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Transport("email webhook timed out".to_string())
            } else {
                ToolError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transport(format!(
                "email webhook returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        // Endpoints are free to reply with an empty body
        let reply: WebhookReply = response.json().await.unwrap_or(WebhookReply { id: None });
        Ok(EmailReceipt {
            id: reply
                .id
                .unwrap_or_else(|| format!("webhook-{}", uuid::Uuid::new_v4().simple())),
            sent_at: Utc::now(),
        })
    }
}

/// Sends an email on the model's behalf.
///
/// ```ignore
/// let tool = EmailTool::new(WebhookTransport::new("https://hooks.example.com/mail"));
/// let result = tool.execute(json!({
///     "to_email": "ana@example.com",
///     "subject": "Your appointment",
///     "message": "See you Monday at 10."
/// }), &ToolRuntime::new()).await?;
/// ```
pub struct EmailTool<T: EmailTransport> {
    transport: T,
}

impl<T: EmailTransport> EmailTool<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: EmailTransport + 'static> Tool for EmailTool<T> {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: EMAIL_TOOL_NAME.to_string(),
            description: "Send an email to a recipient. Use it only when the user explicitly asks to send or receive information by email.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "to_email": {
                        "type": "string",
                        "description": "Recipient email address",
                        "minLength": 3
                    },
                    "subject": {
                        "type": "string",
                        "description": "Subject line"
                    },
                    "message": {
                        "type": "string",
                        "description": "Plain-text body of the email"
                    }
                },
                "required": ["to_email", "subject", "message"],
                "additionalProperties": false
            }),
        }
    }

    async fn execute(
        &self,
        args: serde_json::Value,
        runtime: &ToolRuntime,
    ) -> Result<ToolResult, ToolError> {
        let email: OutgoingEmail = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        if !email.to_email.contains('@') {
            return Err(ToolError::InvalidArguments(format!(
                "'{}' is not an email address",
                email.to_email
            )));
        }

        debug!(
            tool_call_id = runtime.tool_call_id(),
            attempt = runtime.attempt(),
            to = %email.to_email,
            "Sending email"
        );

        let receipt = self.transport.send(&email).await?;

        Ok(ToolResult::new(format!("Email sent successfully to {}", email.to_email))
            .with_data(serde_json::json!({
                "status": "sent",
                "id": receipt.id,
                "to_email": email.to_email,
                "sent_at": receipt.sent_at.to_rfc3339(),
            })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn valid_args() -> serde_json::Value {
        json!({
            "to_email": "ana@example.com",
            "subject": "Hello",
            "message": "Body"
        })
    }

    #[test]
    fn test_email_tool_definition() {
        let def = EmailTool::new(LogTransport).definition();

        assert_eq!(def.name, "send_email");
        let required = def.parameters["required"].as_array().unwrap();
        assert_eq!(required.len(), 3);
        assert!(required.contains(&json!("to_email")));
    }

    #[test]
    fn test_log_transport_sends() {
        let tool = EmailTool::new(LogTransport);
        let result = tokio_test::block_on(tool.execute(valid_args(), &ToolRuntime::new())).unwrap();

        assert!(result.message.contains("ana@example.com"));
        assert_eq!(result.data.unwrap()["status"], "sent");
    }

    #[tokio::test]
    async fn test_invalid_address_rejected() {
        let tool = EmailTool::new(LogTransport);
        let args = json!({"to_email": "not-an-address", "subject": "s", "message": "m"});

        let err = tool.execute(args, &ToolRuntime::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_webhook_transport_posts_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mail"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({"to_email": "ana@example.com"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg-42"})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = WebhookTransport::new(format!("{}/mail", server.uri()))
            .with_bearer_token("secret");
        let result = EmailTool::new(transport)
            .execute(valid_args(), &ToolRuntime::new())
            .await
            .unwrap();

        assert_eq!(result.data.unwrap()["id"], "msg-42");
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let tool = EmailTool::new(WebhookTransport::new(server.uri()));
        let err = tool.execute(valid_args(), &ToolRuntime::new()).await.unwrap_err();

        match err {
            ToolError::Transport(msg) => assert!(msg.contains("502")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
