//! TaskerBot loop tests against scripted providers
//!
//! Run with: `cargo test --test tasker_loop`

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use common::{CountingTransport, QueuedLLM};
use rig_taskerbot::state::{HistoryRecord, Role};
use rig_taskerbot::tasker::{ExecutionResult, Metered, ValidationVerdict, FEEDBACK_PREFIX};
use rig_taskerbot::{
    BotProfile, ChatBot, EmailTool, HeuristicValidator, TaskerBot, TaskerError, TextClassifier,
    ToolCallStatus, ToolRegistry, Validator,
};

static_assertions::assert_impl_all!(TaskerBot: Send, Sync);
static_assertions::assert_impl_all!(ChatBot: Send, Sync);
static_assertions::assert_impl_all!(TextClassifier: Send, Sync);
static_assertions::assert_impl_all!(TaskerError: Send, Sync, std::error::Error);

/// Rejects everything and counts how often it was asked
#[derive(Default)]
struct RejectAll {
    calls: AtomicUsize,
}

#[async_trait]
impl Validator for RejectAll {
    async fn validate(
        &self,
        _task: &str,
        _result: &ExecutionResult,
    ) -> Result<Metered<ValidationVerdict>, TaskerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Metered::new(ValidationVerdict::reject("not good enough")))
    }
}

fn email_registry(transport: &CountingTransport) -> ToolRegistry {
    ToolRegistry::new().with_tool(Arc::new(EmailTool::new(transport.clone())))
}

fn full_email() -> serde_json::Value {
    json!({"to_email": "ana@example.com", "subject": "Invoice", "message": "Attached."})
}

#[tokio::test]
async fn test_loaded_history_reaches_planner() {
    let llm = Arc::new(
        QueuedLLM::new()
            .reply(r#"{"final_answer": "The user asked for their own name"}"#)
            .reply("Your name is Erley."),
    );
    let mut bot = TaskerBot::new(llm.clone(), BotProfile::default(), ToolRegistry::new());
    bot.load_conversation_history(&[
        HistoryRecord::user("Hi, my name is Erley"),
        HistoryRecord::bot("Nice to meet you, Erley!"),
    ]);

    let response = bot.get_response("What is my name?").await.unwrap();

    assert_eq!(response.content, "Your name is Erley.");
    assert!(llm
        .request(0)
        .iter()
        .any(|m| m.role == Role::User && m.content == "Hi, my name is Erley"));
    assert_eq!(bot.history().len(), 4);
    assert_eq!(bot.history()[2].content, "What is my name?");
}

#[tokio::test]
async fn test_empty_planner_reply_still_gets_an_answer() {
    let llm = Arc::new(QueuedLLM::new().reply("").reply("Hello! How can I help?"));
    let mut bot = TaskerBot::new(llm.clone(), BotProfile::default(), ToolRegistry::new());

    let response = bot.get_response("hi").await.unwrap();

    assert_eq!(response.content, "Hello! How can I help?");
    assert_eq!(llm.calls(), 2);
    assert_eq!(bot.history().len(), 2);
    assert_eq!(bot.history()[1].content, "Hello! How can I help?");
}

#[tokio::test]
async fn test_recursion_limit_after_exactly_max_cycles() {
    let transport = CountingTransport::default();
    let llm = Arc::new(
        QueuedLLM::new()
            .tool_call("send_email", full_email())
            .tool_call("send_email", full_email())
            .tool_call("send_email", full_email()),
    );
    let validator = Arc::new(RejectAll::default());
    let mut bot = TaskerBot::new(llm.clone(), BotProfile::default(), email_registry(&transport))
        .with_validator(validator.clone())
        .with_max_iterations(2);

    let err = bot.get_response("Email Ana the invoice").await.unwrap_err();

    assert!(matches!(err, TaskerError::RecursionLimit { limit: 2 }));
    assert_eq!(validator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(llm.calls(), 2);
    // side effects of rejected passes are kept
    assert_eq!(transport.sent(), 2);
    assert!(bot.history().is_empty());
}

#[tokio::test]
async fn test_email_with_all_arguments_is_sent() {
    let transport = CountingTransport::default();
    let llm = Arc::new(
        QueuedLLM::new()
            .tool_call("send_email", full_email())
            .reply("I sent Ana the invoice."),
    );
    let mut bot = TaskerBot::new(llm.clone(), BotProfile::default(), email_registry(&transport))
        .with_validator(Arc::new(HeuristicValidator::new()));

    let response = bot.get_response("Email Ana the invoice").await.unwrap();

    assert_eq!(response.content, "I sent Ana the invoice.");
    assert_eq!(transport.sent(), 1);
    assert_eq!(response.tool_calls_used.len(), 1);
    assert_eq!(response.tool_calls_used[0].status, ToolCallStatus::Success);
    assert!(response.tool_calls_used[0].output.contains("ana@example.com"));
}

#[tokio::test]
async fn test_email_missing_argument_is_never_sent() {
    let transport = CountingTransport::default();
    let llm = Arc::new(
        QueuedLLM::new()
            .tool_call("send_email", json!({"to_email": "ana@example.com", "subject": "Invoice"}))
            .reply(r#"{"final_answer": "Ask what the email should say"}"#)
            .reply("What should the email to Ana say?"),
    );
    let mut bot = TaskerBot::new(llm.clone(), BotProfile::default(), email_registry(&transport))
        .with_validator(Arc::new(HeuristicValidator::new()));

    let response = bot.get_response("Email Ana").await.unwrap();

    assert_eq!(response.content, "What should the email to Ana say?");
    assert_eq!(transport.sent(), 0);
    assert_eq!(response.tool_calls_used[0].status, ToolCallStatus::Failed);
    assert_eq!(llm.calls(), 3);

    let replan = llm.request(1);
    assert!(replan
        .iter()
        .any(|m| m.role == Role::Tool && m.status.as_deref() == Some("error")));
    assert!(replan
        .iter()
        .any(|m| m.role == Role::System && m.content.starts_with(FEEDBACK_PREFIX)));
}

#[tokio::test]
async fn test_unknown_tool_is_reported_to_planner() {
    let llm = Arc::new(
        QueuedLLM::new()
            .tool_call("book_flight", json!({"to": "Lima"}))
            .reply("I can't book flights, sorry.")
            .reply("I can't book flights, sorry."),
    );
    let mut bot = TaskerBot::new(llm.clone(), BotProfile::default(), ToolRegistry::new())
        .with_validator(Arc::new(HeuristicValidator::new()));

    let response = bot.get_response("Book me a flight to Lima").await.unwrap();

    assert_eq!(response.tool_calls_used[0].status, ToolCallStatus::Failed);
    assert!(llm
        .request(1)
        .iter()
        .any(|m| m.role == Role::Tool && m.content.contains("Tool book_flight not found")));
}
