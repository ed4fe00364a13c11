//! Turn callbacks
//!
//! Observers are invoked synchronously from the loop. They must not fail;
//! a panicking observer panics the turn.

use tracing::{debug, info, warn};

use super::machine::Plan;

/// Hooks fired while a turn runs. Every method defaults to a no-op.
pub trait TurnObserver: Send + Sync {
    fn on_plan(&self, _iteration: usize, _plan: &Plan) {}

    fn on_tool_start(&self, _tool_name: &str, _args: &serde_json::Value) {}

    fn on_tool_end(&self, _tool_name: &str, _output: &str) {}

    fn on_tool_error(&self, _tool_name: &str, _error: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TurnObserver for NoopObserver {}

/// Reports every callback as a tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TurnObserver for TracingObserver {
    fn on_plan(&self, iteration: usize, plan: &Plan) {
        info!(iteration, decision = plan.decision(), tool = ?plan.tool_name(), "Plan");
    }

    fn on_tool_start(&self, tool_name: &str, args: &serde_json::Value) {
        info!(tool = tool_name, %args, "Tool start");
    }

    fn on_tool_end(&self, tool_name: &str, output: &str) {
        debug!(tool = tool_name, output_len = output.len(), "Tool end");
    }

    fn on_tool_error(&self, tool_name: &str, error: &str) {
        warn!(tool = tool_name, error, "Tool error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl TurnObserver for Recorder {
        fn on_tool_start(&self, tool_name: &str, _args: &serde_json::Value) {
            self.0.lock().unwrap().push(format!("start:{tool_name}"));
        }
    }

    #[test]
    fn test_unimplemented_hooks_are_noops() {
        let recorder = Recorder::default();
        let observer: &dyn TurnObserver = &recorder;

        observer.on_plan(1, &Plan::Finalize("hi".into()));
        observer.on_tool_start("send_email", &serde_json::json!({}));
        observer.on_tool_end("send_email", "ok");

        assert_eq!(*recorder.0.lock().unwrap(), vec!["start:send_email"]);
    }
}
