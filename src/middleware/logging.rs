//! Logging middleware: records tool entry, exit, and errors.

use serde_json::Value;

use super::{CallScope, Hooks, Middleware};

/// Logs every tool invocation through the process tracing subscriber.
pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn hooks(&self) -> Hooks {
        Hooks::all()
    }

    async fn before_tool_call(
        &self,
        tool: &str,
        _params: &Value,
        scope: &CallScope,
    ) -> anyhow::Result<()> {
        tracing::info!(
            session = scope.session_id.as_deref().unwrap_or("-"),
            "Tool call start: {}",
            tool
        );
        Ok(())
    }

    async fn after_tool_call(
        &self,
        tool: &str,
        _params: &Value,
        _result: &Value,
        _scope: &CallScope,
    ) -> anyhow::Result<()> {
        tracing::info!("Tool call end: {}", tool);
        Ok(())
    }

    async fn on_error(&self, context: &str, error: &anyhow::Error) {
        tracing::error!("Tool call failed: {}: {}", context, error);
    }
}
