//! Argument-shape validation middleware.

use anyhow::bail;
use serde_json::Value;

use super::{CallScope, Hooks, Middleware};

/// Asserts the tool's arguments are a JSON object (not null, not an array)
/// before the tool runs. Per-field validation is the plugin's concern
/// (see `plugins::validation`); this middleware only guards the envelope
/// shape every handler assumes.
pub struct ValidationMiddleware;

#[async_trait::async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    fn hooks(&self) -> Hooks {
        Hooks::before_only()
    }

    async fn before_tool_call(
        &self,
        tool: &str,
        params: &Value,
        _scope: &CallScope,
    ) -> anyhow::Result<()> {
        if !params.is_object() {
            bail!("Arguments for tool {} must be an object", tool);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn rejects_non_object_arguments() {
        let mw = ValidationMiddleware;
        let scope = CallScope::default();
        assert!(mw
            .before_tool_call("demo:echo", &json!({"text": "hi"}), &scope)
            .await
            .is_ok());
        assert!(mw
            .before_tool_call("demo:echo", &json!(null), &scope)
            .await
            .is_err());
        assert!(mw
            .before_tool_call("demo:echo", &json!([1, 2]), &scope)
            .await
            .is_err());
    }
}
