//! Sliding-window rate limiting per tool.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::bail;
use serde_json::Value;

use super::{CallScope, Hooks, Middleware};
use crate::config::{RateLimitKey, RateLimitOptions};

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Enforces `max_calls` per `window` for each limiter key.
///
/// The default key is the tool name alone, shared across all callers;
/// per-session and per-user granularity widen the key with the caller
/// identity. The read-check-increment is one atomic step under the map
/// mutex, so the limit holds under contention.
pub struct RateLimitMiddleware {
    max_calls: u32,
    window: Duration,
    key: RateLimitKey,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimitMiddleware {
    pub fn new(options: RateLimitOptions) -> Self {
        Self {
            max_calls: options.max_calls,
            window: options.window(),
            key: options.key,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn limiter_key(&self, tool: &str, scope: &CallScope) -> String {
        match self.key {
            RateLimitKey::PerTool => tool.to_string(),
            RateLimitKey::PerSession => format!(
                "{}#{}",
                tool,
                scope.session_id.as_deref().unwrap_or("anonymous")
            ),
            RateLimitKey::PerUser => format!(
                "{}#{}",
                tool,
                scope.user_id.as_deref().unwrap_or("anonymous")
            ),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate-limit"
    }

    fn hooks(&self) -> Hooks {
        Hooks::before_only()
    }

    async fn before_tool_call(
        &self,
        tool: &str,
        _params: &Value,
        scope: &CallScope,
    ) -> anyhow::Result<()> {
        let key = self.limiter_key(tool, scope);
        let now = Instant::now();

        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match windows.get_mut(&key) {
            Some(window) if now > window.reset_at => {
                window.count = 1;
                window.reset_at = now + self.window;
            }
            Some(window) => {
                if window.count >= self.max_calls {
                    bail!("Rate limit exceeded for tool {}", tool);
                }
                window.count += 1;
            }
            None => {
                windows.insert(
                    key,
                    Window {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limiter(max_calls: u32, window_ms: u64, key: RateLimitKey) -> RateLimitMiddleware {
        RateLimitMiddleware::new(RateLimitOptions {
            max_calls,
            window_ms,
            key,
        })
    }

    #[tokio::test]
    async fn blocks_call_over_budget_and_reopens_after_window() {
        let mw = limiter(2, 40, RateLimitKey::PerTool);
        let scope = CallScope::default();
        let args = json!({});

        assert!(mw.before_tool_call("demo:echo", &args, &scope).await.is_ok());
        assert!(mw.before_tool_call("demo:echo", &args, &scope).await.is_ok());
        let err = mw
            .before_tool_call("demo:echo", &args, &scope)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("demo:echo"));

        // A different tool has its own window.
        assert!(mw.before_tool_call("demo:other", &args, &scope).await.is_ok());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(mw.before_tool_call("demo:echo", &args, &scope).await.is_ok());
    }

    #[tokio::test]
    async fn per_session_key_isolates_callers() {
        let mw = limiter(1, 60_000, RateLimitKey::PerSession);
        let args = json!({});
        let alice = CallScope {
            session_id: Some("s-alice".to_string()),
            user_id: None,
        };
        let bob = CallScope {
            session_id: Some("s-bob".to_string()),
            user_id: None,
        };

        assert!(mw.before_tool_call("demo:echo", &args, &alice).await.is_ok());
        assert!(mw.before_tool_call("demo:echo", &args, &alice).await.is_err());
        assert!(mw.before_tool_call("demo:echo", &args, &bob).await.is_ok());
    }
}
