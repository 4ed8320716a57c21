//! The middleware pipeline wrapped around tool invocations.
//!
//! Middlewares advertise which hooks they implement through [`Hooks`]; the
//! pipeline only executes advertised hooks. Execution order for one call:
//! every `before_tool_call` in registration order, the tool itself, every
//! `after_tool_call` in registration order. On any failure anywhere
//! (including a failing before hook, which prevents the tool from running)
//! every `on_error` fires in registration order and the failure propagates
//! to the kernel, which renders it as a JSON-RPC internal error.

pub mod logging;
pub mod rate_limit;
pub mod validation;

use std::sync::Arc;

use serde_json::Value;

use crate::config::MiddlewareOptions;

/// Caller identity for one pipeline run, threaded explicitly so hooks that
/// key on the caller (e.g. per-session rate limits) can see it.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

/// Which hooks a middleware implements.
#[derive(Debug, Clone, Copy)]
pub struct Hooks {
    pub before: bool,
    pub after: bool,
    pub error: bool,
}

impl Hooks {
    pub const fn all() -> Self {
        Self {
            before: true,
            after: true,
            error: true,
        }
    }

    pub const fn before_only() -> Self {
        Self {
            before: true,
            after: false,
            error: false,
        }
    }
}

/// A pre-call / post-call / on-error hook set around tool invocations.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Which hooks the pipeline should execute for this middleware.
    fn hooks(&self) -> Hooks {
        Hooks::all()
    }

    /// Runs before the tool. A failure aborts the call; the tool is not
    /// invoked.
    async fn before_tool_call(
        &self,
        _tool: &str,
        _params: &Value,
        _scope: &CallScope,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after a successful tool invocation.
    async fn after_tool_call(
        &self,
        _tool: &str,
        _params: &Value,
        _result: &Value,
        _scope: &CallScope,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Observes a failure from any stage. Observable but non-recovering.
    async fn on_error(&self, _context: &str, _error: &anyhow::Error) {}
}

/// Ordered chain of middlewares executed around every `tools/call`.
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    entries: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the pipeline of built-ins selected by configuration, in the
    /// fixed order logging, validation, rate limit.
    pub fn from_options(options: &MiddlewareOptions) -> Self {
        let mut pipeline = Self::new();
        if options.logging {
            pipeline.push(Arc::new(logging::LoggingMiddleware));
        }
        if options.validation {
            pipeline.push(Arc::new(validation::ValidationMiddleware));
        }
        if let Some(rl) = &options.rate_limit {
            pipeline.push(Arc::new(rate_limit::RateLimitMiddleware::new(rl.clone())));
        }
        pipeline
    }

    /// Appends a middleware; registration order is execution order.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.entries.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Wraps `invoke` with the full hook sequence.
    pub async fn execute<F>(
        &self,
        tool: &str,
        params: &Value,
        scope: &CallScope,
        invoke: F,
    ) -> anyhow::Result<Value>
    where
        F: std::future::Future<Output = anyhow::Result<Value>>,
    {
        for m in &self.entries {
            if m.hooks().before
                && let Err(e) = m.before_tool_call(tool, params, scope).await
            {
                tracing::debug!("Middleware '{}' aborted call to '{}'", m.name(), tool);
                self.fire_on_error(tool, &e).await;
                return Err(e);
            }
        }

        let result = match invoke.await {
            Ok(result) => result,
            Err(e) => {
                self.fire_on_error(tool, &e).await;
                return Err(e);
            }
        };

        for m in &self.entries {
            if m.hooks().after
                && let Err(e) = m.after_tool_call(tool, params, &result, scope).await
            {
                self.fire_on_error(tool, &e).await;
                return Err(e);
            }
        }

        Ok(result)
    }

    async fn fire_on_error(&self, context: &str, error: &anyhow::Error) {
        for m in &self.entries {
            if m.hooks().error {
                m.on_error(context, error).await;
            }
        }
    }
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.entries.iter().map(|m| m.name()).collect();
        f.debug_struct("MiddlewarePipeline")
            .field("entries", &names)
            .finish()
    }
}
