use serde_json::Value;
use thiserror::Error;

/// Errors raised while a plugin registers its capabilities.
///
/// These are raised synchronously from the registration call and prevent
/// server start.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("Plugin id must not be empty")]
    EmptyPluginId,

    #[error("Plugin '{0}' is already registered")]
    DuplicatePlugin(String),

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Resource uri '{0}' is already registered")]
    DuplicateResource(String),

    #[error("Prompt '{0}' is already registered")]
    DuplicatePrompt(String),

    #[error("Tool '{tool}' requires '{field}' which is not a declared property")]
    RequiredNotDeclared { tool: String, field: String },

    #[error("Tool '{0}' has no handler")]
    MissingHandler(String),

    #[error("Registration context for plugin '{0}' is sealed")]
    Sealed(String),

    #[error("Plugin initialization failed: {0}")]
    InitFailed(String),
}

/// Transport-level failures (bind, socket, shutdown, unsupported operations).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Broadcast is not supported on the {0} transport")]
    BroadcastUnsupported(&'static str),

    #[error("Request handler was not wired before start")]
    NoHandler,
}

/// Failures from the session store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session store backend error: {0}")]
    Backend(String),

    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Orchestrator-level failures.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session '{0}' has no active workflow")]
    NoActiveWorkflow(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A single-field validation failure from the validation toolkit.
///
/// Carries the offending field, the value that failed, and a human-readable
/// message. Surfaced to callers as a JSON-RPC internal error with the
/// combined message.
#[derive(Debug, Error)]
#[error("Validation failed for '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub value: Value,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, value: Value, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value,
            message: message.into(),
        }
    }
}
