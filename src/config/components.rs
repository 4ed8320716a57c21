/// Harbor configuration components module.
///
/// This module defines user-facing configuration structures and enums for the
/// Harbor server. It provides the building blocks for the root `ServerConfig`
/// in `mod.rs`.
use super::defaults;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Logging levels supported by Harbor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Debug-level logging (verbose).
    Debug,
    /// Info-level logging (default).
    Info,
    /// Warning-level logging.
    Warn,
    /// Error-level logging only.
    Error,
}

/// Display implementation for LogLevel.
///
/// Formats the log level as a lowercase string usable as an `EnvFilter`
/// directive.
impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        write!(f, "{}", s)
    }
}

/// Transport selection for the CLI (`--transport`), mapped onto the richer
/// `TransportConfig` from the config file.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportChoice {
    /// Standard I/O transport.
    #[default]
    Stdio,
    /// HTTP POST transport.
    Http,
    /// WebSocket transport.
    Websocket,
}

/// Transport configuration, tagged by `type` in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Line-delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// JSON-RPC over a single HTTP POST endpoint.
    Http {
        #[serde(default)]
        options: HttpOptions,
    },
    /// JSON-RPC over a long-lived WebSocket channel.
    Websocket {
        #[serde(default)]
        options: WebSocketOptions,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Stdio
    }
}

impl TransportConfig {
    /// Builds the config variant matching a CLI transport choice, with
    /// default options.
    pub fn from_choice(choice: TransportChoice) -> Self {
        match choice {
            TransportChoice::Stdio => TransportConfig::Stdio,
            TransportChoice::Http => TransportConfig::Http {
                options: HttpOptions::default(),
            },
            TransportChoice::Websocket => TransportConfig::Websocket {
                options: WebSocketOptions::default(),
            },
        }
    }
}

/// Options for the HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpOptions {
    /// Bind host.
    #[serde(default = "defaults::default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "defaults::default_http_port")]
    pub port: u16,

    /// CORS settings; `None` disables the CORS layer.
    #[serde(default)]
    pub cors: Option<CorsConfig>,

    /// Maximum accepted request body size in bytes.
    #[serde(default = "defaults::default_max_body_size")]
    pub max_body_size: usize,

    /// Whether to trust `x-forwarded-for` for the peer address.
    #[serde(default = "defaults::default_false")]
    pub trust_proxy: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            host: defaults::default_host(),
            port: defaults::default_http_port(),
            cors: None,
            max_body_size: defaults::default_max_body_size(),
            trust_proxy: defaults::default_false(),
        }
    }
}

impl HttpOptions {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Options for the WebSocket transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketOptions {
    /// Bind host.
    #[serde(default = "defaults::default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "defaults::default_ws_port")]
    pub port: u16,

    /// Endpoint path for the upgrade request.
    #[serde(default = "defaults::default_ws_path")]
    pub path: String,

    /// Heartbeat interval in milliseconds. A connection that misses a pong
    /// between two beats is terminated.
    #[serde(default = "defaults::default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Maximum concurrent connections; excess sockets are closed with 1013.
    #[serde(default = "defaults::default_max_connections")]
    pub max_connections: usize,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            host: defaults::default_host(),
            port: defaults::default_ws_port(),
            path: defaults::default_ws_path(),
            heartbeat_interval_ms: defaults::default_heartbeat_interval_ms(),
            max_connections: defaults::default_max_connections(),
        }
    }
}

impl WebSocketOptions {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// CORS configuration for the HTTP transport.
///
/// `origins` is "*" for all origins or a comma-separated list of exact
/// origins. Method/header lists default to "any" when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated list of allowed origins, or "*" for all origins.
    #[serde(default = "defaults::default_cors_origins")]
    pub origins: String,

    /// Whether to allow credentials.
    #[serde(default = "defaults::default_false")]
    pub allow_credentials: bool,

    /// Allowed methods (if `None`, allows any).
    #[serde(default)]
    pub methods: Option<Vec<String>>,

    /// Allowed headers (if `None`, allows any).
    #[serde(default)]
    pub headers: Option<Vec<String>>,

    /// Preflight max-age in seconds.
    #[serde(default)]
    pub max_age_seconds: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: defaults::default_cors_origins(),
            allow_credentials: defaults::default_false(),
            methods: None,
            headers: None,
            max_age_seconds: None,
        }
    }
}

impl CorsConfig {
    /// Creates a `tower_http` CORS layer from the configuration.
    ///
    /// Parses the origins string: "*" allows all origins, otherwise each
    /// comma-separated entry is matched exactly. Unparseable entries are
    /// skipped; an empty result falls back to allowing all.
    pub fn into_layer(self) -> tower_http::cors::CorsLayer {
        use axum::http::{HeaderName, Method};
        use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

        let allow_origin = if self.origins.trim() == "*" {
            AllowOrigin::any()
        } else {
            let origin_list: Vec<_> = self
                .origins
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .filter_map(|s| s.parse().ok())
                .collect();

            tracing::debug!("Parsed CORS origins: {:?} from {:?}", origin_list, self.origins);

            if origin_list.is_empty() {
                tracing::warn!("No valid CORS origins specified, defaulting to allow all");
                AllowOrigin::any()
            } else {
                AllowOrigin::list(origin_list)
            }
        };

        let mut layer = CorsLayer::new().allow_origin(allow_origin);

        layer = match self.methods {
            Some(methods) => layer.allow_methods(AllowMethods::list(
                methods.iter().filter_map(|m| m.parse::<Method>().ok()),
            )),
            None => layer.allow_methods(AllowMethods::any()),
        };

        layer = match self.headers {
            Some(headers) => layer.allow_headers(AllowHeaders::list(
                headers
                    .iter()
                    .filter_map(|h| h.parse::<HeaderName>().ok())
                    .collect::<Vec<_>>(),
            )),
            None => layer.allow_headers(AllowHeaders::any()),
        };

        if let Some(max_age) = self.max_age_seconds {
            layer = layer.max_age(Duration::from_secs(max_age));
        }

        layer.allow_credentials(self.allow_credentials)
    }
}

/// Rate-limit key granularity.
///
/// The built-in limiter keys by tool name; per-session and per-user widen
/// the key with the caller identity for deployments that need fairness
/// across callers.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitKey {
    /// One window per tool, shared by all callers.
    #[default]
    PerTool,
    /// One window per (tool, session) pair.
    PerSession,
    /// One window per (tool, user) pair.
    PerUser,
}

/// Rate-limit middleware options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitOptions {
    /// Calls allowed inside one window.
    #[serde(default = "defaults::default_rate_limit_max_calls")]
    pub max_calls: u32,

    /// Window length in milliseconds.
    #[serde(default = "defaults::default_rate_limit_window_ms")]
    pub window_ms: u64,

    /// Key granularity.
    #[serde(default)]
    pub key: RateLimitKey,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            max_calls: defaults::default_rate_limit_max_calls(),
            window_ms: defaults::default_rate_limit_window_ms(),
            key: RateLimitKey::default(),
        }
    }
}

impl RateLimitOptions {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Middleware pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiddlewareOptions {
    /// Enable the built-in logging middleware.
    #[serde(default = "defaults::default_true")]
    pub logging: bool,

    /// Enable the built-in argument-shape validation middleware.
    #[serde(default = "defaults::default_true")]
    pub validation: bool,

    /// Rate-limit settings; `None` disables the limiter.
    #[serde(default)]
    pub rate_limit: Option<RateLimitOptions>,

    /// Run the pipeline around `resources/read` and `prompts/get` too.
    /// The upstream platform covered only `tools/call`.
    #[serde(default = "defaults::default_false")]
    pub cover_resources_and_prompts: bool,
}

impl Default for MiddlewareOptions {
    fn default() -> Self {
        Self {
            logging: defaults::default_true(),
            validation: defaults::default_true(),
            rate_limit: None,
            cover_resources_and_prompts: defaults::default_false(),
        }
    }
}

/// Session handling options for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Sessions idle longer than this are removed by `cleanup`.
    #[serde(default = "defaults::default_session_timeout_minutes")]
    pub timeout_minutes: u64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout_minutes: defaults::default_session_timeout_minutes(),
        }
    }
}

impl SessionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes * 60)
    }
}
