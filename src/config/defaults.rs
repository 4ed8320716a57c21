/// Harbor configuration defaults module.
///
/// Default value helpers for serde deserialization in config structs. These
/// keep defaulting consistent across `components.rs` and `mod.rs`, and cover
/// cases where entire config blocks are missing from the configuration file.
use super::components::LogLevel;

/// Default log level.
///
/// Returns `LogLevel::Info`.
pub(crate) fn default_log_level() -> LogLevel {
    LogLevel::Info
}

/// Default server name advertised in the `initialize` handshake.
pub(crate) fn default_server_name() -> String {
    "harbor".to_string()
}

/// Default server version advertised in the `initialize` handshake.
pub(crate) fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Default HTTP bind host.
pub(crate) fn default_host() -> String {
    "127.0.0.1".to_string()
}

/// Default HTTP transport port.
pub(crate) fn default_http_port() -> u16 {
    3000
}

/// Default WebSocket transport port.
pub(crate) fn default_ws_port() -> u16 {
    3001
}

/// Default WebSocket endpoint path.
pub(crate) fn default_ws_path() -> String {
    "/ws".to_string()
}

/// Default WebSocket heartbeat interval in milliseconds.
pub(crate) fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

/// Default WebSocket connection cap.
pub(crate) fn default_max_connections() -> usize {
    100
}

/// Default HTTP body-size limit in bytes (1 MiB).
pub(crate) fn default_max_body_size() -> usize {
    1024 * 1024
}

/// Default CORS origins ("*" allows all).
pub(crate) fn default_cors_origins() -> String {
    "*".to_string()
}

/// Default session timeout in minutes.
pub(crate) fn default_session_timeout_minutes() -> u64 {
    30
}

/// Default rate-limit window in milliseconds.
pub(crate) fn default_rate_limit_window_ms() -> u64 {
    60_000
}

/// Default rate-limit call budget per window.
pub(crate) fn default_rate_limit_max_calls() -> u32 {
    100
}

/// Default true value.
pub(crate) fn default_true() -> bool {
    true
}

/// Default false value.
pub(crate) fn default_false() -> bool {
    false
}
