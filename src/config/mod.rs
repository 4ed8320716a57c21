pub use components::{
    CorsConfig, HttpOptions, LogLevel, MiddlewareOptions, RateLimitKey, RateLimitOptions,
    SessionOptions, TransportChoice, TransportConfig, WebSocketOptions,
};
use serde::{Deserialize, Serialize};
/**
 * Harbor configuration root module.
 *
 * - Defines the root configuration struct (`ServerConfig`) and its defaults.
 * - Provides config file loading, CLI/env override logic, and error reporting.
 * - Uses `components.rs` for types/enums and `defaults.rs` for default helpers.
 */
use std::collections::BTreeMap;
use std::{path::Path, path::PathBuf};
use thiserror::Error;

pub mod components;
pub mod defaults;

/// Per-plugin configuration maps, keyed by plugin id. Each plugin receives
/// its map through the registration context during `initialize`.
pub type PluginConfigMap = BTreeMap<String, BTreeMap<String, String>>;

// Root configuration for the Harbor server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name advertised in the `initialize` handshake.
    #[serde(default = "defaults::default_server_name")]
    pub name: String,

    /// Server version advertised in the `initialize` handshake.
    #[serde(default = "defaults::default_server_version")]
    pub version: String,

    /// Log level seed for the tracing filter (`RUST_LOG` overrides).
    #[serde(default = "defaults::default_log_level")]
    pub log_level: LogLevel,

    /// Transport selection and per-transport options.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Convenience alias for HTTP CORS; merged into the HTTP transport
    /// options when those carry no CORS block of their own.
    #[serde(default)]
    pub cors: Option<CorsConfig>,

    /// Middleware pipeline settings.
    #[serde(default)]
    pub middleware: MiddlewareOptions,

    /// Orchestrator session settings.
    #[serde(default)]
    pub session: SessionOptions,

    /// Per-plugin configuration maps.
    #[serde(default)]
    pub plugin_config: PluginConfigMap,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: defaults::default_server_name(),
            version: defaults::default_server_version(),
            log_level: defaults::default_log_level(),
            transport: TransportConfig::default(),
            cors: None,
            middleware: MiddlewareOptions::default(),
            session: SessionOptions::default(),
            plugin_config: PluginConfigMap::new(),
        }
    }
}

impl ServerConfig {
    /// Compute the default configuration file path.
    pub fn default_path() -> PathBuf {
        // Allow override via environment variable
        if let Some(override_path) = std::env::var_os("HARBOR_CONFIG_PATH") {
            return PathBuf::from(override_path);
        }
        if cfg!(target_os = "windows") {
            let home = std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .unwrap_or_default();
            let mut p = PathBuf::from(home);
            p.push("harbor");
            p.push("config");
            p
        } else {
            PathBuf::from("/").join("etc").join("harbor").join("config")
        }
    }

    /// Load config from file and apply CLI overrides.
    ///
    /// Loads configuration from a YAML file if it exists, otherwise uses
    /// defaults. Then applies command-line overrides with highest precedence.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to the configuration file. Uses the default path if None.
    /// * `transport` - Optional transport override.
    /// * `bind_address` - Optional "host:port" override for HTTP/WebSocket transports.
    /// * `log_level` - Optional log level override.
    ///
    /// # Returns
    /// The loaded and overridden configuration, or a ConfigError.
    pub fn load_with_overrides(
        config_path: Option<PathBuf>,
        transport: Option<TransportChoice>,
        bind_address: Option<String>,
        log_level: Option<LogLevel>,
    ) -> Result<Self, ConfigError> {
        let path = config_path.unwrap_or_else(Self::default_path);

        let mut cfg = if path.exists() {
            tracing::debug!("Reading from configuration file {:?}", path);
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::Parse(path.clone(), format!("I/O error: {}", e)))?;
            Self::parse_yaml_with_path(&path, &text)?
        } else {
            tracing::warn!(
                "No configuration file (checked {:?}) initializing with defaults",
                path
            );
            Self::default()
        };

        // Apply CLI/env overrides (highest precedence)
        if let Some(choice) = transport {
            cfg.transport = match (choice, cfg.transport) {
                // Keep file-provided options when the choice matches the file.
                (TransportChoice::Http, t @ TransportConfig::Http { .. }) => t,
                (TransportChoice::Websocket, t @ TransportConfig::Websocket { .. }) => t,
                (choice, _) => TransportConfig::from_choice(choice),
            };
        }
        if let Some(addr) = bind_address {
            cfg.apply_bind_address(&addr)?;
        }
        if let Some(level) = log_level {
            cfg.log_level = level;
        }

        // The top-level cors alias fills in HTTP options that carry none.
        if let (Some(cors), TransportConfig::Http { options }) =
            (cfg.cors.clone(), &mut cfg.transport)
            && options.cors.is_none()
        {
            options.cors = Some(cors);
        }

        Ok(cfg)
    }

    /// Applies a "host:port" override to the active transport options.
    fn apply_bind_address(&mut self, addr: &str) -> Result<(), ConfigError> {
        let (host, port) = addr.rsplit_once(':').ok_or_else(|| {
            ConfigError::Override(format!("bind address '{}' is not host:port", addr))
        })?;
        let port: u16 = port
            .parse()
            .map_err(|_| ConfigError::Override(format!("invalid port in '{}'", addr)))?;

        match &mut self.transport {
            TransportConfig::Http { options } => {
                options.host = host.to_string();
                options.port = port;
            }
            TransportConfig::Websocket { options } => {
                options.host = host.to_string();
                options.port = port;
            }
            TransportConfig::Stdio => {
                return Err(ConfigError::Override(
                    "bind address is meaningless for the stdio transport".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Parse YAML configuration with enhanced error reporting.
    ///
    /// Uses serde_yaml_ng to parse the YAML text, and includes line/column
    /// information in error messages for better debugging.
    fn parse_yaml_with_path(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_yaml_ng::from_str::<Self>(text).map_err(|e| {
            let msg = if let Some(loc) = e.location() {
                format!(
                    "yaml error at line {}, column {}: {}",
                    loc.line(),
                    loc.column(),
                    e
                )
            } else {
                format!("yaml error: {}", e)
            };

            ConfigError::Parse(path.to_path_buf(), msg)
        })
    }

    /// Configuration map for one plugin id (empty when none is declared).
    pub fn plugin_config_for(&self, plugin_id: &str) -> BTreeMap<String, String> {
        self.plugin_config
            .get(plugin_id)
            .cloned()
            .unwrap_or_default()
    }
}

// Errors during configuration loading/parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to parse configuration content.
    ///
    /// Tuple fields:
    /// - 0: Path to the configuration file that failed to parse
    /// - 1: Error message from the underlying parser
    #[error("Failed to parse {0}: {1}")]
    Parse(PathBuf, String),

    /// A CLI override could not be applied.
    #[error("Invalid override: {0}")]
    Override(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_stdio() {
        let cfg = ServerConfig::default();
        assert!(matches!(cfg.transport, TransportConfig::Stdio));
        assert_eq!(cfg.log_level, LogLevel::Info);
    }

    #[test]
    fn yaml_transport_block_parses() {
        let text = r#"
name: demo
transport:
  type: http
  options:
    port: 8080
    trust_proxy: true
middleware:
  rate_limit:
    max_calls: 2
    window_ms: 60000
"#;
        let cfg: ServerConfig = serde_yaml_ng::from_str(text).unwrap();
        match cfg.transport {
            TransportConfig::Http { options } => {
                assert_eq!(options.port, 8080);
                assert!(options.trust_proxy);
            }
            other => panic!("expected http transport, got {:?}", other),
        }
        let rl = cfg.middleware.rate_limit.expect("rate limit block");
        assert_eq!(rl.max_calls, 2);
        assert_eq!(rl.window_ms, 60_000);
    }

    #[test]
    fn cors_alias_fills_http_options() {
        let text = r#"
transport:
  type: http
cors:
  origins: "https://app.example.com"
"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, text).unwrap();
        let cfg = ServerConfig::load_with_overrides(Some(path), None, None, None).unwrap();
        match cfg.transport {
            TransportConfig::Http { options } => {
                assert_eq!(
                    options.cors.expect("cors merged").origins,
                    "https://app.example.com"
                );
            }
            other => panic!("expected http transport, got {:?}", other),
        }
    }
}
