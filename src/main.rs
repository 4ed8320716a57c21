//! Harbor server entry point.
//!
//! This module contains the main entry point for the Harbor MCP server
//! platform. It handles command-line argument parsing, configuration loading,
//! plugin registration, and server startup.
//!
//! # Responsibilities
//!
//! - Parse CLI arguments and environment variables (via Clap)
//! - Load configuration from file, environment, and CLI overrides
//! - Initialize logging (stderr when the stdio transport is selected)
//! - Register plugins and build the middleware pipeline
//! - Start the selected transport and the session-cleanup task
//! - Run orderly shutdown on SIGINT/SIGTERM
//!
//! # Application Lifecycle
//!
//! The server follows a structured initialization sequence:
//! 1. **Unknown** → Parse CLI args
//! 2. **Initializing** → Load configuration
//! 3. **LoadingPlugins** → Register plugins and their capabilities
//! 4. **StartingNetwork** → Wire the kernel to the transport and start it
//! 5. **Ready** → Server is fully operational
//! 6. **Terminating** → Server is shutting down

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use harbor::config::{LogLevel, ServerConfig, TransportChoice, TransportConfig};
use harbor::middleware::MiddlewarePipeline;
use harbor::orchestrator::Orchestrator;
use harbor::orchestrator::store::InMemorySessionStore;
use harbor::plugins::{self, host::PluginHost};
use harbor::server::ServerKernel;
use harbor::state::{AppState, ApplicationState};
use harbor::transport::http::HttpTransport;
use harbor::transport::stdio::StdioTransport;
use harbor::transport::websocket::WebSocketTransport;
use harbor::transport::{Transport, kernel_handler};

/// CLI arguments definition for the Harbor server.
///
/// This struct defines all command-line arguments and environment variables
/// supported by the server. Field documentation is used by Clap to generate
/// help text, so keep them in rustdoc format.
#[derive(Parser, Debug, Clone)]
#[command(name = "harbor", version, about = "Harbor MCP server platform", long_about = None)]
struct Args {
    /// Config file path (overrides default path and HARBOR_CONFIG_PATH)
    #[arg(long = "config-file", value_name = "FILE", env = "HARBOR_CONFIG_PATH")]
    config_file: Option<PathBuf>,

    /// Transport protocol for MCP communication
    #[arg(
        long = "transport",
        value_name = "TRANSPORT",
        env = "HARBOR_TRANSPORT",
        value_enum
    )]
    transport: Option<TransportChoice>,

    /// Bind address override for the HTTP/WebSocket transports (host:port)
    #[arg(
        long = "bind-address",
        value_name = "BIND_ADDRESS",
        env = "HARBOR_BIND_ADDRESS"
    )]
    bind_address: Option<String>,

    /// Log level (RUST_LOG takes precedence when set)
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        env = "HARBOR_LOG_LEVEL",
        value_enum
    )]
    log_level: Option<LogLevel>,
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the configured level. On the stdio transport all
/// diagnostics go to stderr so stdout stays a clean protocol stream.
fn init_logging(config: &ServerConfig) {
    let env_filter = if let Ok(v) = std::env::var("RUST_LOG") {
        EnvFilter::new(v)
    } else {
        EnvFilter::new(config.log_level.to_string())
    };

    if matches!(config.transport, TransportConfig::Stdio) {
        let fmt_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact();
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(env_filter)
            .init();
    } else {
        let fmt_layer = fmt::layer().with_target(false).compact();
        tracing_subscriber::registry()
            .with(fmt_layer)
            .with(env_filter)
            .init();
    }
}

/// Main entry point for the Harbor server.
///
/// # Returns
/// - `Ok(())` if the server runs and shuts down cleanly
/// - `Err(anyhow::Error)` if initialization or execution fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let app_state = Arc::new(AppState::default());
    app_state.set_state(ApplicationState::Initializing);

    // Load configuration from file, environment, and CLI overrides
    let config = ServerConfig::load_with_overrides(
        args.config_file.clone(),
        args.transport,
        args.bind_address.clone(),
        args.log_level,
    )?;
    init_logging(&config);
    tracing::debug!("Early init completed");

    // Register plugins and their capabilities
    app_state.set_state(ApplicationState::LoadingPlugins);
    let host = Arc::new(PluginHost::new(config.plugin_config.clone()));
    plugins::load_plugins(&host, Vec::new()).await?;
    tracing::debug!("Plugin load completed");

    // Orchestrator over the in-memory session store
    let store = Arc::new(InMemorySessionStore::new());
    let orchestrator = Arc::new(Orchestrator::new(store, config.session.timeout()));

    // Kernel with the configured middleware pipeline
    let pipeline = MiddlewarePipeline::from_options(&config.middleware);
    let kernel = Arc::new(
        ServerKernel::new(&config.name, &config.version, Arc::clone(&host), pipeline)
            .with_orchestrator(Arc::clone(&orchestrator))
            .with_symmetric_middleware(config.middleware.cover_resources_and_prompts),
    );

    // Start the selected transport
    app_state.set_state(ApplicationState::StartingNetwork);
    let transport: Arc<dyn Transport> = match &config.transport {
        TransportConfig::Stdio => Arc::new(StdioTransport::new()),
        TransportConfig::Http { options } => Arc::new(HttpTransport::new(options.clone())),
        TransportConfig::Websocket { options } => {
            Arc::new(WebSocketTransport::new(options.clone()))
        }
    };
    transport.on_request(kernel_handler(Arc::clone(&kernel)));
    transport.start().await?;
    app_state.set_state(ApplicationState::Ready);
    tracing::info!("{} v{} ready", config.name, config.version);

    // Expire idle sessions every minute
    let cleanup_orchestrator = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            match cleanup_orchestrator.cleanup_expired_sessions().await {
                Ok(count) if count > 0 => {
                    tracing::info!("Cleaned up {} expired sessions", count);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
        }
    });

    wait_for_shutdown_signal().await;

    // Orderly shutdown: stop accepting, drain, run plugin shutdowns
    app_state.set_state(ApplicationState::Terminating);
    tracing::info!("Shutting down");
    if let Err(e) = transport.stop().await {
        tracing::error!("Transport shutdown failed: {}", e);
    }
    host.shutdown().await;

    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received (Ctrl+C)"),
            _ = sigterm.recv() => tracing::info!("Shutdown signal received (SIGTERM)"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received (Ctrl+C)");
    }
}
