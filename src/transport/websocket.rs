//! JSON-RPC over long-lived WebSocket connections.
//!
//! Each connection gets an opaque id and a welcome frame on connect. Frames
//! parse as JSON-RPC envelopes; a malformed frame earns a `-32700` envelope
//! without dropping the connection. A heartbeat task pings every connection
//! each interval and terminates connections that fail to pong between two
//! beats. `max_connections` is enforced by closing excess sockets with close
//! code 1013; shutdown closes every socket with 1001. `send` broadcasts raw
//! JSON (no id) to all open sockets, optionally narrowed by a connection-id
//! predicate.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use rand::distr::{Alphanumeric, SampleString};
use serde_json::{Value, json};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BroadcastFilter, RequestHandler, Transport};
use crate::config::WebSocketOptions;
use crate::errors::TransportError;
use crate::protocol::{
    InboundRequest, JsonRpcRequest, JsonRpcResponse, RequestMetadata, RpcErrorObject,
    TransportKind,
};

/// Going-away close code sent to every socket on shutdown.
const CLOSE_GOING_AWAY: u16 = 1001;
/// Try-again-later close code sent when `max_connections` is exceeded.
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

struct Connection {
    sender: mpsc::UnboundedSender<Message>,
    /// Set by each pong, cleared by each heartbeat. A connection observed
    /// cleared at the next beat is terminated.
    alive: Arc<AtomicBool>,
}

type ConnectionMap = Arc<RwLock<HashMap<String, Connection>>>;

#[derive(Clone)]
struct WsState {
    handler: RequestHandler,
    connections: ConnectionMap,
    max_connections: usize,
}

/// The WebSocket transport.
pub struct WebSocketTransport {
    options: WebSocketOptions,
    handler: std::sync::RwLock<Option<RequestHandler>>,
    connections: ConnectionMap,
    shutdown: CancellationToken,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WebSocketTransport {
    pub fn new(options: WebSocketOptions) -> Self {
        Self {
            options,
            handler: std::sync::RwLock::new(None),
            connections: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            tasks: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Number of currently open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    fn generate_connection_id() -> String {
        let suffix = Alphanumeric.sample_string(&mut rand::rng(), 12);
        format!("conn_{}", suffix)
    }

    async fn heartbeat_loop(
        connections: ConnectionMap,
        interval: std::time::Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // immediate first tick
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut stale = Vec::new();
            {
                let connections = connections.read().await;
                for (id, conn) in connections.iter() {
                    if conn.alive.swap(false, Ordering::SeqCst) {
                        let _ = conn.sender.send(Message::Ping(Vec::new().into()));
                    } else {
                        stale.push(id.clone());
                    }
                }
            }

            if !stale.is_empty() {
                let mut connections = connections.write().await;
                for id in stale {
                    tracing::warn!("Terminating unresponsive connection {}", id);
                    if let Some(conn) = connections.remove(&id) {
                        let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                            code: CLOSE_GOING_AWAY,
                            reason: "heartbeat timeout".into(),
                        })));
                    }
                }
            }
        }
    }
}

async fn handle_upgrade(State(state): State<WsState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sink, mut stream) = socket.split();

    // Enforce the connection cap before registering.
    if state.connections.read().await.len() >= state.max_connections {
        tracing::warn!("Connection limit reached, rejecting socket");
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_TRY_AGAIN_LATER,
                reason: "too many connections".into(),
            })))
            .await;
        return;
    }

    let connection_id = WebSocketTransport::generate_connection_id();
    let alive = Arc::new(AtomicBool::new(true));
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    state.connections.write().await.insert(
        connection_id.clone(),
        Connection {
            sender: tx.clone(),
            alive: Arc::clone(&alive),
        },
    );
    tracing::debug!("Connection {} established", connection_id);

    let welcome = json!({
        "type": "welcome",
        "connectionId": connection_id,
        "timestamp": Utc::now().to_rfc3339(),
    });
    let _ = tx.send(Message::Text(welcome.to_string().into()));

    // Writer half: forwards queued frames, stopping after a close frame.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    // Reader half: frames are dispatched in arrival order; each runs as its
    // own task, so responses may complete out of order (correlated by id).
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let reply = tx.clone();
                let handler = Arc::clone(&state.handler);
                let connection_id = connection_id.clone();
                tokio::spawn(async move {
                    let response = match serde_json::from_str::<JsonRpcRequest>(text.as_str()) {
                        Ok(envelope) => {
                            let req = InboundRequest::from_envelope(
                                envelope,
                                RequestMetadata {
                                    transport: TransportKind::WebSocket,
                                    connection_id: Some(connection_id),
                                    user_agent: None,
                                    peer_addr: None,
                                },
                            );
                            handler(req).await
                        }
                        Err(e) => Some(JsonRpcResponse::error(
                            None,
                            RpcErrorObject::parse_error(format!("Parse error: {}", e)),
                        )),
                    };
                    if let Some(response) = response
                        && let Ok(text) = serde_json::to_string(&response)
                    {
                        let _ = reply.send(Message::Text(text.into()));
                    }
                });
            }
            Ok(Message::Pong(_)) => {
                alive.store(true, Ordering::SeqCst);
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.connections.write().await.remove(&connection_id);
    writer.abort();
    tracing::debug!("Connection {} closed", connection_id);
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    fn on_request(&self, handler: RequestHandler) {
        if let Ok(mut slot) = self.handler.write() {
            *slot = Some(handler);
        }
    }

    async fn start(&self) -> Result<(), TransportError> {
        let handler = self
            .handler
            .read()
            .ok()
            .and_then(|h| h.clone())
            .ok_or(TransportError::NoHandler)?;

        let addr = self.options.bind_address();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;

        tracing::info!(
            "Starting WebSocket transport on ws://{}{}",
            addr,
            self.options.path
        );

        let state = WsState {
            handler,
            connections: Arc::clone(&self.connections),
            max_connections: self.options.max_connections,
        };
        let router = Router::new()
            .route(&self.options.path, get(handle_upgrade))
            .with_state(state);

        let shutdown = self.shutdown.clone();
        let serve = tokio::spawn(async move {
            let service = router.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                tracing::error!("WebSocket transport error: {}", e);
            }
        });

        let heartbeat = tokio::spawn(WebSocketTransport::heartbeat_loop(
            Arc::clone(&self.connections),
            self.options.heartbeat_interval(),
            self.shutdown.clone(),
        ));

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(serve);
            tasks.push(heartbeat);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        // Close every socket with "going away" before stopping the listener.
        {
            let mut connections = self.connections.write().await;
            for (id, conn) in connections.drain() {
                tracing::debug!("Closing connection {} for shutdown", id);
                let _ = conn.sender.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "server shutting down".into(),
                })));
            }
        }
        self.shutdown.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .map(|mut t| t.drain(..).collect())
            .unwrap_or_default();
        for task in tasks {
            let _ = task.await;
        }
        tracing::debug!("WebSocket transport stopped");
        Ok(())
    }

    async fn send(
        &self,
        payload: Value,
        filter: Option<BroadcastFilter>,
    ) -> Result<usize, TransportError> {
        let text = payload.to_string();
        let connections = self.connections.read().await;
        let mut delivered = 0;
        for (id, conn) in connections.iter() {
            if let Some(filter) = &filter
                && !filter(id)
            {
                continue;
            }
            if conn.sender.send(Message::Text(text.clone().into())).is_ok() {
                delivered += 1;
            }
        }
        Ok(delivered)
    }
}
