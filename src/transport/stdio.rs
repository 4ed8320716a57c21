//! Line-delimited JSON-RPC over standard input/output.
//!
//! One frame per line on stdin, one response per line on stdout, flushed
//! after every frame. Diagnostics go to stderr through the tracing
//! subscriber so stdout stays a clean protocol stream. This transport is
//! natively request/response: responses are returned inline and `send`
//! (broadcast) is unsupported.

use std::sync::{Arc, Mutex, RwLock};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BroadcastFilter, RequestHandler, Transport};
use crate::errors::TransportError;
use crate::protocol::{
    InboundRequest, JsonRpcRequest, JsonRpcResponse, RequestMetadata, RpcErrorObject,
    TransportKind,
};

/// The stdio transport.
#[derive(Default)]
pub struct StdioTransport {
    handler: RwLock<Option<RequestHandler>>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(handler: RequestHandler, shutdown: CancellationToken) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();

        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!("stdin closed, stopping stdio transport");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read from stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(envelope) => {
                    let req = InboundRequest::from_envelope(
                        envelope,
                        RequestMetadata::for_transport(TransportKind::Stdio),
                    );
                    handler(req).await
                }
                Err(e) => {
                    tracing::warn!("Malformed frame on stdin: {}", e);
                    Some(JsonRpcResponse::error(
                        None,
                        RpcErrorObject::parse_error(format!("Parse error: {}", e)),
                    ))
                }
            };

            if let Some(response) = response
                && let Ok(text) = serde_json::to_string(&response)
            {
                if stdout.write_all(text.as_bytes()).await.is_err() {
                    break;
                }
                if stdout.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = stdout.flush().await;
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
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

        tracing::info!("Starting stdio transport");
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(Self::run(handler, shutdown));
        if let Ok(mut slot) = self.task.lock() {
            *slot = Some(task);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        self.shutdown.cancel();
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some(task) = task {
            let _ = task.await;
        }
        tracing::debug!("Stdio transport stopped");
        Ok(())
    }

    async fn send(
        &self,
        _payload: Value,
        _filter: Option<BroadcastFilter>,
    ) -> Result<usize, TransportError> {
        Err(TransportError::BroadcastUnsupported("stdio"))
    }
}
