//! JSON-RPC 2.0 over a byte stream with `Content-Length` framing
//!
//! Used to talk to the agent CLI over its stdio. The connection multiplexes
//! our requests (matched to responses by id) with requests and notifications
//! initiated by the other side.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BufMut, BytesMut};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::types::{AgentError, Result};

const HEADER_END: &[u8] = b"\r\n\r\n";

/// `Content-Length` framed JSON codec
#[derive(Debug, Default, Clone, Copy)]
pub struct RpcCodec;

impl Decoder for RpcCodec {
    type Item = Value;
    type Error = AgentError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        let Some(header_len) = src
            .windows(HEADER_END.len())
            .position(|window| window == HEADER_END)
        else {
            return Ok(None);
        };

        let header = std::str::from_utf8(&src[..header_len])
            .map_err(|e| AgentError::internal(format!("Invalid frame header: {e}")))?;
        let body_len = content_length(header)?;
        let body_start = header_len + HEADER_END.len();

        if src.len() < body_start + body_len {
            src.reserve(body_start + body_len - src.len());
            return Ok(None);
        }

        src.advance(body_start);
        let body = src.split_to(body_len);
        Ok(Some(serde_json::from_slice(&body)?))
    }
}

impl Encoder<Value> for RpcCodec {
    type Error = AgentError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)?;
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        dst.reserve(header.len() + body.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(&body);
        Ok(())
    }
}

fn content_length(header: &str) -> Result<usize> {
    for line in header.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                return value
                    .trim()
                    .parse()
                    .map_err(|e| AgentError::internal(format!("Invalid Content-Length: {e}")));
            }
        }
    }
    Err(AgentError::internal("Frame header without Content-Length"))
}

/// Handler for notifications sent by the other side
pub type NotificationHandler = Arc<dyn Fn(String, Value) + Send + Sync>;

/// Handler for requests sent by the other side
pub type RequestHandler =
    Arc<dyn Fn(String, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Bidirectional JSON-RPC connection
#[derive(Debug)]
pub struct RpcConnection {
    next_id: AtomicU64,
    pending: DashMap<u64, oneshot::Sender<Result<Value>>>,
    outbound: mpsc::UnboundedSender<Value>,
    closed: CancellationToken,
}

impl RpcConnection {
    /// Start reader and writer tasks over the given stream halves
    pub fn start<R, W>(
        reader: R,
        writer: W,
        on_notification: NotificationHandler,
        on_request: RequestHandler,
    ) -> Arc<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Value>();
        let connection = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            outbound,
            closed: CancellationToken::new(),
        });

        let closed = connection.closed.clone();
        tokio::spawn(async move {
            let mut sink = FramedWrite::new(writer, RpcCodec);
            loop {
                tokio::select! {
                    message = outbound_rx.recv() => {
                        let Some(message) = message else { break };
                        if let Err(e) = sink.send(message).await {
                            tracing::warn!(error = %e, "Failed to write JSON-RPC frame");
                            break;
                        }
                    }
                    () = closed.cancelled() => break,
                }
            }
            tracing::debug!("JSON-RPC writer stopped");
        });

        let reader_connection = Arc::clone(&connection);
        tokio::spawn(async move {
            let mut frames = FramedRead::new(reader, RpcCodec);
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(message) => reader_connection.dispatch(message, &on_notification, &on_request),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read JSON-RPC frame");
                        break;
                    }
                }
            }
            tracing::debug!("JSON-RPC reader reached end of stream");
            reader_connection.close();
        });

        connection
    }

    /// Send a request and wait for its response
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.closed.is_cancelled() {
            return Err(AgentError::ClientClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (responder, response) = oneshot::channel();
        self.pending.insert(id, responder);

        tracing::trace!(id = id, method = %method, "Sending JSON-RPC request");
        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if self.outbound.send(message).is_err() {
            self.pending.remove(&id);
            return Err(AgentError::ClientClosed);
        }

        tokio::select! {
            outcome = response => outcome.unwrap_or(Err(AgentError::ClientClosed)),
            () = self.closed.cancelled() => {
                self.pending.remove(&id);
                Err(AgentError::ClientClosed)
            }
        }
    }

    /// Send a notification
    pub fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.outbound
            .send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .map_err(|_| AgentError::ClientClosed)
    }

    /// Close the connection and fail every in-flight request
    pub fn close(&self) {
        self.closed.cancel();
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, responder)) = self.pending.remove(&id) {
                drop(responder.send(Err(AgentError::ClientClosed)));
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    fn dispatch(
        self: &Arc<Self>,
        message: Value,
        on_notification: &NotificationHandler,
        on_request: &RequestHandler,
    ) {
        let method = message
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string);
        let id = message.get("id").filter(|id| !id.is_null()).cloned();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        match (method, id) {
            (Some(method), Some(id)) => {
                let handler = Arc::clone(on_request);
                let connection = Arc::clone(self);
                tokio::spawn(async move {
                    let response = match handler(method.clone(), params).await {
                        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
                        Err(e) => {
                            tracing::warn!(method = %method, error = %e, "Inbound JSON-RPC request failed");
                            json!({
                                "jsonrpc": "2.0",
                                "id": id,
                                "error": {"code": e.error_code().code(), "message": e.to_string()}
                            })
                        }
                    };
                    if connection.outbound.send(response).is_err() {
                        tracing::debug!(method = %method, "Connection closed before response was sent");
                    }
                });
            }
            (Some(method), None) => on_notification(method, params),
            (None, Some(id)) => self.complete(&id, &message),
            (None, None) => {
                tracing::warn!(message = %message, "Ignoring JSON-RPC message without method or id");
            }
        }
    }

    fn complete(&self, id: &Value, message: &Value) {
        let Some((_, responder)) = id.as_u64().and_then(|id| self.pending.remove(&id)) else {
            tracing::debug!(id = %id, "Ignoring response for unknown request id");
            return;
        };

        let outcome = match message.get("error") {
            Some(error) => Err(AgentError::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
        };
        drop(responder.send(outcome));
    }
}
