//! A single JSON-RPC WebSocket session with the node.

use crate::ws::WsError;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::debug;

pub const PING_INTERVAL: Duration = Duration::from_secs(20);
pub const PING_TIMEOUT: Duration = Duration::from_secs(10);

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live connection. Dropping it closes the socket.
pub struct RpcSocket {
    stream: Stream,
    next_id: u64,
    ping_due: Instant,
    last_frame: Instant,
}

impl RpcSocket {
    pub fn new(stream: Stream, first_id: u64) -> Self {
        let now = Instant::now();
        Self {
            stream,
            next_id: first_id,
            ping_due: now + PING_INTERVAL,
            last_frame: now,
        }
    }

    /// Send a parameterless request and return its id.
    pub async fn send_request(&mut self, method: &str) -> Result<u64, WsError> {
        let id = self.next_id;
        self.next_id += 1;
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": [],
        });
        self.stream.send(Message::Text(body.to_string())).await?;
        // The keepalive clock only runs while we are waiting on the node
        let now = Instant::now();
        self.last_frame = now;
        self.ping_due = now + PING_INTERVAL;
        debug!(id = id, method = method, "rpc request sent");
        Ok(id)
    }

    /// Send a request and wait for the response carrying the same id.
    /// Notifications and stale responses received meanwhile are dropped.
    pub async fn request(&mut self, method: &str) -> Result<Value, WsError> {
        let id = self.send_request(method).await?;
        loop {
            let msg = self.next_json().await?;
            if msg.get("id").and_then(Value::as_u64) != Some(id) {
                debug!(method = method, "skipping unrelated message while awaiting response");
                continue;
            }
            return take_result(msg);
        }
    }

    /// Next text frame parsed as JSON. Handles keepalive pings while waiting.
    pub async fn next_json(&mut self) -> Result<Value, WsError> {
        let text = self.next_text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn next_text(&mut self) -> Result<String, WsError> {
        loop {
            let deadline = self.last_frame + PING_INTERVAL + PING_TIMEOUT;
            let wake = self.ping_due.min(deadline);

            let frame = match timeout_at(wake, self.stream.next()).await {
                Ok(frame) => frame,
                Err(_) => {
                    if Instant::now() >= deadline {
                        return Err(WsError::PingTimeout);
                    }
                    self.stream.send(Message::Ping(Vec::new())).await?;
                    self.ping_due = Instant::now() + PING_INTERVAL;
                    continue;
                }
            };

            match frame {
                None => return Err(WsError::Closed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(msg)) => {
                    self.last_frame = Instant::now();
                    match msg {
                        Message::Text(text) => return Ok(text),
                        Message::Binary(bytes) => match String::from_utf8(bytes) {
                            Ok(text) => return Ok(text),
                            Err(_) => debug!("ignoring non-utf8 binary frame"),
                        },
                        Message::Close(frame) => {
                            debug!(frame = ?frame, "received close frame");
                            return Err(WsError::Closed);
                        }
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
                    }
                }
            }
        }
    }

    /// Best-effort close handshake.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Extract `result` from a JSON-RPC response, mapping `error` objects.
pub fn take_result(mut msg: Value) -> Result<Value, WsError> {
    if let Some(err) = msg.get("error") {
        return Err(WsError::Rpc {
            code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
        });
    }
    match msg.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(WsError::UnexpectedPayload(msg.to_string())),
    }
}
