//! Dial loop for the node's WebSocket endpoint.

use crate::notify::Notifier;
use crate::ws::reconnect::{ReconnectPolicy, THROTTLE_INTERVAL};
use crate::ws::{RpcSocket, WsError};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::connect_async;
use tracing::{error, info, warn};

/// Upper bound on TCP connect plus the WebSocket handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the reconnect state for one logical connection (block heads or
/// pending pool). Each consumer task has its own.
pub struct ChainConnection {
    url: String,
    label: &'static str,
    policy: ReconnectPolicy,
    notifier: Arc<dyn Notifier>,
    first_request_id: u64,
    connect_timeout: Duration,
}

impl ChainConnection {
    pub fn new(
        url: String,
        label: &'static str,
        notifier: Arc<dyn Notifier>,
        first_request_id: u64,
    ) -> Self {
        Self {
            url,
            label,
            policy: ReconnectPolicy::new(),
            notifier,
            first_request_id,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }

    /// Connect, retrying forever with backoff. Only returns a live socket.
    pub async fn connect(&mut self) -> RpcSocket {
        loop {
            self.pace().await;

            info!(conn = self.label, url = %self.url, "connecting to node WebSocket");
            match self.dial().await {
                Ok(socket) => {
                    self.policy.reset();
                    info!(conn = self.label, "node WebSocket connected");
                    return socket;
                }
                Err(e) => {
                    let delay = self.policy.current_delay();
                    let msg = format!(
                        "[Reconnect Failed - {}] Retrying in {}s: {}",
                        self.label,
                        delay.as_secs(),
                        e
                    );
                    error!(conn = self.label, error = %e, delay = ?delay, "node WebSocket connect failed");
                    self.notifier.notify(&msg);
                    tokio::time::sleep(delay).await;
                    self.policy.advance();
                }
            }
        }
    }

    /// Record the attempt and sit out a reconnect storm.
    async fn pace(&mut self) {
        self.policy.record_attempt(Instant::now());
        if self.policy.should_throttle() {
            warn!(
                conn = self.label,
                attempts = self.policy.recent_attempts(),
                pause_secs = THROTTLE_INTERVAL.as_secs(),
                "reconnect storm, throttling"
            );
            tokio::time::sleep(THROTTLE_INTERVAL).await;
        }
    }

    async fn dial(&self) -> Result<RpcSocket, WsError> {
        match timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
            Ok(Ok((stream, _response))) => Ok(RpcSocket::new(stream, self.first_request_id)),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(WsError::ConnectTimeout(self.connect_timeout)),
        }
    }
}
