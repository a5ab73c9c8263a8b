//! Best-block tracking. Each height change starts a new dedup epoch.

use crate::notify::Notifier;
use crate::watcher::WatchContext;
use crate::ws::{ChainConnection, RpcSocket, WsError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const ERROR_PAUSE: Duration = Duration::from_secs(3);

pub struct BlockTracker {
    ctx: WatchContext,
    conn: ChainConnection,
    notifier: Arc<dyn Notifier>,
    /// `None` until the first head arrives.
    height: Option<u64>,
}

impl BlockTracker {
    pub fn new(ctx: WatchContext, conn: ChainConnection, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            ctx,
            conn,
            notifier,
            height: None,
        }
    }

    pub fn height(&self) -> Option<u64> {
        self.height
    }

    /// Run in a background task until the process exits.
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run_forever().await;
        })
    }

    async fn run_forever(&mut self) {
        loop {
            let mut socket = self.conn.connect().await;
            let err = self.run_session(&mut socket).await;

            if err.is_disconnect() {
                let msg = format!("[WebSocket Closed - watch_new_blocks] {}", err);
                warn!(error = %err, "block subscription connection lost");
                self.notifier.notify(&msg);
            } else {
                let msg = format!("[Unexpected Error in watch_new_blocks] {}", err);
                error!(error = %err, "block subscription failed");
                self.notifier.notify(&msg);
                tokio::time::sleep(ERROR_PAUSE).await;
            }
            socket.close().await;
        }
    }

    /// Subscribe and consume heads until the session breaks.
    async fn run_session(&mut self, socket: &mut RpcSocket) -> WsError {
        match socket.request("chain_subscribeNewHeads").await {
            Ok(subscription) => info!(subscription = %subscription, "subscribed to new heads"),
            Err(e) => return e,
        }

        loop {
            match socket.next_json().await {
                Ok(msg) => {
                    self.handle_notification(&msg).await;
                }
                Err(e) if e.is_disconnect() => return e,
                Err(e) => {
                    let msg = format!("[WS/JSON Error - watch_new_blocks] {}", e);
                    error!(error = %e, "bad head notification");
                    self.notifier.notify(&msg);
                }
            }
        }
    }

    /// Apply one head notification. Returns the new height when it changed.
    pub async fn handle_notification(&mut self, msg: &Value) -> Option<u64> {
        let Some(height) = parse_height(msg) else {
            debug!("ignoring message without a block number");
            return None;
        };
        if self.height == Some(height) {
            return None;
        }

        let cleared = self.ctx.clear_seen().await;
        if let Some(previous) = self.height {
            if height < previous {
                warn!(previous = previous, block = height, "best block went backwards");
            }
        }
        self.height = Some(height);
        info!(block = height, cleared = cleared, "new block");
        Some(height)
    }
}

/// Height from a `chain_newHead` notification: `params.result.number`, hex encoded.
pub fn parse_height(msg: &Value) -> Option<u64> {
    let number = msg.get("params")?.get("result")?.get("number")?.as_str()?;
    u64::from_str_radix(number.trim_start_matches("0x"), 16).ok()
}
