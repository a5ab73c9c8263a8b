//! Pending-pool poller: finds `schedule_swap_coldkey` calls by subnet owners.

use crate::chain::{DecodedCall, ExtrinsicDecoder};
use crate::notify::Notifier;
use crate::stake::DispatchHandle;
use crate::watcher::{SwapEvent, WatchContext};
use crate::ws::{ChainConnection, RpcSocket, WsError};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const TARGET_MODULE: &str = "SubtensorModule";
pub const TARGET_FUNCTION: &str = "schedule_swap_coldkey";
const NEW_COLDKEY_ARG: &str = "new_coldkey";
const ERROR_PAUSE: Duration = Duration::from_secs(3);

/// Per-cycle counters, mostly for logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollStats {
    pub pending: usize,
    pub fresh: usize,
    pub decode_failures: usize,
    pub dispatched: usize,
}

pub struct ExtrinsicPoller {
    ctx: WatchContext,
    conn: ChainConnection,
    decoder: Arc<dyn ExtrinsicDecoder>,
    notifier: Arc<dyn Notifier>,
    dispatcher: DispatchHandle,
    poll_interval: Duration,
}

impl ExtrinsicPoller {
    pub fn new(
        ctx: WatchContext,
        conn: ChainConnection,
        decoder: Arc<dyn ExtrinsicDecoder>,
        notifier: Arc<dyn Notifier>,
        dispatcher: DispatchHandle,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ctx,
            conn,
            decoder,
            notifier,
            dispatcher,
            poll_interval,
        }
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
                let msg = format!("[WebSocket Closed - poll_pending_extrinsics] {}", err);
                warn!(error = %err, "pending pool connection lost");
                self.notifier.notify(&msg);
            } else {
                let msg = format!("[Unexpected Error in poll_pending_extrinsics] {}", err);
                error!(error = %err, "pending pool session failed");
                self.notifier.notify(&msg);
                tokio::time::sleep(ERROR_PAUSE).await;
            }
            socket.close().await;
        }
    }

    async fn run_session(&mut self, socket: &mut RpcSocket) -> WsError {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let pendings = match socket.request("author_pendingExtrinsics").await {
                Ok(result) => match parse_pending(result) {
                    Ok(list) => list,
                    Err(e) => {
                        self.alert_poll_error(&e);
                        Vec::new()
                    }
                },
                Err(e) if e.is_disconnect() => return e,
                Err(e) => {
                    self.alert_poll_error(&e);
                    Vec::new()
                }
            };

            let stats = self.process_pending(&pendings).await;
            if stats.fresh > 0 {
                debug!(
                    pending = stats.pending,
                    fresh = stats.fresh,
                    decode_failures = stats.decode_failures,
                    dispatched = stats.dispatched,
                    "pending pool scanned"
                );
            }
        }
    }

    fn alert_poll_error(&self, e: &WsError) {
        let msg = format!("[WS/JSON Error - poll_pending_extrinsics] {}", e);
        error!(error = %e, "pending pool request failed");
        self.notifier.notify(&msg);
    }

    /// Handle one snapshot of the pending pool, in order.
    pub async fn process_pending(&self, pendings: &[String]) -> PollStats {
        let mut stats = PollStats {
            pending: pendings.len(),
            ..PollStats::default()
        };

        for raw in pendings {
            // Marked before decoding: a failed decode is not retried this epoch
            if !self.ctx.mark_seen(raw).await {
                continue;
            }
            stats.fresh += 1;

            let call = match self.decoder.decode(raw) {
                Ok(call) => call,
                Err(e) => {
                    stats.decode_failures += 1;
                    let msg = format!("[Decode Hex Error] {}", e);
                    error!(error = %e, "failed to decode pending extrinsic");
                    self.notifier.notify(&msg);
                    continue;
                }
            };

            if let Some(event) = self.classify(&call) {
                if self.dispatcher.dispatch(event) {
                    stats.dispatched += 1;
                }
            }
        }

        stats
    }

    /// Match a decoded call against the target and resolve its subnet.
    fn classify(&self, call: &DecodedCall) -> Option<SwapEvent> {
        if !call.is_call(TARGET_MODULE, TARGET_FUNCTION) {
            return None;
        }

        let Some(caller) = call.caller.clone() else {
            warn!("unsigned schedule_swap_coldkey in pending pool");
            return None;
        };
        let new_coldkey = call.arg(NEW_COLDKEY_ARG).unwrap_or("unknown").to_string();

        let Some(netuid) = self.ctx.subnet_for(&caller) else {
            let msg = format!("Invalid subnet for caller {}", caller);
            info!(caller = %caller, new_coldkey = %new_coldkey, "coldkey swap by non-owner");
            self.notifier.notify(&msg);
            return None;
        };

        let msg = format!(
            "🚨 Coldkey swap scheduled\ncaller: {}\nnew coldkey: {}\nsubnet: {}",
            caller, new_coldkey, netuid
        );
        warn!(
            caller = %caller,
            new_coldkey = %new_coldkey,
            netuid = netuid,
            "COLDKEY SWAP: subnet owner scheduled swap"
        );
        self.notifier.notify(&msg);

        Some(SwapEvent {
            caller,
            new_coldkey,
            netuid,
        })
    }
}

/// `author_pendingExtrinsics` result: an array of hex strings.
pub fn parse_pending(result: Value) -> Result<Vec<String>, WsError> {
    match result {
        Value::Null => Ok(Vec::new()),
        other => Ok(serde_json::from_value(other)?),
    }
}
