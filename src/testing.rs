//! In-memory stand-ins for the chain, codec and alert sink, plus local
//! WebSocket nodes for the connection layer.

use crate::chain::{
    CallArg, CallRequest, ChainClient, ChainError, DecodeError, DecodedCall, ExtrinsicDecoder, Receipt,
    Reserves,
};
use crate::notify::Notifier;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::net::TcpListener;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

#[derive(Default)]
pub struct FakeDecoder {
    results: Mutex<HashMap<String, Result<DecodedCall, String>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeDecoder {
    pub fn insert(&self, raw: &str, result: Result<DecodedCall, DecodeError>) {
        self.results
            .lock()
            .unwrap()
            .insert(raw.to_string(), result.map_err(|e| e.to_string()));
    }

    pub fn calls(&self, raw: &str) -> usize {
        self.calls.lock().unwrap().get(raw).copied().unwrap_or(0)
    }
}

impl ExtrinsicDecoder for FakeDecoder {
    fn decode(&self, raw_hex: &str) -> Result<DecodedCall, DecodeError> {
        *self.calls.lock().unwrap().entry(raw_hex.to_string()).or_default() += 1;
        match self.results.lock().unwrap().get(raw_hex) {
            Some(Ok(call)) => Ok(call.clone()),
            Some(Err(_)) | None => Err(DecodeError::UnexpectedShape("fake")),
        }
    }
}

#[derive(Default)]
struct ChainState {
    owners: HashMap<u16, String>,
    /// Consumed front to back; the last entry repeats.
    reserves: VecDeque<Reserves>,
    /// Consumed front to back; empty means success.
    failures: VecDeque<String>,
    submitted: Vec<(CallRequest, u128)>,
    reserve_reads: usize,
    fail_reads: bool,
    next_tx: u64,
}

#[derive(Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
    panic_on_reserves: AtomicBool,
}

impl FakeChain {
    pub fn set_owner(&self, netuid: u16, owner: &str) {
        self.state.lock().unwrap().owners.insert(netuid, owner.to_string());
    }

    pub fn push_reserves(&self, alpha: u128, base: u128) {
        self.state
            .lock()
            .unwrap()
            .reserves
            .push_back(Reserves { alpha, base });
    }

    pub fn push_failure(&self, reason: &str) {
        self.state.lock().unwrap().failures.push_back(reason.to_string());
    }

    pub fn fail_reserve_reads(&self) {
        self.state.lock().unwrap().fail_reads = true;
    }

    pub fn panic_on_reserves(&self) {
        self.panic_on_reserves.store(true, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<(CallRequest, u128)> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn reserve_reads(&self) -> usize {
        self.state.lock().unwrap().reserve_reads
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn read_reserves(&self, netuid: u16) -> Result<Reserves, ChainError> {
        if self.panic_on_reserves.load(Ordering::SeqCst) {
            panic!("reserve read exploded for subnet {}", netuid);
        }
        let mut state = self.state.lock().unwrap();
        state.reserve_reads += 1;
        if state.fail_reads {
            return Err(ChainError::Rpc("connection reset".to_string()));
        }
        let reserves = if state.reserves.len() > 1 {
            state.reserves.pop_front()
        } else {
            state.reserves.front().copied()
        };
        reserves.ok_or(ChainError::StorageShape {
            entry: "SubnetAlphaIn",
            netuid,
        })
    }

    async fn subnet_owner(&self, netuid: u16) -> Result<Option<String>, ChainError> {
        Ok(self.state.lock().unwrap().owners.get(&netuid).cloned())
    }

    async fn submit(&self, call: CallRequest, tip: u128) -> Result<Receipt, ChainError> {
        let mut state = self.state.lock().unwrap();
        state.submitted.push((call, tip));
        state.next_tx += 1;
        let tx_hash = format!("0xtx{:02}", state.next_tx);
        let block_hash = format!("0xblock{:02}", state.next_tx);
        Ok(match state.failures.pop_front() {
            Some(reason) => Receipt {
                success: false,
                tx_hash,
                block_hash,
                error: Some(reason),
            },
            None => Receipt {
                success: true,
                tx_hash,
                block_hash,
                error: None,
            },
        })
    }
}

/// The `limit_price` parameter of a composed stake call.
pub fn limit_price_of(call: &CallRequest) -> Option<u64> {
    call.params.iter().find_map(|(name, arg)| match (*name, arg) {
        ("limit_price", CallArg::U64(n)) => Some(*n),
        _ => None,
    })
}

/// A local node answering every JSON-RPC request with `result`. Each answer is
/// preceded by a subscription notification and a response for another id.
pub async fn spawn_rpc_node(result: Value) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let result = result.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(tcp).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else {
                        continue;
                    };
                    let request: Value = serde_json::from_str(&text).unwrap();
                    let id = request["id"].as_u64().unwrap();
                    let frames = [
                        json!({
                            "jsonrpc": "2.0",
                            "method": "chain_newHead",
                            "params": {"subscription": "sub-1", "result": {"number": "0x10"}},
                        }),
                        json!({"jsonrpc": "2.0", "id": id + 500, "result": "stale"}),
                        json!({"jsonrpc": "2.0", "id": id, "result": result}),
                    ];
                    for frame in frames {
                        if ws.send(Message::Text(frame.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
    addr
}

/// A node that accepts connections and then never speaks. With `handshake`
/// the WebSocket upgrade completes first; without it only TCP is accepted.
pub async fn spawn_silent_node(handshake: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            tokio::spawn(async move {
                if handshake {
                    let _ws = accept_async(tcp).await;
                    std::future::pending::<()>().await;
                } else {
                    let _tcp = tcp;
                    std::future::pending::<()>().await;
                }
            });
        }
    });
    addr
}
