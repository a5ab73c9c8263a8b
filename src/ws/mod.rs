//! JSON-RPC over WebSocket plumbing for the Subtensor node.
//!
//! - `ReconnectPolicy`: exponential backoff plus a reconnect-storm throttle
//! - `ChainConnection`: dials the node until it succeeds, alerting on each failure
//! - `RpcSocket`: one live connection with keepalive pings and id-matched requests

pub mod connection;
pub mod reconnect;
pub mod rpc;

pub use connection::ChainConnection;
pub use reconnect::ReconnectPolicy;
pub use rpc::RpcSocket;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WsError {
    #[error("websocket connection failed: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("connection closed unexpectedly")]
    Closed,
    #[error("ping timeout - no frame received")]
    PingTimeout,
    #[error("handshake timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected rpc payload: {0}")]
    UnexpectedPayload(String),
}

impl WsError {
    /// True when the socket is unusable and the caller must reconnect.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            WsError::Connection(_) | WsError::Closed | WsError::PingTimeout | WsError::ConnectTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite;

    #[test]
    fn test_disconnect_classification() {
        assert!(WsError::Closed.is_disconnect());
        assert!(WsError::PingTimeout.is_disconnect());
        assert!(WsError::ConnectTimeout(std::time::Duration::from_secs(10)).is_disconnect());
        assert!(WsError::Connection(tungstenite::Error::ConnectionClosed).is_disconnect());
        assert!(!WsError::Rpc {
            code: -32601,
            message: "Method not found".to_string()
        }
        .is_disconnect());
        assert!(!WsError::UnexpectedPayload("null".to_string()).is_disconnect());
    }
}
