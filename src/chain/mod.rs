//! Chain collaborators: extrinsic decoding, storage reads and submission.
//!
//! The watcher and stake paths only see the `ExtrinsicDecoder` and
//! `ChainClient` traits. `MetadataDecoder` and `SubxtChainClient` are the
//! live implementations backed by subxt.

pub mod client;
pub mod decoder;
pub mod value;

pub use client::SubxtChainClient;
pub use decoder::MetadataDecoder;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("length prefix says {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("unsupported extrinsic version byte 0x{0:02x}")]
    UnsupportedVersion(u8),
    #[error("scale decode failed in {part}: {reason}")]
    Scale { part: &'static str, reason: String },
    #[error("{0} trailing bytes after call")]
    TrailingBytes(usize),
    #[error("unexpected shape for {0}")]
    UnexpectedShape(&'static str),
}

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("invalid account {0}")]
    InvalidAccount(String),
    #[error("storage {entry} for subnet {netuid} has unexpected shape")]
    StorageShape { entry: &'static str, netuid: u16 },
    #[error("signer error: {0}")]
    Signer(String),
    #[error("submission failed: {0}")]
    Submission(String),
}

/// A decoded extrinsic reduced to what classification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCall {
    pub module: String,
    pub function: String,
    /// SS58 address of the signer; `None` for unsigned extrinsics.
    pub caller: Option<String>,
    /// Call arguments in declaration order, values rendered as text.
    pub args: Vec<(String, String)>,
}

impl DecodedCall {
    pub fn is_call(&self, module: &str, function: &str) -> bool {
        self.module == module && self.function == function
    }

    /// First argument with this name. Later duplicates are ignored.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

pub trait ExtrinsicDecoder: Send + Sync {
    fn decode(&self, raw_hex: &str) -> Result<DecodedCall, DecodeError>;
}

/// Subnet AMM pool reserves, both in rao.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserves {
    pub alpha: u128,
    pub base: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    Account(String),
    U16(u16),
    U64(u64),
    Bool(bool),
}

/// A runtime call to compose, with named parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub module: &'static str,
    pub function: &'static str,
    pub params: Vec<(&'static str, CallArg)>,
}

/// Outcome of a submitted extrinsic that made it into a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub success: bool,
    pub tx_hash: String,
    pub block_hash: String,
    pub error: Option<String>,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn read_reserves(&self, netuid: u16) -> Result<Reserves, ChainError>;

    /// Owner coldkey (SS58) of a subnet, `None` when the subnet does not exist.
    async fn subnet_owner(&self, netuid: u16) -> Result<Option<String>, ChainError>;

    /// Sign, submit and wait for inclusion.
    async fn submit(&self, call: CallRequest, tip: u128) -> Result<Receipt, ChainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_first_match_wins() {
        let call = DecodedCall {
            module: "SubtensorModule".to_string(),
            function: "schedule_swap_coldkey".to_string(),
            caller: Some("A".to_string()),
            args: vec![
                ("new_coldkey".to_string(), "B".to_string()),
                ("new_coldkey".to_string(), "C".to_string()),
            ],
        };
        assert!(call.is_call("SubtensorModule", "schedule_swap_coldkey"));
        assert!(!call.is_call("SubtensorModule", "add_stake"));
        assert_eq!(call.arg("new_coldkey"), Some("B"));
        assert_eq!(call.arg("missing"), None);
    }
}
