//! Live `ChainClient` backed by subxt's dynamic API.

use crate::chain::value::{account_ss58, as_u128};
use crate::chain::{CallArg, CallRequest, ChainClient, ChainError, Receipt, Reserves};
use async_trait::async_trait;
use std::str::FromStr;
use subxt::config::DefaultExtrinsicParamsBuilder;
use subxt::dynamic::{self, Value};
use subxt::ext::scale_value::Composite;
use subxt::tx::{TxInBlock, TxStatus};
use subxt::utils::AccountId32;
use subxt::{Config, Metadata, OnlineClient, SubstrateConfig};
use subxt_signer::bip39::Mnemonic;
use subxt_signer::sr25519::Keypair;
use tracing::{debug, info};

const PALLET: &str = "SubtensorModule";
/// Blocks a signed stake stays valid for; a stale price must not linger in the pool.
const MORTALITY_BLOCKS: u64 = 4;

pub struct SubxtChainClient {
    api: OnlineClient<SubstrateConfig>,
    signer: Option<Keypair>,
}

impl SubxtChainClient {
    /// Connect without signing capability (storage reads only).
    pub async fn connect(url: &str) -> Result<Self, ChainError> {
        let api = OnlineClient::<SubstrateConfig>::from_insecure_url(url)
            .await
            .map_err(rpc)?;
        info!(url = %url, "subxt client connected");
        Ok(Self { api, signer: None })
    }

    /// Attach the signing keypair derived from a BIP-39 mnemonic.
    pub fn with_mnemonic(mut self, phrase: &str) -> Result<Self, ChainError> {
        let mnemonic = Mnemonic::parse(phrase).map_err(|e| ChainError::Signer(e.to_string()))?;
        let keypair =
            Keypair::from_phrase(&mnemonic, None).map_err(|e| ChainError::Signer(e.to_string()))?;
        info!(
            account = %AccountId32(keypair.public_key().0),
            "signer loaded"
        );
        self.signer = Some(keypair);
        Ok(self)
    }

    pub fn metadata(&self) -> Metadata {
        self.api.metadata()
    }

    async fn fetch_u128(&self, entry: &'static str, netuid: u16) -> Result<u128, ChainError> {
        let address = dynamic::storage(PALLET, entry, vec![Value::u128(netuid as u128)]);
        let value = self
            .api
            .storage()
            .at_latest()
            .await
            .map_err(rpc)?
            .fetch_or_default(&address)
            .await
            .map_err(rpc)?
            .to_value()
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        as_u128(&value).ok_or(ChainError::StorageShape { entry, netuid })
    }
}

fn rpc(e: subxt::Error) -> ChainError {
    ChainError::Rpc(e.to_string())
}

/// `Some` once the transaction is in a block, `None` while it is still travelling,
/// an error when the pool has rejected or dropped it.
fn inclusion<T: Config, C>(status: TxStatus<T, C>) -> Result<Option<TxInBlock<T, C>>, ChainError> {
    match status {
        TxStatus::InBestBlock(in_block) | TxStatus::InFinalizedBlock(in_block) => Ok(Some(in_block)),
        TxStatus::Error { message } | TxStatus::Invalid { message } | TxStatus::Dropped { message } => {
            Err(ChainError::Submission(message))
        }
        _ => Ok(None),
    }
}

fn call_arg_value(arg: CallArg) -> Result<Value, ChainError> {
    Ok(match arg {
        CallArg::Account(ss58) => {
            let account =
                AccountId32::from_str(&ss58).map_err(|_| ChainError::InvalidAccount(ss58.clone()))?;
            Value::from_bytes(account.0)
        }
        CallArg::U16(n) => Value::u128(n as u128),
        CallArg::U64(n) => Value::u128(n as u128),
        CallArg::Bool(b) => Value::bool(b),
    })
}

#[async_trait]
impl ChainClient for SubxtChainClient {
    async fn read_reserves(&self, netuid: u16) -> Result<Reserves, ChainError> {
        let alpha = self.fetch_u128("SubnetAlphaIn", netuid).await?;
        let base = self.fetch_u128("SubnetTAO", netuid).await?;
        debug!(netuid = netuid, alpha = alpha, base = base, "pool reserves");
        Ok(Reserves { alpha, base })
    }

    async fn subnet_owner(&self, netuid: u16) -> Result<Option<String>, ChainError> {
        let address = dynamic::storage(PALLET, "SubnetOwner", vec![Value::u128(netuid as u128)]);
        let Some(thunk) = self
            .api
            .storage()
            .at_latest()
            .await
            .map_err(rpc)?
            .fetch(&address)
            .await
            .map_err(rpc)?
        else {
            return Ok(None);
        };
        let value = thunk
            .to_value()
            .map_err(|e| ChainError::Rpc(e.to_string()))?;
        account_ss58(&value)
            .map(Some)
            .ok_or(ChainError::StorageShape {
                entry: "SubnetOwner",
                netuid,
            })
    }

    async fn submit(&self, call: CallRequest, tip: u128) -> Result<Receipt, ChainError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ChainError::Signer("no signing key configured".to_string()))?;

        let mut fields = Vec::with_capacity(call.params.len());
        for (name, arg) in call.params {
            fields.push((name, call_arg_value(arg)?));
        }
        let payload = dynamic::tx(call.module, call.function, Composite::named(fields));

        let latest = self.api.blocks().at_latest().await.map_err(rpc)?;
        let params = DefaultExtrinsicParamsBuilder::<SubstrateConfig>::new()
            .tip(tip)
            .mortal(latest.header(), MORTALITY_BLOCKS)
            .build();

        let mut progress = self
            .api
            .tx()
            .sign_and_submit_then_watch(&payload, signer, params)
            .await
            .map_err(|e| ChainError::Submission(e.to_string()))?;

        // Best-block inclusion, not finality
        let in_block = loop {
            match progress.next().await {
                Some(Ok(status)) => {
                    if let Some(in_block) = inclusion(status)? {
                        break in_block;
                    }
                }
                Some(Err(e)) => return Err(ChainError::Submission(e.to_string())),
                None => {
                    return Err(ChainError::Submission(
                        "transaction status stream ended before inclusion".to_string(),
                    ))
                }
            }
        };

        let tx_hash = format!("{:?}", in_block.extrinsic_hash());
        let block_hash = format!("{:?}", in_block.block_hash());
        Ok(match in_block.wait_for_success().await {
            Ok(_) => Receipt {
                success: true,
                tx_hash,
                block_hash,
                error: None,
            },
            Err(e) => Receipt {
                success: false,
                tx_hash,
                block_hash,
                error: Some(e.to_string()),
            },
        })
    }
}
