//! Hedging stake in response to a detected coldkey swap.
//!
//! Every attempt re-reads the pool reserves and reprices before signing, so a
//! retry never reuses a stale limit price. The failure budget belongs to a
//! single `stake` call; independent swaps never share it.

pub mod dispatcher;

pub use dispatcher::{ActionDispatcher, DispatchHandle};

use crate::chain::{CallArg, CallRequest, ChainClient, Receipt, Reserves};
use crate::config::StakeConfig;
use crate::notify::Notifier;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Below 1 Pα of alpha in the pool the subnet is treated as inactive.
pub const MIN_ALPHA_RESERVE: u128 = 1_000_000_000_000_000;
pub const RAO_PER_TAO: u64 = 1_000_000_000;

#[derive(Debug, Clone)]
pub struct StakeParams {
    pub amount: u64,
    pub tip: u128,
    pub slippage: Decimal,
    pub validator_hotkey: String,
    pub max_attempts: u32,
}

impl From<&StakeConfig> for StakeParams {
    fn from(config: &StakeConfig) -> Self {
        Self {
            amount: config.amount,
            tip: config.tip,
            slippage: config.slippage,
            validator_hotkey: config.validator_hotkey.clone(),
            max_attempts: config.max_attempts,
        }
    }
}

/// One priced stake, ready to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeAttempt {
    pub netuid: u16,
    pub amount: u64,
    pub tip: u128,
    /// Rao per alpha.
    pub limit_price: u64,
    /// 1-based.
    pub attempt: u32,
}

impl StakeAttempt {
    pub fn call(&self, validator_hotkey: &str) -> CallRequest {
        CallRequest {
            module: "SubtensorModule",
            function: "add_stake_limit",
            params: vec![
                ("hotkey", CallArg::Account(validator_hotkey.to_string())),
                ("netuid", CallArg::U16(self.netuid)),
                ("amount_staked", CallArg::U64(self.amount)),
                ("limit_price", CallArg::U64(self.limit_price)),
                ("allow_partial", CallArg::Bool(false)),
            ],
        }
    }
}

#[derive(Debug)]
enum AttemptOutcome {
    Included(Receipt),
    Failed(String),
    InactiveMarket,
}

/// Base units per alpha, exact decimal division.
pub fn spot_price(reserves: Reserves) -> Option<Decimal> {
    let base = Decimal::from_u128(reserves.base)?;
    let alpha = Decimal::from_u128(reserves.alpha)?;
    base.checked_div(alpha)
}

/// `price * slippage` expressed in rao, truncated.
pub fn limit_price(price: Decimal, slippage: Decimal) -> Option<u64> {
    price
        .checked_mul(slippage)?
        .checked_mul(Decimal::from(RAO_PER_TAO))?
        .trunc()
        .to_u64()
}

pub struct StakeSubmitter {
    client: Arc<dyn ChainClient>,
    notifier: Arc<dyn Notifier>,
    params: StakeParams,
}

impl StakeSubmitter {
    pub fn new(client: Arc<dyn ChainClient>, notifier: Arc<dyn Notifier>, params: StakeParams) -> Self {
        Self {
            client,
            notifier,
            params,
        }
    }

    /// Stake into `netuid`, retrying failed submissions up to the attempt bound.
    pub async fn stake(&self, netuid: u16) -> bool {
        let mut failures = 0u32;
        loop {
            match self.attempt(netuid, failures + 1).await {
                AttemptOutcome::Included(receipt) => {
                    let msg = format!(
                        "✅ Transaction successful: {} in {}",
                        receipt.tx_hash, receipt.block_hash
                    );
                    info!(
                        netuid = netuid,
                        tx = %receipt.tx_hash,
                        block = %receipt.block_hash,
                        attempts = failures + 1,
                        "stake included"
                    );
                    self.notifier.notify(&msg);
                    return true;
                }
                AttemptOutcome::InactiveMarket => return false,
                AttemptOutcome::Failed(reason) => {
                    failures += 1;
                    let msg = format!(
                        "❌ Transaction failed ({}/{}): {}",
                        failures, self.params.max_attempts, reason
                    );
                    warn!(netuid = netuid, attempt = failures, reason = %reason, "stake attempt failed");
                    self.notifier.notify(&msg);

                    if failures >= self.params.max_attempts {
                        let msg = format!(
                            "❌ Staking on subnet {} failed after {} attempts, giving up",
                            netuid, failures
                        );
                        error!(netuid = netuid, attempts = failures, "stake retries exhausted");
                        self.notifier.notify(&msg);
                        return false;
                    }
                }
            }
        }
    }

    async fn attempt(&self, netuid: u16, attempt: u32) -> AttemptOutcome {
        let reserves = match self.client.read_reserves(netuid).await {
            Ok(reserves) => reserves,
            Err(e) => return AttemptOutcome::Failed(format!("reserve query failed: {}", e)),
        };

        if reserves.alpha < MIN_ALPHA_RESERVE {
            let msg = format!(
                "Low alpha on subnet {}, likely inactive market, not staking",
                netuid
            );
            warn!(netuid = netuid, alpha = reserves.alpha, "alpha reserve below threshold");
            self.notifier.notify(&msg);
            return AttemptOutcome::InactiveMarket;
        }

        let Some(price) = spot_price(reserves) else {
            return AttemptOutcome::Failed("price out of range".to_string());
        };
        let Some(limit) = limit_price(price, self.params.slippage) else {
            return AttemptOutcome::Failed("limit price out of range".to_string());
        };

        let stake = StakeAttempt {
            netuid,
            amount: self.params.amount,
            tip: self.params.tip,
            limit_price: limit,
            attempt,
        };

        let msg = format!(
            "Staking {} at {:.10} TAO/α on subnet {}",
            stake.amount, price, netuid
        );
        info!(
            netuid = netuid,
            amount = stake.amount,
            price = %price,
            limit_price = stake.limit_price,
            attempt = attempt,
            "submitting stake"
        );
        self.notifier.notify(&msg);

        match self
            .client
            .submit(stake.call(&self.params.validator_hotkey), stake.tip)
            .await
        {
            Ok(receipt) if receipt.success => AttemptOutcome::Included(receipt),
            Ok(receipt) => AttemptOutcome::Failed(
                receipt
                    .error
                    .unwrap_or_else(|| "dispatch failed".to_string()),
            ),
            Err(e) => AttemptOutcome::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{limit_price_of, FakeChain, RecordingNotifier};
    use std::str::FromStr;

    const ACTIVE_ALPHA: u128 = 2_000_000_000_000_000;

    fn params() -> StakeParams {
        StakeParams {
            amount: 6_000_000_000,
            tip: 10_000_000,
            slippage: Decimal::from_str("1.3").unwrap(),
            validator_hotkey: "5GKH9FPPnWSUoeeTJp19wVtd84XqFW4pyK2ijV2GsFbhTrP1".to_string(),
            max_attempts: 5,
        }
    }

    fn submitter(chain: &Arc<FakeChain>, notifier: &Arc<RecordingNotifier>) -> StakeSubmitter {
        StakeSubmitter::new(chain.clone(), notifier.clone(), params())
    }

    #[test]
    fn test_limit_price_math() {
        let price = spot_price(Reserves {
            alpha: 4_000_000_000_000_000,
            base: 1_000_000_000_000_000,
        })
        .unwrap();
        assert_eq!(price, Decimal::from_str("0.25").unwrap());
        // 0.25 * 1.3 * 1e9
        assert_eq!(limit_price(price, Decimal::from_str("1.3").unwrap()), Some(325_000_000));
    }

    #[test]
    fn test_limit_price_truncates() {
        let price = spot_price(Reserves { alpha: 3, base: 1 }).unwrap();
        assert_eq!(limit_price(price, Decimal::ONE), Some(333_333_333));
        assert_eq!(spot_price(Reserves { alpha: 0, base: 1 }), None);
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let chain = Arc::new(FakeChain::default());
        let notifier = Arc::new(RecordingNotifier::default());
        chain.push_reserves(ACTIVE_ALPHA, 1_000_000_000_000_000);

        assert!(submitter(&chain, &notifier).stake(7).await);

        let submitted = chain.submitted();
        assert_eq!(submitted.len(), 1);
        let (call, tip) = &submitted[0];
        assert_eq!(call.function, "add_stake_limit");
        assert_eq!(*tip, 10_000_000);
        assert!(call.params.contains(&("netuid", CallArg::U16(7))));
        assert!(call.params.contains(&("amount_staked", CallArg::U64(6_000_000_000))));
        // 0.5 * 1.3 * 1e9
        assert_eq!(limit_price_of(call), Some(650_000_000));
        assert!(notifier.messages().iter().any(|m| m.starts_with("✅")));
    }

    #[tokio::test]
    async fn test_inactive_market_never_submits() {
        let chain = Arc::new(FakeChain::default());
        let notifier = Arc::new(RecordingNotifier::default());
        chain.push_reserves(MIN_ALPHA_RESERVE - 1, 1_000_000_000_000_000);

        assert!(!submitter(&chain, &notifier).stake(3).await);
        assert!(chain.submitted().is_empty());
        assert_eq!(chain.reserve_reads(), 1);
        assert!(notifier.messages()[0].contains("likely inactive market"));
    }

    #[tokio::test]
    async fn test_retry_reprices_each_attempt() {
        let chain = Arc::new(FakeChain::default());
        let notifier = Arc::new(RecordingNotifier::default());
        chain.push_reserves(ACTIVE_ALPHA, 1_000_000_000_000_000);
        chain.push_reserves(ACTIVE_ALPHA, 1_200_000_000_000_000);
        chain.push_failure("Custom error: 11");

        assert!(submitter(&chain, &notifier).stake(7).await);

        let submitted = chain.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(chain.reserve_reads(), 2);
        let first = limit_price_of(&submitted[0].0).unwrap();
        let second = limit_price_of(&submitted[1].0).unwrap();
        assert_eq!(first, 650_000_000);
        assert_eq!(second, 780_000_000);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_failures() {
        let chain = Arc::new(FakeChain::default());
        let notifier = Arc::new(RecordingNotifier::default());
        chain.push_reserves(ACTIVE_ALPHA, 1_000_000_000_000_000);
        for _ in 0..6 {
            chain.push_failure("SlippageTooHigh");
        }

        assert!(!submitter(&chain, &notifier).stake(7).await);

        assert_eq!(chain.submitted().len(), 5);
        let finals = notifier
            .messages()
            .iter()
            .filter(|m| m.contains("giving up"))
            .count();
        assert_eq!(finals, 1);
    }

    #[tokio::test]
    async fn test_failure_budget_is_per_call() {
        let chain = Arc::new(FakeChain::default());
        let notifier = Arc::new(RecordingNotifier::default());
        chain.push_reserves(ACTIVE_ALPHA, 1_000_000_000_000_000);
        for _ in 0..4 {
            chain.push_failure("Timeout");
        }
        let submitter = submitter(&chain, &notifier);

        // Four failures then success on the fifth attempt
        assert!(submitter.stake(7).await);
        // A later event starts with a full budget
        assert!(submitter.stake(8).await);
        assert_eq!(chain.submitted().len(), 6);
    }

    #[tokio::test]
    async fn test_reserve_read_error_counts_as_failure() {
        let chain = Arc::new(FakeChain::default());
        let notifier = Arc::new(RecordingNotifier::default());
        chain.fail_reserve_reads();

        assert!(!submitter(&chain, &notifier).stake(7).await);
        assert_eq!(chain.reserve_reads(), 5);
        assert!(chain.submitted().is_empty());
    }
}
