//! Mempool watch for scheduled coldkey swaps.
//!
//! Architecture:
//! - `BlockTracker`: follows `chain_subscribeNewHeads` on its own connection and
//!   clears the dedup set whenever the best height changes
//! - `ExtrinsicPoller`: polls `author_pendingExtrinsics` on a second connection,
//!   classifies new entries and hands matched swaps to the stake dispatcher
//! - `WatchContext`: the only state the two loops share

pub mod blocks;
pub mod pending;

pub use blocks::BlockTracker;
pub use pending::ExtrinsicPoller;

use crate::chain::{ChainClient, ChainError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A scheduled coldkey swap by a subnet owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapEvent {
    pub caller: String,
    pub new_coldkey: String,
    pub netuid: u16,
}

/// Owner coldkey (SS58) → subnet id. Built once at startup, never mutated.
#[derive(Debug, Clone, Default)]
pub struct SubnetOwnership {
    owners: HashMap<String, u16>,
}

impl SubnetOwnership {
    /// Query owners of subnets `1..=subnet_count`. Missing subnets are skipped.
    pub async fn load(client: &dyn ChainClient, subnet_count: u16) -> Result<Self, ChainError> {
        let mut owners = HashMap::new();
        for netuid in 1..=subnet_count {
            match client.subnet_owner(netuid).await? {
                Some(owner) => {
                    debug!(netuid = netuid, owner = %owner, "subnet owner");
                    owners.insert(owner, netuid);
                }
                None => debug!(netuid = netuid, "subnet has no owner"),
            }
        }
        info!(subnets = owners.len(), "subnet ownership loaded");
        Ok(Self { owners })
    }

    pub fn subnet_for(&self, owner: &str) -> Option<u16> {
        self.owners.get(owner).copied()
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Entries sorted by subnet id.
    pub fn entries(&self) -> Vec<(u16, &str)> {
        let mut entries: Vec<(u16, &str)> = self
            .owners
            .iter()
            .map(|(owner, netuid)| (*netuid, owner.as_str()))
            .collect();
        entries.sort_unstable();
        entries
    }
}

impl FromIterator<(String, u16)> for SubnetOwnership {
    fn from_iter<I: IntoIterator<Item = (String, u16)>>(iter: I) -> Self {
        Self {
            owners: iter.into_iter().collect(),
        }
    }
}

/// State shared by the block tracker and the pending poller.
#[derive(Clone)]
pub struct WatchContext {
    /// Pending extrinsics already handled in the current block epoch.
    seen: Arc<Mutex<HashSet<String>>>,
    ownership: Arc<SubnetOwnership>,
}

impl WatchContext {
    pub fn new(ownership: SubnetOwnership) -> Self {
        Self {
            seen: Arc::new(Mutex::new(HashSet::new())),
            ownership: Arc::new(ownership),
        }
    }

    /// Mark `id` as seen. Returns false if it was already seen this epoch.
    pub async fn mark_seen(&self, id: &str) -> bool {
        let mut seen = self.seen.lock().await;
        if seen.contains(id) {
            return false;
        }
        seen.insert(id.to_string());
        true
    }

    /// Start a new epoch. Returns how many entries were dropped.
    pub async fn clear_seen(&self) -> usize {
        let mut seen = self.seen.lock().await;
        let dropped = seen.len();
        seen.clear();
        dropped
    }

    pub async fn seen_len(&self) -> usize {
        self.seen.lock().await.len()
    }

    pub fn subnet_for(&self, owner: &str) -> Option<u16> {
        self.ownership.subnet_for(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeChain;

    #[tokio::test]
    async fn test_mark_seen_once_per_epoch() {
        let ctx = WatchContext::new(SubnetOwnership::default());
        assert!(ctx.mark_seen("0xaa").await);
        assert!(!ctx.mark_seen("0xaa").await);
        assert!(ctx.mark_seen("0xbb").await);

        assert_eq!(ctx.clear_seen().await, 2);
        assert_eq!(ctx.seen_len().await, 0);
        assert!(ctx.mark_seen("0xaa").await);
    }

    #[tokio::test]
    async fn test_ownership_load_skips_missing() {
        let chain = FakeChain::default();
        chain.set_owner(1, "owner-1");
        chain.set_owner(3, "owner-3");

        let ownership = SubnetOwnership::load(&chain, 4).await.unwrap();
        assert_eq!(ownership.len(), 2);
        assert_eq!(ownership.subnet_for("owner-3"), Some(3));
        assert_eq!(ownership.subnet_for("owner-2"), None);
        assert_eq!(ownership.entries(), vec![(1, "owner-1"), (3, "owner-3")]);
    }
}
