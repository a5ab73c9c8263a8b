//! Subtensor mempool sentinel.
//!
//! Watches a node's pending pool for `schedule_swap_coldkey` calls made by
//! subnet owners, alerts the operator and places a price-bounded stake on the
//! affected subnet.

pub mod chain;
pub mod config;
pub mod notify;
pub mod stake;
pub mod watcher;
pub mod ws;

#[cfg(test)]
mod testing;
