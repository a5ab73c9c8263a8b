//! Subnet owner table. Prints the owner coldkey of every subnet in
//! `1..=SUBNET_COUNT` so the ownership map can be checked by hand.
//!
//! Usage:
//!   WS_URL=wss://entrypoint-finney.opentensor.ai:443 cargo run --bin subnet-owners

use anyhow::{Context, Result};
use swap_sentinel::chain::SubxtChainClient;
use swap_sentinel::watcher::SubnetOwnership;
use tracing::info;

const DEFAULT_SUBNET_COUNT: u16 = 128;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("WS_URL").context("WS_URL must be set")?;
    let subnet_count = match std::env::var("SUBNET_COUNT") {
        Ok(raw) => raw.parse().context("SUBNET_COUNT must be an integer")?,
        Err(_) => DEFAULT_SUBNET_COUNT,
    };

    let client = SubxtChainClient::connect(&url).await?;
    info!(subnets = subnet_count, "querying subnet owners");
    let ownership = SubnetOwnership::load(&client, subnet_count).await?;

    for (netuid, owner) in ownership.entries() {
        println!("{:>4}  {}", netuid, owner);
    }
    println!("{} owned subnets", ownership.len());
    Ok(())
}
