use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use swap_sentinel::chain::{ChainClient, MetadataDecoder, SubxtChainClient};
use swap_sentinel::config::Config;
use swap_sentinel::notify::{Notifier, TelegramNotifier};
use swap_sentinel::stake::{ActionDispatcher, StakeParams, StakeSubmitter};
use swap_sentinel::watcher::{BlockTracker, ExtrinsicPoller, SubnetOwnership, WatchContext};
use swap_sentinel::ws::ChainConnection;
use tracing::{error, info};

const CONFIG_PATH: &str = "sentinel.toml";
const HEADS_FIRST_ID: u64 = 1;
const PENDING_FIRST_ID: u64 = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = if Path::new(CONFIG_PATH).exists() {
        Config::load(Path::new(CONFIG_PATH))?
    } else {
        Config::from_env()?
    };

    // Initialize logging
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .init();
    }

    info!("swap-sentinel v{} starting", env!("CARGO_PKG_VERSION"));

    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&config.telegram));

    // --- Chain client + codec ---
    let client = SubxtChainClient::connect(&config.node.ws_url)
        .await
        .context("connecting to node for metadata")?
        .with_mnemonic(&config.node.mnemonic)?;
    let decoder = Arc::new(MetadataDecoder::new(client.metadata()));
    let client: Arc<dyn ChainClient> = Arc::new(client);

    // --- Subnet ownership ---
    info!(subnets = config.node.subnet_count, "getting subnet owner coldkeys");
    let ownership = SubnetOwnership::load(client.as_ref(), config.node.subnet_count).await?;
    let owned = ownership.len();
    let ctx = WatchContext::new(ownership);

    // --- Stake dispatcher ---
    let submitter = Arc::new(StakeSubmitter::new(
        client.clone(),
        notifier.clone(),
        StakeParams::from(&config.stake),
    ));
    let (dispatcher, dispatch) = ActionDispatcher::new(submitter, notifier.clone());
    let dispatcher_task = dispatcher.start();

    // --- Watch loops ---
    let tracker = BlockTracker::new(
        ctx.clone(),
        ChainConnection::new(config.node.ws_url.clone(), "heads", notifier.clone(), HEADS_FIRST_ID),
        notifier.clone(),
    );
    let poller = ExtrinsicPoller::new(
        ctx,
        ChainConnection::new(config.node.ws_url.clone(), "pending", notifier.clone(), PENDING_FIRST_ID),
        decoder,
        notifier.clone(),
        dispatch,
        config.node.poll_interval(),
    );

    info!(
        owners = owned,
        poll_secs = config.node.poll_interval_secs,
        "starting listeners"
    );
    notifier.notify(&format!("Sentinel started, watching {} subnet owners", owned));

    let tracker_task = tracker.start();
    let poller_task = poller.start();

    // The loops never return on their own; reaching this means a task died.
    tokio::select! {
        res = tracker_task => error!(result = ?res, "block tracker exited"),
        res = poller_task => error!(result = ?res, "pending poller exited"),
        res = dispatcher_task => error!(result = ?res, "stake dispatcher exited"),
    }
    notifier.notify("Sentinel stopped: a watch task exited");
    anyhow::bail!("watch task exited unexpectedly")
}
