//! Veil Relayer Daemon
//!
//! Boot order: configuration, logging, ledger recovery, chain adapters,
//! background services (watcher + publisher), then the REST API. Boot errors
//! are fatal; the ledger is the source of truth and the in-memory tree is
//! rebuilt from it on every start.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tracing::info;

use veil_relayer::api::{self, AppState, ChainSummary};
use veil_relayer::boot;
use veil_relayer::config::RelayerConfig;
use veil_relayer::evm::{ChainAdapter, HttpChainAdapter, Wallet};
use veil_relayer::logging;
use veil_relayer::pipeline::ProofPipeline;
use veil_relayer::publisher::RootPublisher;
use veil_relayer::tree::SharedTree;
use veil_relayer::watcher::{ChainWatcher, WatchedChain};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config = match RelayerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = logging::init_from_config(&config) {
        eprintln!("logging error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(config).await {
        tracing::error!(target: "veil", error = %e, "fatal");
        std::process::exit(1);
    }
}

async fn run(config: RelayerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Recovery: replay the ledger into a fresh tree before anything runs.
    let (ledger, recovered) = boot::open_and_recover(&config.db_path)?;
    let ledger = Arc::new(ledger);
    let tree: SharedTree = Arc::new(RwLock::new(recovered.tree));

    let wallet = Arc::new(Wallet::from_hex(&config.relayer_private_key)?);
    info!(target: "veil", relayer = %wallet.address_hex(), "relayer wallet loaded");

    // One adapter per configured chain, shared by every service.
    let mut adapters: HashMap<u64, Arc<dyn ChainAdapter>> = HashMap::new();
    let mut watched: Vec<WatchedChain> = Vec::new();
    for chain in &config.chains {
        let adapter: Arc<dyn ChainAdapter> = Arc::new(HttpChainAdapter::new(
            chain.chain_id,
            &chain.rpc_url,
            &chain.pool_address,
            &chain.verifier_address,
            wallet.clone(),
            config.rpc_timeout(),
        )?);
        watched.push(WatchedChain {
            adapter: adapter.clone(),
            start_block: chain.start_block,
        });
        adapters.insert(chain.chain_id, adapter);
        info!(
            target: "veil",
            chain_id = chain.chain_id,
            name = %chain.name,
            start_block = chain.start_block,
            "chain configured"
        );
    }

    let publish_signal = Arc::new(Notify::new());
    let publisher = Arc::new(RootPublisher::new(
        adapters.values().cloned().collect(),
        tree.clone(),
        ledger.clone(),
        config.batch_size,
        config.batch_interval(),
        publish_signal.clone(),
        recovered.leaf_count,
    ));

    let watcher = ChainWatcher::new(
        watched,
        tree.clone(),
        ledger.clone(),
        recovered.seen,
        publish_signal.clone(),
        config.poll_interval(),
    );

    let pipeline = Arc::new(ProofPipeline::new(
        tree.clone(),
        ledger.clone(),
        adapters,
        publisher.clone(),
        publish_signal,
        config.fee_margin_bps,
        config.cooldown(),
    ));

    tokio::spawn(watcher.run());
    tokio::spawn(publisher.run());

    let state = Arc::new(AppState {
        pipeline,
        tree,
        ledger,
        relayer_address: wallet.address_hex(),
        fee_margin_bps: config.fee_margin_bps,
        chains: config
            .chains
            .iter()
            .map(|c| ChainSummary {
                chain_id: c.chain_id,
                name: c.name.clone(),
                pool_address: c.pool_address.clone(),
            })
            .collect(),
    });

    let app = api::create_router(state, &config);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(target: "veil", port = config.port, "API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
