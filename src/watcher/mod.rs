//! Chain Watcher
//!
//! Polls every configured chain for `DepositQueued` events and drives them
//! into the commitment tree and ledger in a deterministic global order.
//! Per tick: fan out over chains with bounded block ranges, merge-sort the
//! results by `(block_number, tx_index, log_index, chain_id)`, insert fresh
//! commitments, register the new root locally, advance cursors, and signal
//! the root publisher.
//!
//! RPC errors on one chain never block the others; a failing chain's cursor
//! simply does not advance and it catches up on a later tick.

use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::evm::ChainAdapter;
use crate::ledger::LedgerStore;
use crate::tree::SharedTree;
use crate::types::{unix_now, DepositEvent, Field, Leaf};

/// Blocks fetched per chain per tick, bounding RPC latency.
pub const MAX_RANGE: u64 = 2000;

/// One chain under watch.
pub struct WatchedChain {
    pub adapter: Arc<dyn ChainAdapter>,
    pub start_block: u64,
}

/// What one chain contributed to a tick.
struct ChainScan {
    chain_id: u64,
    /// End of the scanned window; the cursor advances here on commit
    window_end: u64,
    events: Vec<DepositEvent>,
}

/// Multi-chain deposit watcher.
pub struct ChainWatcher {
    chains: Vec<WatchedChain>,
    tree: SharedTree,
    ledger: Arc<LedgerStore>,
    /// Commitments already turned into leaves; seeded from the ledger at boot
    seen: HashSet<Field>,
    publish_signal: Arc<Notify>,
    poll_interval: Duration,
}

impl ChainWatcher {
    pub fn new(
        chains: Vec<WatchedChain>,
        tree: SharedTree,
        ledger: Arc<LedgerStore>,
        seen: HashSet<Field>,
        publish_signal: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chains,
            tree,
            ledger,
            seen,
            publish_signal,
            poll_interval,
        }
    }

    /// Run the watcher until the process exits.
    pub async fn run(mut self) {
        info!(
            target: "veil::watcher",
            chains = self.chains.len(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "chain watcher started"
        );

        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!(target: "veil::watcher", error = %e, "tick failed");
            }
        }
    }

    /// One polling round. Returns the number of leaves inserted.
    pub async fn tick(&mut self) -> Result<usize, crate::common::RelayerError> {
        // Fan out over chains; each failure is isolated.
        let scans = join_all(self.chains.iter().map(|chain| scan_chain(chain, &self.ledger))).await;

        let mut windows: Vec<(u64, u64)> = Vec::new();
        let mut events: Vec<DepositEvent> = Vec::new();
        for scan in scans {
            match scan {
                Ok(Some(scan)) => {
                    windows.push((scan.chain_id, scan.window_end));
                    events.extend(scan.events);
                }
                Ok(None) => {} // caught up
                Err((chain_id, error)) => {
                    warn!(
                        target: "veil::watcher",
                        chain_id,
                        error = %error,
                        "chain scan failed; cursor unchanged"
                    );
                }
            }
        }

        // Canonical global ordering across chains.
        events.sort_by_key(DepositEvent::ordering_key);

        let mut new_leaves: Vec<Leaf> = Vec::new();
        let root = {
            let mut tree = self.tree.write().await;
            for event in &events {
                if self.seen.contains(&event.commitment) {
                    continue;
                }
                match tree.insert(event.commitment) {
                    Ok(leaf_index) => {
                        self.seen.insert(event.commitment);
                        new_leaves.push(Leaf::from_event(event, leaf_index, unix_now()));
                        debug!(
                            target: "veil::watcher",
                            chain_id = event.chain_id,
                            block = event.block_number,
                            leaf_index,
                            commitment = %event.commitment,
                            "deposit inserted"
                        );
                    }
                    Err(e) => {
                        error!(target: "veil::watcher", error = %e, "tree insert failed");
                        break;
                    }
                }
            }
            tree.root()
        };

        if new_leaves.is_empty() && windows.is_empty() {
            return Ok(0);
        }

        // Leaves, the new local root, and cursor advances commit atomically.
        // If this fails the dedup set still matches the tree, so nothing is
        // double-inserted; the unadvanced cursors refetch after restart.
        let inserted = new_leaves.len();
        self.ledger.transaction(|tx| {
            for leaf in &new_leaves {
                tx.insert_leaf(leaf)?;
            }
            if !new_leaves.is_empty() {
                tx.insert_root(&root, None)?;
            }
            for (chain_id, window_end) in &windows {
                tx.set_scan_cursor(*chain_id, *window_end)?;
            }
            Ok(())
        })?;

        if inserted > 0 {
            info!(
                target: "veil::watcher",
                inserted,
                root = %root,
                "tick complete"
            );
            self.publish_signal.notify_one();
        }

        Ok(inserted)
    }
}

/// Scan one chain's next window. Ok(None) means the cursor is at head.
async fn scan_chain(
    chain: &WatchedChain,
    ledger: &LedgerStore,
) -> Result<Option<ChainScan>, (u64, String)> {
    let chain_id = chain.adapter.chain_id();

    let cursor = ledger
        .get_scan_cursor(chain_id)
        .map_err(|e| (chain_id, e.to_string()))?;
    let from = (cursor + 1).max(chain.start_block);

    let head = chain
        .adapter
        .latest_block()
        .await
        .map_err(|e| (chain_id, e.to_string()))?;
    if from > head {
        return Ok(None);
    }

    let to = (from + MAX_RANGE - 1).min(head);
    let events = chain
        .adapter
        .deposit_events(from, to)
        .await
        .map_err(|e| (chain_id, e.to_string()))?;

    Ok(Some(ChainScan {
        chain_id,
        window_end: to,
        events,
    }))
}
