//! Root Publisher
//!
//! Pushes the current tree root on-chain to every configured chain. Batched:
//! a publish fires when enough new leaves accumulated since the last one or
//! when the batch interval elapsed, whichever comes first. A self-lock keeps
//! at most one publish in flight; chains that fail are covered by the next
//! trigger rather than an active retry loop.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::common::RelayerError;
use crate::evm::{ChainAdapter, TxOutcome};
use crate::ledger::LedgerStore;
use crate::tree::SharedTree;
use crate::types::Field;

/// Gas limit for scheduled root publications.
pub const GAS_LIMIT_UPDATE_ROOT: u64 = 250_000;

/// Tighter limit for the pipeline's on-demand publish ahead of a withdrawal.
pub const GAS_LIMIT_UPDATE_ROOT_INLINE: u64 = 150_000;

struct PublishState {
    last_published_leaf_count: u64,
    last_publish_time: Instant,
}

/// Batched multi-chain root publisher.
pub struct RootPublisher {
    adapters: Vec<Arc<dyn ChainAdapter>>,
    tree: SharedTree,
    ledger: Arc<LedgerStore>,
    batch_size: u64,
    batch_interval: Duration,
    /// Self-lock: holds the threshold state and serializes publishes
    state: Mutex<PublishState>,
    signal: Arc<Notify>,
}

impl RootPublisher {
    pub fn new(
        adapters: Vec<Arc<dyn ChainAdapter>>,
        tree: SharedTree,
        ledger: Arc<LedgerStore>,
        batch_size: u64,
        batch_interval: Duration,
        signal: Arc<Notify>,
        initial_leaf_count: u64,
    ) -> Self {
        Self {
            adapters,
            tree,
            ledger,
            batch_size,
            batch_interval,
            state: Mutex::new(PublishState {
                last_published_leaf_count: initial_leaf_count,
                last_publish_time: Instant::now(),
            }),
            signal,
        }
    }

    /// Run until process exit: wake on watcher signals and on the batch
    /// interval, then publish if a threshold is met.
    pub async fn run(self: Arc<Self>) {
        info!(
            target: "veil::publisher",
            batch_size = self.batch_size,
            batch_interval_ms = self.batch_interval.as_millis() as u64,
            "root publisher started"
        );

        loop {
            tokio::select! {
                _ = self.signal.notified() => {}
                _ = tokio::time::sleep(self.batch_interval) => {}
            }
            self.maybe_publish().await;
        }
    }

    /// Publish if either threshold is met. No-op when nothing is new.
    pub async fn maybe_publish(&self) {
        let mut state = self.state.lock().await;

        let (root, leaf_count) = {
            let tree = self.tree.read().await;
            (tree.root(), tree.leaf_count())
        };

        let new_leaves = leaf_count.saturating_sub(state.last_published_leaf_count);
        if new_leaves == 0 {
            return;
        }
        let elapsed = state.last_publish_time.elapsed();
        if new_leaves < self.batch_size && elapsed < self.batch_interval {
            return;
        }

        self.publish_all(root, leaf_count, &mut state).await;
    }

    /// Push `root` to every chain concurrently; record it if any succeeded.
    async fn publish_all(&self, root: Field, leaf_count: u64, state: &mut PublishState) {
        let attempts = join_all(self.adapters.iter().map(|adapter| async move {
            let chain_id = adapter.chain_id();
            (chain_id, adapter.update_root(root, GAS_LIMIT_UPDATE_ROOT).await)
        }))
        .await;

        let mut first_success: Option<String> = None;
        for (chain_id, attempt) in attempts {
            match attempt {
                Ok(outcome) if outcome.success => {
                    info!(
                        target: "veil::publisher",
                        chain_id,
                        root = %root,
                        tx_hash = %outcome.tx_hash,
                        "root published"
                    );
                    first_success.get_or_insert(outcome.tx_hash);
                }
                Ok(outcome) => {
                    warn!(
                        target: "veil::publisher",
                        chain_id,
                        tx_hash = %outcome.tx_hash,
                        "root publication reverted"
                    );
                }
                Err(e) => {
                    warn!(
                        target: "veil::publisher",
                        chain_id,
                        error = %e,
                        "root publication failed"
                    );
                }
            }
        }

        if let Some(tx_hash) = first_success {
            if let Err(e) = self.ledger.insert_root(&root, Some(&tx_hash)) {
                warn!(target: "veil::publisher", error = %e, "failed to record published root");
            }
            state.last_published_leaf_count = leaf_count;
            state.last_publish_time = Instant::now();
        }
    }

    /// On-demand publish of a specific root to one chain, used by the proof
    /// pipeline when a withdrawal's root is not yet known to the target
    /// chain. Serialized behind the same self-lock as scheduled publishes.
    pub async fn publish_to_chain(
        &self,
        chain_id: u64,
        root: Field,
    ) -> Result<TxOutcome, RelayerError> {
        let _state = self.state.lock().await;

        let adapter = self
            .adapters
            .iter()
            .find(|a| a.chain_id() == chain_id)
            .ok_or(RelayerError::UnsupportedChain(chain_id))?;

        let outcome = adapter
            .update_root(root, GAS_LIMIT_UPDATE_ROOT_INLINE)
            .await?;
        if !outcome.success {
            return Err(RelayerError::OnChainRevert(format!(
                "updateRoot reverted in {}",
                outcome.tx_hash
            )));
        }

        info!(
            target: "veil::publisher",
            chain_id,
            root = %root,
            tx_hash = %outcome.tx_hash,
            "root published on demand"
        );
        self.ledger.insert_root(&root, Some(&outcome.tx_hash))?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::MockChainAdapter;
    use crate::tree::CommitmentTree;
    use tokio::sync::RwLock;

    fn field(byte: u8) -> Field {
        Field::from_be_bytes([byte; 32]).unwrap()
    }

    fn ok_outcome(tx: &str) -> TxOutcome {
        TxOutcome {
            tx_hash: tx.to_string(),
            block_number: 1,
            gas_used: 80_000,
            gas_price: 1_000_000_000,
            success: true,
        }
    }

    async fn tree_with_leaves(n: u8) -> SharedTree {
        let mut tree = CommitmentTree::new().unwrap();
        for byte in 1..=n {
            tree.insert(field(byte)).unwrap();
        }
        Arc::new(RwLock::new(tree))
    }

    fn publisher(
        adapters: Vec<Arc<dyn ChainAdapter>>,
        tree: SharedTree,
        ledger: Arc<LedgerStore>,
        batch_size: u64,
        batch_interval: Duration,
    ) -> RootPublisher {
        RootPublisher::new(
            adapters,
            tree,
            ledger,
            batch_size,
            batch_interval,
            Arc::new(Notify::new()),
            0,
        )
    }

    #[tokio::test]
    async fn test_below_both_thresholds_does_not_publish() {
        let mut mock = MockChainAdapter::new();
        mock.expect_chain_id().return_const(1u64);
        mock.expect_update_root().never();

        let tree = tree_with_leaves(1).await;
        let ledger = Arc::new(LedgerStore::in_memory().unwrap());
        let publisher = publisher(
            vec![Arc::new(mock)],
            tree,
            ledger,
            10,
            Duration::from_secs(3600),
        );

        publisher.maybe_publish().await;
    }

    #[tokio::test]
    async fn test_batch_size_triggers_publish() {
        let mut mock = MockChainAdapter::new();
        mock.expect_chain_id().return_const(1u64);
        mock.expect_update_root()
            .times(1)
            .returning(|_, _| Ok(ok_outcome("0xpub")));

        let tree = tree_with_leaves(3).await;
        let root = tree.read().await.root();
        let ledger = Arc::new(LedgerStore::in_memory().unwrap());
        let publisher = publisher(
            vec![Arc::new(mock)],
            tree,
            ledger.clone(),
            3,
            Duration::from_secs(3600),
        );

        publisher.maybe_publish().await;

        let latest = ledger.latest_root().unwrap().unwrap();
        assert_eq!(latest.root, root);
        assert_eq!(latest.tx_hash.as_deref(), Some("0xpub"));

        // second call: nothing new, no further update_root (times(1) enforces)
        publisher.maybe_publish().await;
    }

    #[tokio::test]
    async fn test_interval_triggers_with_any_new_leaf() {
        let mut mock = MockChainAdapter::new();
        mock.expect_chain_id().return_const(1u64);
        mock.expect_update_root()
            .times(1)
            .returning(|_, _| Ok(ok_outcome("0xpub")));

        let tree = tree_with_leaves(1).await;
        let ledger = Arc::new(LedgerStore::in_memory().unwrap());
        let publisher = publisher(
            vec![Arc::new(mock)],
            tree,
            ledger,
            100,
            Duration::from_millis(0),
        );

        publisher.maybe_publish().await;
    }

    #[tokio::test]
    async fn test_partial_chain_failure_still_records() {
        let mut good = MockChainAdapter::new();
        good.expect_chain_id().return_const(1u64);
        good.expect_update_root()
            .returning(|_, _| Ok(ok_outcome("0xgood")));

        let mut bad = MockChainAdapter::new();
        bad.expect_chain_id().return_const(2u64);
        bad.expect_update_root().returning(|_, _| {
            Err(crate::evm::AdapterError::ReceiptTimeout("0xbad".to_string()))
        });

        let tree = tree_with_leaves(2).await;
        let ledger = Arc::new(LedgerStore::in_memory().unwrap());
        let publisher = publisher(
            vec![Arc::new(good), Arc::new(bad)],
            tree,
            ledger.clone(),
            1,
            Duration::from_secs(3600),
        );

        publisher.maybe_publish().await;
        assert!(ledger.latest_root().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_all_chains_failing_leaves_state_unchanged() {
        let mut bad = MockChainAdapter::new();
        bad.expect_chain_id().return_const(1u64);
        // both calls fail; state never advances so the second trigger retries
        bad.expect_update_root().times(2).returning(|_, _| {
            Err(crate::evm::AdapterError::ReceiptTimeout("0xbad".to_string()))
        });

        let tree = tree_with_leaves(2).await;
        let ledger = Arc::new(LedgerStore::in_memory().unwrap());
        let publisher = publisher(
            vec![Arc::new(bad)],
            tree,
            ledger.clone(),
            1,
            Duration::from_secs(3600),
        );

        publisher.maybe_publish().await;
        assert!(ledger.latest_root().unwrap().is_none());
        publisher.maybe_publish().await;
    }

    #[tokio::test]
    async fn test_on_demand_publish() {
        let mut mock = MockChainAdapter::new();
        mock.expect_chain_id().return_const(7u64);
        mock.expect_update_root()
            .withf(|_, gas| *gas == GAS_LIMIT_UPDATE_ROOT_INLINE)
            .returning(|_, _| Ok(ok_outcome("0xinline")));

        let tree = tree_with_leaves(1).await;
        let ledger = Arc::new(LedgerStore::in_memory().unwrap());
        let publisher = publisher(
            vec![Arc::new(mock)],
            tree,
            ledger.clone(),
            10,
            Duration::from_secs(3600),
        );

        let root = field(0x42);
        let outcome = publisher.publish_to_chain(7, root).await.unwrap();
        assert_eq!(outcome.tx_hash, "0xinline");
        assert!(ledger.is_known_root(&root).unwrap());

        assert!(matches!(
            publisher.publish_to_chain(99, root).await,
            Err(RelayerError::UnsupportedChain(99))
        ));
    }
}
