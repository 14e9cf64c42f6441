//! Boot & Recovery
//!
//! The ledger is the source of truth; the in-memory tree is a reconstruction.
//! On startup the ordered leaf sequence is replayed into a fresh tree, the
//! resulting root is checked against the ledger's latest known root (with a
//! self-heal insert on mismatch), and the watcher's dedup set is seeded from
//! the same iterator.

use std::collections::HashSet;
use tracing::{info, warn};

use crate::common::{RelayerError, Result};
use crate::ledger::LedgerStore;
use crate::tree::CommitmentTree;
use crate::types::Field;

/// Everything recovery hands to the service wiring.
pub struct RecoveredState {
    pub tree: CommitmentTree,
    /// Commitments already in the tree, for the watcher's dedup set
    pub seen: HashSet<Field>,
    pub leaf_count: u64,
}

/// Rebuild in-memory state from the ledger.
pub fn recover(ledger: &LedgerStore) -> Result<RecoveredState> {
    let mut tree = CommitmentTree::new()?;
    let leaves = ledger.get_all_leaves_ordered()?;
    let mut seen = HashSet::with_capacity(leaves.len());

    for leaf in &leaves {
        // The tree is not shared yet; inserts need no locking.
        let leaf_index = tree.insert(leaf.commitment)?;
        if leaf_index != leaf.leaf_index {
            // Contiguity violated upstream; the replayed position wins.
            warn!(
                target: "veil::boot",
                stored = leaf.leaf_index,
                replayed = leaf_index,
                commitment = %leaf.commitment,
                "leaf index mismatch during replay"
            );
        }
        seen.insert(leaf.commitment);
    }

    let root = tree.root();
    let matches_latest = ledger
        .latest_root()?
        .map(|latest| latest.root == root)
        .unwrap_or(false);
    if !matches_latest {
        warn!(
            target: "veil::boot",
            root = %root,
            "rebuilt root not the ledger's latest; self-healing"
        );
        ledger.insert_root(&root, None)?;
    }

    let leaf_count = tree.leaf_count();
    info!(
        target: "veil::boot",
        leaf_count,
        root = %root,
        "recovery complete"
    );

    Ok(RecoveredState {
        tree,
        seen,
        leaf_count,
    })
}

/// Open the ledger and recover; boot errors are fatal.
pub fn open_and_recover(db_path: &str) -> Result<(LedgerStore, RecoveredState)> {
    let ledger = LedgerStore::open(db_path)
        .map_err(|e| RelayerError::internal(format!("cannot open ledger at {db_path}: {e}")))?;
    let state = recover(&ledger)?;
    Ok((ledger, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Leaf;

    fn field(byte: u8) -> Field {
        Field::from_be_bytes([byte; 32]).unwrap()
    }

    fn leaf(index: u64, byte: u8) -> Leaf {
        Leaf {
            leaf_index: index,
            commitment: field(byte),
            chain_id: 1,
            block_number: 10 + index,
            tx_index: 0,
            log_index: 0,
            asset: Field::ZERO,
            amount: "0x64".to_string(),
            observed_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_recovery_after_restart_preserves_root() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("relayer.db");

        // Simulate the running kernel: three deposits, root recorded.
        let r3 = {
            let ledger = LedgerStore::open(&db_path).unwrap();
            let mut tree = CommitmentTree::new().unwrap();
            for (i, byte) in [0x0a, 0x0b, 0x0c].into_iter().enumerate() {
                tree.insert(field(byte)).unwrap();
                ledger.insert_leaf(&leaf(i as u64, byte)).unwrap();
            }
            let r3 = tree.root();
            ledger.insert_root(&r3, None).unwrap();
            r3
            // ledger dropped here: the "crash"
        };

        let (ledger, recovered) = open_and_recover(db_path.to_str().unwrap()).unwrap();
        assert_eq!(recovered.leaf_count, 3);
        assert_eq!(recovered.tree.root(), r3);
        assert_eq!(ledger.latest_root().unwrap().unwrap().root, r3);
        assert_eq!(recovered.seen.len(), 3);
        assert!(recovered.seen.contains(&field(0x0b)));
    }

    #[test]
    fn test_self_heal_registers_rebuilt_root() {
        let ledger = LedgerStore::in_memory().unwrap();
        ledger.insert_leaf(&leaf(0, 0x0a)).unwrap();
        // latest root is stale: pretend only some other root was recorded
        ledger.insert_root(&field(0x99), None).unwrap();

        let recovered = recover(&ledger).unwrap();
        let rebuilt = recovered.tree.root();
        assert!(ledger.is_known_root(&rebuilt).unwrap());
        assert_eq!(ledger.latest_root().unwrap().unwrap().root, rebuilt);
    }

    #[test]
    fn test_empty_ledger_boots_clean() {
        let ledger = LedgerStore::in_memory().unwrap();
        let recovered = recover(&ledger).unwrap();
        assert_eq!(recovered.leaf_count, 0);
        assert!(recovered.seen.is_empty());
        // the empty root is registered so a restart is stable
        assert!(ledger.is_known_root(&recovered.tree.root()).unwrap());
    }
}
