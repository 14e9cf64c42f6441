//! Deposit Types
//!
//! A deposit is observed on some chain as a `DepositQueued` log, parsed into
//! its canonical form, and becomes a commitment tree leaf. The canonical
//! global ordering of deposits across chains is
//! `(block_number, tx_index, log_index, chain_id)`.

use serde::{Deserialize, Serialize};

use super::field::Field;

/// A deposit event parsed from a chain log, before leaf assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    /// The commitment published on-chain (the future leaf value)
    pub commitment: Field,
    /// Chain the event was observed on
    pub chain_id: u64,
    /// Block number of the emitting transaction
    pub block_number: u64,
    /// Transaction index within the block
    pub tx_index: u32,
    /// Log index within the block
    pub log_index: u32,
    /// Asset identifier
    pub asset: Field,
    /// Deposited amount, kept opaque as a 0x hex quantity
    pub amount: String,
    /// Deposit timestamp as reported by the contract
    pub timestamp: u64,
}

impl DepositEvent {
    /// Canonical cross-chain ordering key. Sorting a batch of events by this
    /// key makes leaf index assignment reproducible.
    pub fn ordering_key(&self) -> (u64, u32, u32, u64) {
        (self.block_number, self.tx_index, self.log_index, self.chain_id)
    }
}

/// A persisted commitment tree leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf {
    /// Position in the commitment tree, contiguous from 0
    pub leaf_index: u64,
    /// Leaf value
    pub commitment: Field,
    /// Source chain (0 for off-chain transfer outputs)
    pub chain_id: u64,
    /// Source block number (0 for off-chain transfer outputs)
    pub block_number: u64,
    pub tx_index: u32,
    pub log_index: u32,
    pub asset: Field,
    pub amount: String,
    /// Unix seconds at observation
    pub observed_at: u64,
}

impl Leaf {
    /// Build the leaf row for a deposit event at its assigned index.
    pub fn from_event(event: &DepositEvent, leaf_index: u64, observed_at: u64) -> Self {
        Self {
            leaf_index,
            commitment: event.commitment,
            chain_id: event.chain_id,
            block_number: event.block_number,
            tx_index: event.tx_index,
            log_index: event.log_index,
            asset: event.asset,
            amount: event.amount.clone(),
            observed_at,
        }
    }

    /// Build a leaf row for a transfer output, which has no on-chain origin.
    pub fn from_transfer_output(commitment: Field, leaf_index: u64, observed_at: u64) -> Self {
        Self {
            leaf_index,
            commitment,
            chain_id: 0,
            block_number: 0,
            tx_index: 0,
            log_index: 0,
            asset: Field::ZERO,
            amount: "0x0".to_string(),
            observed_at,
        }
    }
}

/// A known Merkle root recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownRoot {
    /// Monotone ordinal assigned at insertion
    pub root_index: u64,
    pub root: Field,
    /// On-chain publication tx, if the root was pushed out
    pub tx_hash: Option<String>,
    /// Unix seconds at recording
    pub recorded_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(chain_id: u64, block: u64, tx: u32, log: u32) -> DepositEvent {
        DepositEvent {
            commitment: Field::ZERO,
            chain_id,
            block_number: block,
            tx_index: tx,
            log_index: log,
            asset: Field::ZERO,
            amount: "0x0".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_ordering_prefers_block_then_position_then_chain() {
        let mut events = vec![
            event(5, 101, 0, 0),
            event(1, 100, 0, 1),
            event(2, 100, 0, 0),
            event(1, 100, 0, 0),
        ];
        events.sort_by_key(|e| e.ordering_key());

        let keys: Vec<_> = events.iter().map(|e| e.ordering_key()).collect();
        assert_eq!(
            keys,
            vec![(100, 0, 0, 1), (100, 0, 0, 2), (100, 0, 1, 1), (101, 0, 0, 5)]
        );
    }
}
