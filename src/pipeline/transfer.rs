//! Transfer Handling
//!
//! A transfer is a purely off-chain state transition: input notes are
//! nullified and output commitments enter the tree, with no value crossing
//! the pool boundary. The proof is checked through the on-chain verifier via
//! a read-only call; nullifiers and new leaves then commit in one ledger
//! transaction so a crash cannot separate them.

use tracing::info;

use crate::common::{RelayerError, Result};
use crate::tree::MAX_LEAVES;
use crate::types::{unix_now, Leaf, ProofBytes, PublicSignals, TransferRequest, TransferResponse};

use super::ProofPipeline;

impl ProofPipeline {
    /// Validate and apply a transfer request.
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferResponse> {
        let request_id = format!("tf_{}_{:08x}", unix_now(), rand::random::<u32>());

        let signals = PublicSignals::parse(&request.public_signals)?;
        if !signals.public_amount().is_zero() {
            return Err(RelayerError::InvalidTransfer);
        }

        let proof = ProofBytes::from_hex(&request.proof)?;
        let adapter = self.adapter(request.target_chain_id)?;

        let root = signals.merkle_root();
        if !self.ledger.is_known_root(&root)? {
            return Err(RelayerError::UnknownRoot);
        }

        let nullifiers = signals.claimed_nullifiers();
        let _guard = self.locks.acquire(&nullifiers).await;

        if self.ledger.is_nullifier_spent(&signals.nullifier0())? {
            return Err(RelayerError::NullifierSpent(0));
        }
        if !signals.nullifier1().is_zero() && self.ledger.is_nullifier_spent(&signals.nullifier1())? {
            return Err(RelayerError::NullifierSpent(1));
        }

        // Read-only verifier call; no gas is spent.
        let verified = adapter
            .verify_proof(proof.words(), *signals.as_array())
            .await?;
        if !verified {
            return Err(RelayerError::InvalidProof);
        }

        let outputs = signals.output_commitments();

        // Tree inserts are the fast, in-memory step. The ledger commit below
        // is authoritative: if it fails, the next boot rebuilds the tree from
        // the ledger and the uncommitted leaves vanish.
        let mut new_leaves: Vec<Leaf> = Vec::with_capacity(outputs.len());
        let root_after = {
            let mut tree = self.tree.write().await;
            if tree.leaf_count() + outputs.len() as u64 > MAX_LEAVES {
                return Err(RelayerError::TreeFull);
            }
            for commitment in &outputs {
                let leaf_index = tree.insert(*commitment)?;
                new_leaves.push(Leaf::from_transfer_output(*commitment, leaf_index, unix_now()));
            }
            tree.root()
        };

        self.ledger.transaction(|tx| {
            for nullifier in &nullifiers {
                tx.insert_nullifier(nullifier, None)?;
            }
            for leaf in &new_leaves {
                tx.insert_leaf(leaf)?;
            }
            if !new_leaves.is_empty() {
                tx.insert_root(&root_after, None)?;
            }
            Ok(())
        })?;

        if !new_leaves.is_empty() {
            self.publish_signal.notify_one();
        }

        info!(
            target: "veil::pipeline",
            request_id = %request_id,
            chain_id = request.target_chain_id,
            nullifiers = nullifiers.len(),
            outputs = new_leaves.len(),
            "transfer applied"
        );
        Ok(TransferResponse {
            success: true,
            tx_hash: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::evm::MockChainAdapter;
    use crate::types::Field;
    use std::time::Duration;

    fn request(fx_root: Field, amount: u8) -> TransferRequest {
        TransferRequest {
            proof: proof_hex(),
            public_signals: signals(
                fx_root,
                field(0x02),
                field(0x03),
                field(0x0a),
                field(0x0b),
                amount,
            ),
            target_chain_id: 1,
        }
    }

    #[tokio::test]
    async fn test_nonzero_public_amount_rejected_before_any_state() {
        let mut mock = MockChainAdapter::new();
        mock.expect_verify_proof().never();

        let fx = fixture(mock, Duration::ZERO);
        let result = fx.pipeline.transfer(request(fx.known_root, 1)).await;
        assert!(matches!(result, Err(RelayerError::InvalidTransfer)));
        assert!(!fx.ledger.is_nullifier_spent(&field(0x02)).unwrap());
        assert_eq!(fx.tree.read().await.leaf_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_applies_atomically() {
        let mut mock = MockChainAdapter::new();
        mock.expect_verify_proof().times(1).returning(|_, _| Ok(true));

        let fx = fixture(mock, Duration::ZERO);
        let resp = fx.pipeline.transfer(request(fx.known_root, 0)).await.unwrap();
        assert!(resp.success);
        assert!(resp.tx_hash.is_none());

        // both nullifiers marked, both outputs inserted
        assert!(fx.ledger.is_nullifier_spent(&field(0x02)).unwrap());
        assert!(fx.ledger.is_nullifier_spent(&field(0x03)).unwrap());
        assert_eq!(fx.tree.read().await.leaf_count(), 2);

        let leaf = fx.ledger.get_leaf_by_commitment(&field(0x0a)).unwrap().unwrap();
        assert_eq!(leaf.leaf_index, 0);
        assert_eq!(leaf.block_number, 0);
        assert_eq!(leaf.chain_id, 0);

        // the post-transfer root is immediately known
        let root_after = fx.tree.read().await.root();
        assert!(fx.ledger.is_known_root(&root_after).unwrap());
    }

    #[tokio::test]
    async fn test_invalid_proof_mutates_nothing() {
        let mut mock = MockChainAdapter::new();
        mock.expect_verify_proof().times(1).returning(|_, _| Ok(false));

        let fx = fixture(mock, Duration::ZERO);
        let result = fx.pipeline.transfer(request(fx.known_root, 0)).await;
        assert!(matches!(result, Err(RelayerError::InvalidProof)));
        assert!(!fx.ledger.is_nullifier_spent(&field(0x02)).unwrap());
        assert_eq!(fx.tree.read().await.leaf_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_replay_rejected() {
        let mut mock = MockChainAdapter::new();
        mock.expect_verify_proof().times(1).returning(|_, _| Ok(true));

        let fx = fixture(mock, Duration::ZERO);
        fx.pipeline.transfer(request(fx.known_root, 0)).await.unwrap();

        let replay = fx.pipeline.transfer(request(fx.known_root, 0)).await;
        assert!(matches!(replay, Err(RelayerError::NullifierSpent(0))));
    }

    #[tokio::test]
    async fn test_dummy_nullifier_bypassed_and_never_stored() {
        let mut mock = MockChainAdapter::new();
        mock.expect_verify_proof().times(1).returning(|_, _| Ok(true));

        let fx = fixture(mock, Duration::ZERO);
        let mut req = request(fx.known_root, 0);
        // single input note: nullifier1 is the zero dummy
        req.public_signals = signals(
            fx.known_root,
            field(0x02),
            Field::ZERO,
            field(0x0a),
            Field::ZERO,
            0,
        );

        fx.pipeline.transfer(req).await.unwrap();
        assert!(fx.ledger.is_nullifier_spent(&field(0x02)).unwrap());
        assert!(!fx.ledger.is_nullifier_spent(&Field::ZERO).unwrap());
        // only the single non-dummy output was inserted
        assert_eq!(fx.tree.read().await.leaf_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_root_rejected() {
        let fx = fixture(MockChainAdapter::new(), Duration::ZERO);
        let result = fx.pipeline.transfer(request(field(0x99), 0)).await;
        assert!(matches!(result, Err(RelayerError::UnknownRoot)));
    }
}
