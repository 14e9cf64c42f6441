//! Withdrawal Handling
//!
//! A withdrawal consumes one or two input notes and pays out on-chain
//! through the target pool contract. The relayer reserves the nullifiers
//! before submitting so a second request cannot relay the same notes while
//! the transaction is in flight; a revert rolls the reservation back.

use tracing::{info, warn};

use crate::common::{RelayerError, Result};
use crate::evm::{AdapterError, WithdrawalCall};
use crate::types::{unix_now, Field, WithdrawRequest, WithdrawResponse};

use super::ProofPipeline;

/// Gas limit for the pool `withdraw` call.
pub const GAS_LIMIT_WITHDRAW: u64 = 600_000;

impl ProofPipeline {
    /// Validate and execute a withdrawal request.
    pub async fn withdraw(&self, request: WithdrawRequest) -> Result<WithdrawResponse> {
        let request_id = format!("wd_{}_{:08x}", unix_now(), rand::random::<u32>());

        // Cheap format gates first: proof shape, signal arity, addresses.
        let (proof, signals) = Self::parse_proof(&request.proof, &request.public_signals)?;

        let recipient_hex = signals.recipient().as_address().ok_or_else(|| {
            RelayerError::malformed("recipient signal is not a well-formed address")
        })?;
        let recipient = address_bytes(&signals.recipient());
        let token_address = crate::evm::abi::parse_address(&request.token_address)
            .ok_or_else(|| RelayerError::malformed("bad token address"))?;

        let adapter = self.adapter(request.target_chain_id)?;
        self.check_cooldown(&recipient_hex)?;

        let root = signals.merkle_root();
        if !self.ledger.is_known_root(&root)? {
            return Err(RelayerError::UnknownRoot);
        }

        // Serialize on the claimed nullifiers for the whole critical section.
        let nullifiers = signals.claimed_nullifiers();
        let _guard = self.locks.acquire(&nullifiers).await;

        if self.ledger.is_nullifier_spent(&signals.nullifier0())? {
            return Err(RelayerError::NullifierSpent(0));
        }
        if !signals.nullifier1().is_zero() && self.ledger.is_nullifier_spent(&signals.nullifier1())? {
            return Err(RelayerError::NullifierSpent(1));
        }

        // The proof only verifies against a root the target chain accepts;
        // publish on demand rather than burning gas on a revert.
        if !adapter.is_known_root(root).await? {
            info!(
                target: "veil::pipeline",
                request_id = %request_id,
                chain_id = request.target_chain_id,
                root = %root,
                "root unknown on target chain; publishing before withdrawal"
            );
            self.publisher
                .publish_to_chain(request.target_chain_id, root)
                .await?;
        }

        // Optimistic reservation: mark the nullifiers spent before the
        // on-chain call so a concurrent request cannot double-relay.
        self.ledger.transaction(|tx| {
            for nullifier in &nullifiers {
                tx.insert_nullifier(nullifier, None)?;
            }
            Ok(())
        })?;

        let call = WithdrawalCall {
            proof_words: proof.words(),
            merkle_root: root,
            nullifier0: signals.nullifier0(),
            nullifier1: signals.nullifier1(),
            out_commitment0: signals.out_commitment0(),
            out_commitment1: signals.out_commitment1(),
            public_amount: signals.public_amount(),
            public_asset: signals.public_asset(),
            recipient,
            token_address,
            gas_limit: GAS_LIMIT_WITHDRAW,
        };

        match adapter.submit_withdrawal(call).await {
            Ok(outcome) if outcome.success => {
                for nullifier in &nullifiers {
                    if let Err(e) = self.ledger.set_nullifier_tx_hash(nullifier, &outcome.tx_hash) {
                        warn!(target: "veil::pipeline", error = %e, "failed to record spending tx");
                    }
                }
                self.touch_cooldown(&recipient_hex);

                let fee = self.fee_wei(outcome.gas_used, outcome.gas_price);
                info!(
                    target: "veil::pipeline",
                    request_id = %request_id,
                    chain_id = request.target_chain_id,
                    tx_hash = %outcome.tx_hash,
                    gas_used = outcome.gas_used,
                    "withdrawal relayed"
                );
                Ok(WithdrawResponse {
                    tx_hash: outcome.tx_hash,
                    block_number: outcome.block_number,
                    gas_used: outcome.gas_used,
                    fee: fee.to_string(),
                })
                // Output commitments are not inserted here; the contract
                // emits them as deposit events the watcher picks up.
            }
            Ok(outcome) => {
                self.rollback_nullifiers(&nullifiers)?;
                warn!(
                    target: "veil::pipeline",
                    request_id = %request_id,
                    chain_id = request.target_chain_id,
                    tx_hash = %outcome.tx_hash,
                    "withdrawal reverted; reservation rolled back"
                );
                Err(RelayerError::OnChainRevert(outcome.tx_hash))
            }
            Err(AdapterError::ReceiptTimeout(tx_hash)) => {
                // The transaction may still mine; keeping the reservation is
                // the safe side of the race.
                warn!(
                    target: "veil::pipeline",
                    request_id = %request_id,
                    chain_id = request.target_chain_id,
                    tx_hash = %tx_hash,
                    "no receipt in time; nullifiers stay reserved"
                );
                Err(RelayerError::RpcUnavailable(format!(
                    "no receipt for {tx_hash}; retry later"
                )))
            }
            Err(e) => {
                // Submission never reached the chain; release the nullifiers.
                self.rollback_nullifiers(&nullifiers)?;
                Err(e.into())
            }
        }
    }

    fn rollback_nullifiers(&self, nullifiers: &[Field]) -> Result<()> {
        self.ledger.transaction(|tx| {
            for nullifier in nullifiers {
                tx.delete_nullifier(nullifier)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

fn address_bytes(field: &Field) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&field.as_bytes()[12..]);
    out
}
