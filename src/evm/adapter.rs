//! Chain Adapter
//!
//! The kernel's only window onto a chain: deposit event streams, root
//! queries, root publication, withdrawal execution, and the read-only proof
//! verifier. The trait seam keeps the pipeline testable against mocks; the
//! HTTP implementation speaks JSON-RPC to the configured endpoint.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{DepositEvent, Field};

use super::abi::{self, AbiError};
use super::rpc::{parse_quantity, RpcClient, RpcError};
use super::wallet::{TxParams, Wallet, WalletError};

/// How long to poll for a transaction receipt before giving up.
const RECEIPT_POLL_ATTEMPTS: u32 = 60;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Abi(#[from] AbiError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("bad adapter configuration: {0}")]
    Config(String),

    #[error("no receipt for {0} within the polling window")]
    ReceiptTimeout(String),
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutcome {
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub gas_price: u128,
    /// Receipt status; false means the call reverted.
    pub success: bool,
}

/// Fully resolved arguments for the pool's `withdraw` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalCall {
    pub proof_words: Vec<[u8; 32]>,
    pub merkle_root: Field,
    pub nullifier0: Field,
    pub nullifier1: Field,
    pub out_commitment0: Field,
    pub out_commitment1: Field,
    pub public_amount: Field,
    pub public_asset: Field,
    pub recipient: [u8; 20],
    pub token_address: [u8; 20],
    pub gas_limit: u64,
}

/// Everything the kernel may ask of a chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain_id(&self) -> u64;

    async fn latest_block(&self) -> Result<u64, AdapterError>;

    /// Deposit events over an inclusive block range, in log order.
    async fn deposit_events(&self, from: u64, to: u64) -> Result<Vec<DepositEvent>, AdapterError>;

    /// Whether the pool contract on this chain accepts the root.
    async fn is_known_root(&self, root: Field) -> Result<bool, AdapterError>;

    /// Push a root to the pool contract and wait for the receipt.
    async fn update_root(&self, root: Field, gas_limit: u64) -> Result<TxOutcome, AdapterError>;

    /// Execute a withdrawal and wait for the receipt.
    async fn submit_withdrawal(&self, call: WithdrawalCall) -> Result<TxOutcome, AdapterError>;

    /// Read-only staticcall into the verifier contract.
    async fn verify_proof(
        &self,
        proof_words: Vec<[u8; 32]>,
        signals: [Field; 8],
    ) -> Result<bool, AdapterError>;
}

/// JSON-RPC backed adapter for one chain.
pub struct HttpChainAdapter {
    chain_id: u64,
    rpc: RpcClient,
    pool_address: [u8; 20],
    verifier_address: [u8; 20],
    wallet: std::sync::Arc<Wallet>,
    /// One in-flight transaction per chain; nonce fetch through receipt wait
    /// happens under this lock.
    tx_lock: Mutex<()>,
}

impl HttpChainAdapter {
    pub fn new(
        chain_id: u64,
        rpc_url: &str,
        pool_address: &str,
        verifier_address: &str,
        wallet: std::sync::Arc<Wallet>,
        rpc_timeout: Duration,
    ) -> Result<Self, AdapterError> {
        let pool_address = abi::parse_address(pool_address)
            .ok_or_else(|| AdapterError::Config(format!("bad pool address: {pool_address}")))?;
        let verifier_address = abi::parse_address(verifier_address).ok_or_else(|| {
            AdapterError::Config(format!("bad verifier address: {verifier_address}"))
        })?;

        Ok(Self {
            chain_id,
            rpc: RpcClient::new(rpc_url, rpc_timeout)?,
            pool_address,
            verifier_address,
            wallet,
            tx_lock: Mutex::new(()),
        })
    }

    /// Sign, submit, and wait out the receipt for a call to `to`.
    async fn send_and_wait(
        &self,
        to: [u8; 20],
        data: Vec<u8>,
        gas_limit: u64,
    ) -> Result<TxOutcome, AdapterError> {
        let _guard = self.tx_lock.lock().await;

        let nonce = self
            .rpc
            .get_transaction_count(&self.wallet.address_hex())
            .await?;
        let gas_price = self.rpc.gas_price().await?;

        let raw = self.wallet.sign_transaction(&TxParams {
            nonce,
            gas_price,
            gas_limit,
            to,
            value: 0,
            data,
            chain_id: self.chain_id,
        })?;

        let tx_hash = self.rpc.send_raw_transaction(&raw).await?;
        debug!(target: "veil::evm", chain_id = self.chain_id, %tx_hash, nonce, "submitted transaction");

        for _ in 0..RECEIPT_POLL_ATTEMPTS {
            if let Some(receipt) = self.rpc.get_transaction_receipt(&tx_hash).await? {
                return Ok(TxOutcome {
                    tx_hash: receipt.transaction_hash,
                    block_number: parse_quantity(&receipt.block_number)?,
                    gas_used: parse_quantity(&receipt.gas_used)?,
                    gas_price,
                    success: receipt.status == "0x1",
                });
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }

        Err(AdapterError::ReceiptTimeout(tx_hash))
    }

    fn withdraw_calldata(call: &WithdrawalCall) -> Vec<u8> {
        let selector = abi::selector(
            "withdraw(bytes32[24],bytes32,bytes32,bytes32,bytes32,bytes32,uint256,uint256,address,address)",
        );
        let mut words: Vec<[u8; 32]> = call.proof_words.clone();
        words.push(*call.merkle_root.as_bytes());
        words.push(*call.nullifier0.as_bytes());
        words.push(*call.nullifier1.as_bytes());
        words.push(*call.out_commitment0.as_bytes());
        words.push(*call.out_commitment1.as_bytes());
        words.push(*call.public_amount.as_bytes());
        words.push(*call.public_asset.as_bytes());
        words.push(abi::word_from_address(&call.recipient));
        words.push(abi::word_from_address(&call.token_address));

        abi::encode_call_bytes(selector, &words)
    }
}

#[async_trait]
impl ChainAdapter for HttpChainAdapter {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn latest_block(&self) -> Result<u64, AdapterError> {
        Ok(self.rpc.block_number().await?)
    }

    async fn deposit_events(&self, from: u64, to: u64) -> Result<Vec<DepositEvent>, AdapterError> {
        let logs = self
            .rpc
            .get_logs(
                &abi::address_to_hex(&self.pool_address),
                &abi::event_topic(abi::DEPOSIT_QUEUED_SIG),
                from,
                to,
            )
            .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            events.push(abi::decode_deposit_queued(log, self.chain_id)?);
        }
        Ok(events)
    }

    async fn is_known_root(&self, root: Field) -> Result<bool, AdapterError> {
        let data = abi::encode_call(abi::selector("isKnownRoot(bytes32)"), &[*root.as_bytes()]);
        let result = self
            .rpc
            .call(&abi::address_to_hex(&self.pool_address), &data)
            .await?;
        Ok(abi::decode_bool(&result)?)
    }

    async fn update_root(&self, root: Field, gas_limit: u64) -> Result<TxOutcome, AdapterError> {
        let calldata =
            abi::encode_call_bytes(abi::selector("updateRoot(bytes32)"), &[*root.as_bytes()]);
        self.send_and_wait(self.pool_address, calldata, gas_limit)
            .await
    }

    async fn submit_withdrawal(&self, call: WithdrawalCall) -> Result<TxOutcome, AdapterError> {
        let calldata = Self::withdraw_calldata(&call);
        self.send_and_wait(self.pool_address, calldata, call.gas_limit)
            .await
    }

    async fn verify_proof(
        &self,
        proof_words: Vec<[u8; 32]>,
        signals: [Field; 8],
    ) -> Result<bool, AdapterError> {
        let mut words = proof_words;
        for signal in &signals {
            words.push(*signal.as_bytes());
        }
        let data = abi::encode_call(abi::selector("verifyProof(bytes32[24],uint256[8])"), &words);
        let result = self
            .rpc
            .call(&abi::address_to_hex(&self.verifier_address), &data)
            .await?;
        Ok(abi::decode_bool(&result)?)
    }
}

impl AdapterError {
    /// Whether the failure is an upstream availability problem rather than a
    /// rejection of the request itself.
    pub fn is_unavailability(&self) -> bool {
        matches!(
            self,
            AdapterError::Rpc(_) | AdapterError::ReceiptTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdraw_calldata_layout() {
        let call = WithdrawalCall {
            proof_words: vec![[0x11; 32]; 24],
            merkle_root: Field::from_be_bytes([0x22; 32]).unwrap(),
            nullifier0: Field::ZERO,
            nullifier1: Field::ZERO,
            out_commitment0: Field::ZERO,
            out_commitment1: Field::ZERO,
            public_amount: Field::ZERO,
            public_asset: Field::ZERO,
            recipient: [0x33; 20],
            token_address: [0x44; 20],
            gas_limit: 600_000,
        };

        let calldata = HttpChainAdapter::withdraw_calldata(&call);
        // selector + (24 proof + 7 scalars + 2 addresses) words
        assert_eq!(calldata.len(), 4 + 33 * 32);
        // recipient is left-padded into the second-to-last word
        let recipient_word = &calldata[4 + 31 * 32..4 + 32 * 32];
        assert_eq!(&recipient_word[..12], &[0u8; 12]);
        assert_eq!(&recipient_word[12..], &[0x33; 20]);
    }
}
