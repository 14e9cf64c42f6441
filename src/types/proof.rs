//! Proof Request Types
//!
//! Withdrawals and transfers share the same public-signal layout:
//! `[merkleRoot, nullifier0, nullifier1, outCommitment0, outCommitment1,
//! publicAmount, publicAsset, recipient]`. Proofs are opaque 768-byte blobs
//! handed to the on-chain verifier as `bytes32[24]`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::field::{Field, FieldError};

/// Number of public signals in the circuit interface.
pub const NUM_PUBLIC_SIGNALS: usize = 8;

/// Proof blob size in bytes; 24 words of 32 bytes.
pub const PROOF_BYTES: usize = 768;

/// Wire length of a proof: "0x" + 2 hex chars per byte.
pub const PROOF_HEX_LEN: usize = 2 + PROOF_BYTES * 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofFormatError {
    #[error("proof must be 0x-prefixed hex of {PROOF_HEX_LEN} chars, got {0} chars")]
    BadLength(usize),

    #[error("proof contains non-hex characters")]
    BadHex,

    #[error("expected {NUM_PUBLIC_SIGNALS} public signals, got {0}")]
    BadSignalCount(usize),

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// An opaque, format-checked proof blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofBytes(Vec<u8>);

impl ProofBytes {
    /// Parse and length-check a 0x-prefixed proof string. Only the format is
    /// validated here; the words are not required to be canonical field
    /// elements.
    pub fn from_hex(s: &str) -> Result<Self, ProofFormatError> {
        if s.len() != PROOF_HEX_LEN || !s.starts_with("0x") {
            return Err(ProofFormatError::BadLength(s.len()));
        }
        let bytes = hex::decode(&s[2..]).map_err(|_| ProofFormatError::BadHex)?;
        Ok(Self(bytes))
    }

    /// The proof as 24 32-byte words, the shape the verifier contract takes.
    pub fn words(&self) -> Vec<[u8; 32]> {
        self.0
            .chunks_exact(32)
            .map(|chunk| {
                let mut word = [0u8; 32];
                word.copy_from_slice(chunk);
                word
            })
            .collect()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// The ordered public signals of a proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicSignals([Field; NUM_PUBLIC_SIGNALS]);

impl PublicSignals {
    /// Parse the declared signal array, enforcing arity and canonical fields.
    pub fn parse(raw: &[String]) -> Result<Self, ProofFormatError> {
        if raw.len() != NUM_PUBLIC_SIGNALS {
            return Err(ProofFormatError::BadSignalCount(raw.len()));
        }
        let mut signals = [Field::ZERO; NUM_PUBLIC_SIGNALS];
        for (slot, s) in signals.iter_mut().zip(raw) {
            *slot = Field::from_hex(s)?;
        }
        Ok(Self(signals))
    }

    pub fn merkle_root(&self) -> Field {
        self.0[0]
    }

    pub fn nullifier0(&self) -> Field {
        self.0[1]
    }

    /// The second nullifier; zero means only one input note was consumed.
    pub fn nullifier1(&self) -> Field {
        self.0[2]
    }

    pub fn out_commitment0(&self) -> Field {
        self.0[3]
    }

    pub fn out_commitment1(&self) -> Field {
        self.0[4]
    }

    pub fn public_amount(&self) -> Field {
        self.0[5]
    }

    pub fn public_asset(&self) -> Field {
        self.0[6]
    }

    pub fn recipient(&self) -> Field {
        self.0[7]
    }

    /// The non-dummy nullifiers claimed by this proof.
    pub fn claimed_nullifiers(&self) -> Vec<Field> {
        let mut out = vec![self.nullifier0()];
        if !self.nullifier1().is_zero() {
            out.push(self.nullifier1());
        }
        out
    }

    /// The non-dummy output commitments produced by this proof.
    pub fn output_commitments(&self) -> Vec<Field> {
        [self.out_commitment0(), self.out_commitment1()]
            .into_iter()
            .filter(|c| !c.is_zero())
            .collect()
    }

    pub fn as_array(&self) -> &[Field; NUM_PUBLIC_SIGNALS] {
        &self.0
    }
}

// =============================================================================
// HTTP request/response bodies
// =============================================================================

/// POST /withdraw body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawRequest {
    pub proof: String,
    pub public_signals: Vec<String>,
    pub target_chain_id: u64,
    pub token_address: String,
}

/// POST /withdraw response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawResponse {
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    /// Relayer fee in wei, decimal string
    pub fee: String,
}

/// POST /transfer body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub proof: String,
    pub public_signals: Vec<String>,
    pub target_chain_id: u64,
}

/// POST /transfer response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}
