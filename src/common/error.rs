//! Relayer Error Taxonomy
//!
//! One crate-level error type covering everything a request can surface.
//! Each kind carries a stable error code, an HTTP status, and a retryability
//! hint for clients.

use thiserror::Error;

use crate::evm::AdapterError;
use crate::ledger::LedgerError;
use crate::tree::TreeError;
use crate::types::{FieldError, ProofFormatError};

/// Root error type for the relayer kernel.
#[derive(Debug, Error)]
pub enum RelayerError {
    /// Missing/invalid field, bad address, wrong array length, malformed proof
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Field element not in canonical form (>= prime)
    #[error("malformed field element: {0}")]
    MalformedField(String),

    /// merkleRoot not recorded in the ledger
    #[error("unknown merkle root")]
    UnknownRoot,

    /// Replay or double-spend; the index names which input nullifier
    #[error("nullifier {0} already spent")]
    NullifierSpent(u8),

    /// publicAmount != 0 on a transfer
    #[error("transfer must not move value across the pool boundary")]
    InvalidTransfer,

    /// Verifier returned false
    #[error("proof verification failed")]
    InvalidProof,

    /// 2^20 capacity exhausted
    #[error("commitment tree is full")]
    TreeFull,

    /// Leaf index outside [0, leaf_count)
    #[error("leaf index out of range")]
    OutOfRange,

    /// targetChainId not configured
    #[error("unsupported chain: {0}")]
    UnsupportedChain(u64),

    /// Recipient asked for a second withdrawal inside the cooldown window
    #[error("withdrawal cooldown active for {0}")]
    CooldownActive(String),

    /// Receipt status 0
    #[error("on-chain call reverted: {0}")]
    OnChainRevert(String),

    /// Upstream RPC failure
    #[error("upstream RPC unavailable: {0}")]
    RpcUnavailable(String),

    /// Unclassified
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayerError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status for the API surface.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayerError::MalformedRequest(_)
            | RelayerError::MalformedField(_)
            | RelayerError::UnknownRoot
            | RelayerError::NullifierSpent(_)
            | RelayerError::InvalidTransfer
            | RelayerError::InvalidProof
            | RelayerError::TreeFull
            | RelayerError::UnsupportedChain(_)
            | RelayerError::CooldownActive(_) => 400,
            RelayerError::OutOfRange => 404,
            RelayerError::RpcUnavailable(_) => 502,
            RelayerError::OnChainRevert(_) | RelayerError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayerError::MalformedRequest(_) => "MALFORMED_REQUEST",
            RelayerError::MalformedField(_) => "MALFORMED_FIELD",
            RelayerError::UnknownRoot => "UNKNOWN_ROOT",
            RelayerError::NullifierSpent(_) => "NULLIFIER_SPENT",
            RelayerError::InvalidTransfer => "INVALID_TRANSFER",
            RelayerError::InvalidProof => "INVALID_PROOF",
            RelayerError::TreeFull => "TREE_FULL",
            RelayerError::OutOfRange => "OUT_OF_RANGE",
            RelayerError::UnsupportedChain(_) => "UNSUPPORTED_CHAIN",
            RelayerError::CooldownActive(_) => "COOLDOWN_ACTIVE",
            RelayerError::OnChainRevert(_) => "ON_CHAIN_REVERT",
            RelayerError::RpcUnavailable(_) => "RPC_UNAVAILABLE",
            RelayerError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a client may expect a later retry of the same request to
    /// succeed without changing it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayerError::UnknownRoot
                | RelayerError::CooldownActive(_)
                | RelayerError::OnChainRevert(_)
                | RelayerError::RpcUnavailable(_)
        )
    }
}

impl From<FieldError> for RelayerError {
    fn from(e: FieldError) -> Self {
        match e {
            FieldError::BadEncoding(_) => RelayerError::MalformedRequest(e.to_string()),
            FieldError::NotCanonical => RelayerError::MalformedField(e.to_string()),
        }
    }
}

impl From<ProofFormatError> for RelayerError {
    fn from(e: ProofFormatError) -> Self {
        match e {
            ProofFormatError::Field(field_err) => field_err.into(),
            other => RelayerError::MalformedRequest(other.to_string()),
        }
    }
}

impl From<TreeError> for RelayerError {
    fn from(e: TreeError) -> Self {
        match e {
            TreeError::Full => RelayerError::TreeFull,
            TreeError::OutOfRange { .. } => RelayerError::OutOfRange,
            TreeError::Hash(msg) => RelayerError::Internal(msg),
        }
    }
}

impl From<LedgerError> for RelayerError {
    fn from(e: LedgerError) -> Self {
        RelayerError::Internal(e.to_string())
    }
}

impl From<AdapterError> for RelayerError {
    fn from(e: AdapterError) -> Self {
        if e.is_unavailability() {
            RelayerError::RpcUnavailable(e.to_string())
        } else {
            RelayerError::Internal(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_taxonomy() {
        assert_eq!(RelayerError::malformed("x").status_code(), 400);
        assert_eq!(RelayerError::MalformedField("x".into()).status_code(), 400);
        assert_eq!(RelayerError::UnknownRoot.status_code(), 400);
        assert_eq!(RelayerError::NullifierSpent(0).status_code(), 400);
        assert_eq!(RelayerError::OutOfRange.status_code(), 404);
        assert_eq!(RelayerError::OnChainRevert("x".into()).status_code(), 500);
        assert_eq!(RelayerError::RpcUnavailable("x".into()).status_code(), 502);
    }

    #[test]
    fn test_retryability() {
        assert!(RelayerError::UnknownRoot.is_retryable());
        assert!(RelayerError::RpcUnavailable("x".into()).is_retryable());
        assert!(!RelayerError::NullifierSpent(1).is_retryable());
        assert!(!RelayerError::InvalidProof.is_retryable());
    }

    #[test]
    fn test_field_error_split() {
        let bad_hex: RelayerError = FieldError::BadEncoding("zz".into()).into();
        assert_eq!(bad_hex.error_code(), "MALFORMED_REQUEST");

        let over_prime: RelayerError = FieldError::NotCanonical.into();
        assert_eq!(over_prime.error_code(), "MALFORMED_FIELD");
    }
}
