//! Shared Types
//!
//! Field elements, deposit/leaf records, and proof request types used across
//! the tree, ledger, watcher, and pipeline.

pub mod deposit;
pub mod field;
pub mod proof;

pub use deposit::{DepositEvent, KnownRoot, Leaf};
pub use field::{Field, FieldError};
pub use proof::{
    ProofBytes, ProofFormatError, PublicSignals, TransferRequest, TransferResponse,
    WithdrawRequest, WithdrawResponse, NUM_PUBLIC_SIGNALS, PROOF_BYTES, PROOF_HEX_LEN,
};

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
