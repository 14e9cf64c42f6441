//! EVM Access Layer
//!
//! JSON-RPC plumbing, ABI encoding for the fixed contract surface, the
//! relayer wallet, and the `ChainAdapter` seam the kernel consumes.

pub mod abi;
pub mod adapter;
pub mod rpc;
pub mod wallet;

pub use adapter::{AdapterError, ChainAdapter, HttpChainAdapter, TxOutcome, WithdrawalCall};
pub use rpc::{RpcClient, RpcError};
pub use wallet::{TxParams, Wallet, WalletError};

#[cfg(test)]
pub use adapter::MockChainAdapter;
