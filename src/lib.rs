//! Veil Relayer
//!
//! Off-chain relayer core for a cross-chain shielded asset pool. Users shield
//! value by publishing commitments on-chain; the relayer indexes those
//! deposits into a Poseidon Merkle tree, propagates the tree root to every
//! configured chain, and executes withdrawal and transfer proofs at its own
//! expense while enforcing double-spend prevention through a persistent
//! nullifier set.
//!
//! ## Components
//!
//! - [`tree`] - in-memory Poseidon commitment tree (depth 20, BN254)
//! - [`ledger`] - durable SQLite shadow: leaves, roots, nullifiers, cursors
//! - [`locks`] - per-nullifier async lock table
//! - [`watcher`] - multi-chain deposit indexer with deterministic ordering
//! - [`publisher`] - batched on-chain root propagation
//! - [`pipeline`] - withdrawal/transfer validation and execution
//! - [`boot`] - crash recovery: the tree is rebuilt from the ledger
//! - [`evm`] - JSON-RPC, ABI, wallet, and the chain adapter seam
//! - [`api`] - REST surface

pub mod api;
pub mod boot;
pub mod common;
pub mod config;
pub mod evm;
pub mod ledger;
pub mod locks;
pub mod logging;
pub mod pipeline;
pub mod publisher;
pub mod tree;
pub mod types;
pub mod watcher;

pub use common::{RelayerError, Result};
pub use config::{ChainConfig, ConfigError, RelayerConfig};
pub use ledger::LedgerStore;
pub use pipeline::ProofPipeline;
pub use publisher::RootPublisher;
pub use tree::{CommitmentTree, MerkleProof, SharedTree, TreeError, MAX_LEAVES, TREE_DEPTH};
pub use types::{DepositEvent, Field, Leaf};
pub use watcher::{ChainWatcher, WatchedChain, MAX_RANGE};
