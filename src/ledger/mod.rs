//! Ledger Persistence
//!
//! The ledger is the durable source of truth: the in-memory commitment tree
//! is rebuilt from it at boot, and every accepted state transition lands here
//! before it is acknowledged.

pub mod store;

pub use store::{LedgerError, LedgerResult, LedgerStore, LedgerTx};
