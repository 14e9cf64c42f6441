//! Proof Pipeline
//!
//! Validates withdrawal and transfer requests, serializes them on their
//! nullifiers, verifies proofs, drives the on-chain side effects, and
//! records the resulting state transition atomically. Validation runs cheap
//! to expensive; the nullifier lock is held across the whole critical
//! section and released on every exit path by guard drop.

mod transfer;
mod withdraw;

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::common::{RelayerError, Result};
use crate::evm::ChainAdapter;
use crate::ledger::LedgerStore;
use crate::locks::NullifierLocks;
use crate::publisher::RootPublisher;
use crate::tree::SharedTree;
use crate::types::{ProofBytes, PublicSignals};

/// Recent withdrawal recipients, bounding repeated relays per recipient.
const COOLDOWN_CAPACITY: usize = 1024;

/// Handles proof-carrying requests for every configured chain.
pub struct ProofPipeline {
    tree: SharedTree,
    ledger: Arc<LedgerStore>,
    locks: NullifierLocks,
    adapters: HashMap<u64, Arc<dyn ChainAdapter>>,
    publisher: Arc<RootPublisher>,
    publish_signal: Arc<Notify>,
    fee_margin_bps: u64,
    cooldown_ttl: Duration,
    cooldown: StdMutex<LruCache<String, Instant>>,
}

impl ProofPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: SharedTree,
        ledger: Arc<LedgerStore>,
        adapters: HashMap<u64, Arc<dyn ChainAdapter>>,
        publisher: Arc<RootPublisher>,
        publish_signal: Arc<Notify>,
        fee_margin_bps: u64,
        cooldown_ttl: Duration,
    ) -> Self {
        Self {
            tree,
            ledger,
            locks: NullifierLocks::new(),
            adapters,
            publisher,
            publish_signal,
            fee_margin_bps,
            cooldown_ttl,
            cooldown: StdMutex::new(LruCache::new(
                NonZeroUsize::new(COOLDOWN_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    fn adapter(&self, chain_id: u64) -> Result<&Arc<dyn ChainAdapter>> {
        self.adapters
            .get(&chain_id)
            .ok_or(RelayerError::UnsupportedChain(chain_id))
    }

    /// Parse proof bytes and public signals, surfacing format problems before
    /// anything expensive runs.
    fn parse_proof(proof: &str, raw_signals: &[String]) -> Result<(ProofBytes, PublicSignals)> {
        let proof = ProofBytes::from_hex(proof)?;
        let signals = PublicSignals::parse(raw_signals)?;
        Ok((proof, signals))
    }

    /// Reject recipients still inside the cooldown window.
    fn check_cooldown(&self, recipient: &str) -> Result<()> {
        if self.cooldown_ttl.is_zero() {
            return Ok(());
        }
        let mut cache = self.cooldown.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = cache.get(recipient) {
            if last.elapsed() < self.cooldown_ttl {
                return Err(RelayerError::CooldownActive(recipient.to_string()));
            }
        }
        Ok(())
    }

    fn touch_cooldown(&self, recipient: &str) {
        if self.cooldown_ttl.is_zero() {
            return;
        }
        let mut cache = self.cooldown.lock().unwrap_or_else(|e| e.into_inner());
        cache.push(recipient.to_string(), Instant::now());
    }

    /// Relayer fee in wei for a mined transaction: gas cost plus the margin.
    fn fee_wei(&self, gas_used: u64, gas_price: u128) -> u128 {
        let cost = gas_used as u128 * gas_price;
        cost.saturating_mul(10_000 + self.fee_margin_bps as u128) / 10_000
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::evm::MockChainAdapter;

    #[test]
    fn test_fee_margin() {
        let fx = fixture(MockChainAdapter::new(), Duration::ZERO);
        // 100k gas at 1 gwei, 20% margin
        assert_eq!(
            fx.pipeline.fee_wei(100_000, 1_000_000_000),
            120_000_000_000_000
        );
    }

    #[test]
    fn test_unsupported_chain() {
        let fx = fixture(MockChainAdapter::new(), Duration::ZERO);
        assert!(matches!(
            fx.pipeline.adapter(999),
            Err(RelayerError::UnsupportedChain(999))
        ));
    }
}
