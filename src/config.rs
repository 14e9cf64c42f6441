//! Environment-based Configuration
//!
//! All settings load from environment variables; sensitive values (the
//! relayer key) are never hardcoded. The chain set ships as a JSON array in
//! `VEIL_CHAINS` so a deployment can add chains without a rebuild.
//!
//! # Environment Variables
//!
//! - `VEIL_RELAYER_PRIVATE_KEY` - hex secp256k1 key funding on-chain writes (required)
//! - `VEIL_CHAINS` - JSON array of chain configs (required), e.g.
//!   `[{"chain_id":11155111,"name":"sepolia","rpc_url":"https://...",
//!     "pool_address":"0x...","verifier_address":"0x...","start_block":100}]`
//! - `VEIL_PORT` - API port (default: 3000)
//! - `VEIL_CORS_ORIGIN` - allowed origin; unset means any
//! - `VEIL_PRODUCTION` - set to "1" for production mode (JSON logs)
//! - `VEIL_DB_PATH` - SQLite path (default: data/relayer.db)
//! - `VEIL_BATCH_SIZE` - leaves per root publication batch (default: 10)
//! - `VEIL_BATCH_INTERVAL_MS` - max wall-clock between publishes (default: 300000)
//! - `VEIL_POLL_INTERVAL_MS` - deposit poll interval (default: 15000)
//! - `VEIL_FEE_MARGIN_BPS` - relayer fee margin (default: 2000 = 20%)
//! - `VEIL_RPC_TIMEOUT_MS` - per-RPC-call timeout (default: 10000)
//! - `VEIL_COOLDOWN_SECS` - per-recipient withdrawal cooldown (default: 60)
//! - `VEIL_LOG_LEVEL` - trace|debug|info|warn|error (default: info)

use serde::Deserialize;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors; fatal at boot.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Per-chain settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub pool_address: String,
    pub verifier_address: String,
    pub start_block: u64,
}

/// Main configuration struct, injected into every service.
#[derive(Debug, Clone)]
pub struct RelayerConfig {
    /// Hex private key paying for root publications and withdrawals
    pub relayer_private_key: String,
    pub port: u16,
    /// None allows any origin (development)
    pub cors_origin: Option<String>,
    pub is_production: bool,
    pub db_path: String,
    /// New leaves since last publish that force a root publication
    pub batch_size: u64,
    pub batch_interval_ms: u64,
    pub poll_interval_ms: u64,
    /// Fee margin over gas cost, in basis points
    pub fee_margin_bps: u64,
    pub rpc_timeout_ms: u64,
    /// Per-recipient withdrawal cooldown
    pub cooldown_secs: u64,
    pub log_level: String,
    pub chains: Vec<ChainConfig>,
}

impl RelayerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let relayer_private_key = env::var("VEIL_RELAYER_PRIVATE_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("VEIL_RELAYER_PRIVATE_KEY".to_string()))?;

        let chains_json = env::var("VEIL_CHAINS")
            .map_err(|_| ConfigError::MissingEnvVar("VEIL_CHAINS".to_string()))?;
        let chains = parse_chains(&chains_json)?;

        Ok(Self {
            relayer_private_key,
            port: env_parse("VEIL_PORT", 3000)?,
            cors_origin: env::var("VEIL_CORS_ORIGIN").ok(),
            is_production: env::var("VEIL_PRODUCTION").map(|v| v == "1").unwrap_or(false),
            db_path: env::var("VEIL_DB_PATH").unwrap_or_else(|_| "data/relayer.db".to_string()),
            batch_size: env_parse("VEIL_BATCH_SIZE", 10)?,
            batch_interval_ms: env_parse("VEIL_BATCH_INTERVAL_MS", 300_000)?,
            poll_interval_ms: env_parse("VEIL_POLL_INTERVAL_MS", 15_000)?,
            fee_margin_bps: env_parse("VEIL_FEE_MARGIN_BPS", 2_000)?,
            rpc_timeout_ms: env_parse("VEIL_RPC_TIMEOUT_MS", 10_000)?,
            cooldown_secs: env_parse("VEIL_COOLDOWN_SECS", 60)?,
            log_level: env::var("VEIL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            chains,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn chain(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

/// Parse and validate the VEIL_CHAINS JSON array.
fn parse_chains(json: &str) -> Result<Vec<ChainConfig>, ConfigError> {
    let chains: Vec<ChainConfig> = serde_json::from_str(json)
        .map_err(|e| ConfigError::InvalidValue("VEIL_CHAINS".to_string(), e.to_string()))?;

    if chains.is_empty() {
        return Err(ConfigError::InvalidValue(
            "VEIL_CHAINS".to_string(),
            "at least one chain is required".to_string(),
        ));
    }

    let mut ids: Vec<u64> = chains.iter().map(|c| c.chain_id).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != chains.len() {
        return Err(ConfigError::InvalidValue(
            "VEIL_CHAINS".to_string(),
            "duplicate chain_id".to_string(),
        ));
    }

    Ok(chains)
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(var.to_string(), raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAINS_JSON: &str = r#"[
        {"chain_id": 11155111, "name": "sepolia",
         "rpc_url": "http://localhost:8545",
         "pool_address": "0x1111111111111111111111111111111111111111",
         "verifier_address": "0x2222222222222222222222222222222222222222",
         "start_block": 100},
        {"chain_id": 80002, "name": "amoy",
         "rpc_url": "http://localhost:8546",
         "pool_address": "0x3333333333333333333333333333333333333333",
         "verifier_address": "0x4444444444444444444444444444444444444444",
         "start_block": 0}
    ]"#;

    #[test]
    fn test_parse_chains() {
        let chains = parse_chains(CHAINS_JSON).unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].chain_id, 11155111);
        assert_eq!(chains[1].name, "amoy");
    }

    #[test]
    fn test_parse_chains_rejects_empty_and_dupes() {
        assert!(parse_chains("[]").is_err());
        assert!(parse_chains("not json").is_err());

        let dupe = CHAINS_JSON.replace("80002", "11155111");
        assert!(parse_chains(&dupe).is_err());
    }
}
