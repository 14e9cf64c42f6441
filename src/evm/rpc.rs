//! JSON-RPC Client
//!
//! Minimal typed client for the handful of EVM RPC methods the relayer
//! needs: head tracking, log fetching, read-only calls, raw transaction
//! submission, and receipt polling.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// RPC errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

/// JSON-RPC client bound to one endpoint.
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// A log entry as returned by eth_getLogs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub transaction_index: String,
    pub log_index: String,
    pub transaction_hash: String,
}

/// A transaction receipt.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
    pub block_number: String,
    pub gas_used: String,
    /// "0x1" on success, "0x0" on revert
    pub status: String,
}

impl RpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        self.request_opt(method, params)
            .await?
            .ok_or_else(|| RpcError::Parse(format!("{method}: empty result")))
    }

    /// Like `request`, but a JSON null result is a valid answer.
    async fn request_opt<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let resp: RpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = resp.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(resp.result)
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let hex: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&hex)
    }

    /// Fetch logs for one contract and topic0 over an inclusive block range.
    pub async fn get_logs(
        &self,
        address: &str,
        topic0: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LogEntry>, RpcError> {
        self.request(
            "eth_getLogs",
            json!([{
                "address": address,
                "topics": [topic0],
                "fromBlock": to_quantity(from_block),
                "toBlock": to_quantity(to_block),
            }]),
        )
        .await
    }

    /// Read-only call against latest state; returns the raw hex result.
    pub async fn call(&self, to: &str, data: &str) -> Result<String, RpcError> {
        self.request("eth_call", json!([{"to": to, "data": data}, "latest"]))
            .await
    }

    pub async fn send_raw_transaction(&self, raw: &str) -> Result<String, RpcError> {
        self.request("eth_sendRawTransaction", json!([raw])).await
    }

    /// Pending transactions yield a JSON null result, mapped to None.
    pub async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>, RpcError> {
        self.request_opt("eth_getTransactionReceipt", json!([tx_hash]))
            .await
    }

    pub async fn get_transaction_count(&self, address: &str) -> Result<u64, RpcError> {
        let hex: String = self
            .request("eth_getTransactionCount", json!([address, "pending"]))
            .await?;
        parse_quantity(&hex)
    }

    pub async fn gas_price(&self) -> Result<u128, RpcError> {
        let hex: String = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity_u128(&hex)
    }
}

/// Parse a 0x hex quantity into u64.
pub fn parse_quantity(s: &str) -> Result<u64, RpcError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Parse(format!("quantity missing 0x prefix: {s}")))?;
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::Parse(format!("bad quantity {s}: {e}")))
}

/// Parse a 0x hex quantity into u128.
pub fn parse_quantity_u128(s: &str) -> Result<u128, RpcError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Parse(format!("quantity missing 0x prefix: {s}")))?;
    u128::from_str_radix(digits, 16).map_err(|e| RpcError::Parse(format!("bad quantity {s}: {e}")))
}

/// Render a u64 as a minimal 0x hex quantity.
pub fn to_quantity(value: u64) -> String {
    format!("0x{value:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_round_trip() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x64").unwrap(), 100);
        assert_eq!(to_quantity(100), "0x64");
        assert_eq!(parse_quantity(&to_quantity(u64::MAX)).unwrap(), u64::MAX);
    }

    #[test]
    fn test_quantity_rejects_unprefixed() {
        assert!(parse_quantity("64").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_log_entry_deserializes() {
        let raw = r#"{
            "address": "0x1111111111111111111111111111111111111111",
            "topics": ["0xaaaa"],
            "data": "0x",
            "blockNumber": "0x64",
            "transactionIndex": "0x0",
            "logIndex": "0x2",
            "transactionHash": "0xbbbb"
        }"#;
        let log: LogEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(parse_quantity(&log.block_number).unwrap(), 100);
        assert_eq!(parse_quantity(&log.log_index).unwrap(), 2);
    }
}
