//! ABI Encoding Helpers
//!
//! The pool and verifier contract surface uses only fixed-size types
//! (`bytes32`, `uint256`, `address`, and fixed arrays of those), so calldata
//! is a 4-byte Keccak selector followed by concatenated 32-byte words.

use sha3::{Digest, Keccak256};
use thiserror::Error;

use crate::types::{DepositEvent, Field};

use super::rpc::{parse_quantity, LogEntry, RpcError};

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("malformed log: {0}")]
    BadLog(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// 4-byte function selector for a canonical signature string.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Event topic0 for a canonical signature string.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// Build raw calldata from a selector and 32-byte words.
pub fn encode_call_bytes(selector: [u8; 4], words: &[[u8; 32]]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + words.len() * 32);
    data.extend_from_slice(&selector);
    for word in words {
        data.extend_from_slice(word);
    }
    data
}

/// Build 0x calldata from a selector and 32-byte words.
pub fn encode_call(selector: [u8; 4], words: &[[u8; 32]]) -> String {
    format!("0x{}", hex::encode(encode_call_bytes(selector, words)))
}

/// Left-pad an address to a 32-byte word.
pub fn word_from_address(address: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address);
    word
}

/// Parse a 0x-prefixed 20-byte address.
pub fn parse_address(s: &str) -> Option<[u8; 20]> {
    let digits = s.strip_prefix("0x")?;
    if digits.len() != 40 {
        return None;
    }
    let raw = hex::decode(digits).ok()?;
    let mut address = [0u8; 20];
    address.copy_from_slice(&raw);
    Some(address)
}

pub fn address_to_hex(address: &[u8; 20]) -> String {
    format!("0x{}", hex::encode(address))
}

/// Decode a returned `bool` (one word, last byte 0 or 1).
pub fn decode_bool(return_data: &str) -> Result<bool, AbiError> {
    let digits = return_data
        .strip_prefix("0x")
        .ok_or_else(|| AbiError::BadLog(format!("bad return data: {return_data}")))?;
    let raw = hex::decode(digits)
        .map_err(|_| AbiError::BadLog(format!("bad return data: {return_data}")))?;
    Ok(raw.last().is_some_and(|b| *b == 1))
}

/// Signature of the deposit event emitted by the pool contract.
/// `commitment` is indexed; queueIndex, amount, asset, timestamp ride in data.
pub const DEPOSIT_QUEUED_SIG: &str = "DepositQueued(bytes32,uint256,uint256,bytes32,uint256)";

/// Decode a `DepositQueued` log into the canonical deposit form.
pub fn decode_deposit_queued(log: &LogEntry, chain_id: u64) -> Result<DepositEvent, AbiError> {
    let commitment_hex = log
        .topics
        .get(1)
        .ok_or_else(|| AbiError::BadLog("missing commitment topic".to_string()))?;
    let commitment = Field::from_hex(commitment_hex)
        .map_err(|e| AbiError::BadLog(format!("bad commitment topic: {e}")))?;

    let data = log
        .data
        .strip_prefix("0x")
        .ok_or_else(|| AbiError::BadLog("unprefixed log data".to_string()))?;
    let raw = hex::decode(data).map_err(|_| AbiError::BadLog("non-hex log data".to_string()))?;
    if raw.len() != 4 * 32 {
        return Err(AbiError::BadLog(format!(
            "expected 4 data words, got {} bytes",
            raw.len()
        )));
    }

    let word = |i: usize| -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&raw[i * 32..(i + 1) * 32]);
        out
    };

    // word 0 is the on-chain queue index, unused off-chain: the watcher
    // assigns leaf indices from the canonical global order instead.
    let amount = format!("0x{}", hex::encode(word(1)).trim_start_matches('0'));
    let amount = if amount == "0x" { "0x0".to_string() } else { amount };
    let asset = Field::from_hex(&format!("0x{}", hex::encode(word(2))))
        .map_err(|e| AbiError::BadLog(format!("bad asset word: {e}")))?;
    let timestamp_word = word(3);
    let timestamp = u64::from_be_bytes(
        timestamp_word[24..]
            .try_into()
            .map_err(|_| AbiError::BadLog("bad timestamp word".to_string()))?,
    );

    Ok(DepositEvent {
        commitment,
        chain_id,
        block_number: parse_quantity(&log.block_number)?,
        tx_index: parse_quantity(&log.transaction_index)? as u32,
        log_index: parse_quantity(&log.log_index)? as u32,
        asset,
        amount,
        timestamp,
    })
}
