//! Relayer Wallet
//!
//! Signs legacy EIP-155 transactions with the relayer's secp256k1 key. The
//! relayer pays for every on-chain write it makes (root publication and
//! withdrawal execution), so all outgoing transactions originate here.

use k256::ecdsa::SigningKey;
use thiserror::Error;

use super::abi::keccak256;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("invalid private key: {0}")]
    BadKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Parameters of an outgoing legacy transaction.
#[derive(Debug, Clone)]
pub struct TxParams {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: [u8; 20],
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// secp256k1 signer for outgoing transactions.
pub struct Wallet {
    signing_key: SigningKey,
    address: [u8; 20],
}

impl Wallet {
    /// Load from a 0x-prefixed or bare 64-char hex private key.
    pub fn from_hex(key_hex: &str) -> Result<Self, WalletError> {
        let digits = key_hex.strip_prefix("0x").unwrap_or(key_hex);
        let raw = hex::decode(digits).map_err(|e| WalletError::BadKey(e.to_string()))?;
        let signing_key =
            SigningKey::from_slice(&raw).map_err(|e| WalletError::BadKey(e.to_string()))?;

        // Address is the low 20 bytes of keccak(uncompressed pubkey).
        let encoded = signing_key.verifying_key().to_encoded_point(false);
        let hash = keccak256(&encoded.as_bytes()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);

        Ok(Self {
            signing_key,
            address,
        })
    }

    pub fn address(&self) -> &[u8; 20] {
        &self.address
    }

    pub fn address_hex(&self) -> String {
        format!("0x{}", hex::encode(self.address))
    }

    /// Sign a transaction, returning the 0x-prefixed raw RLP for
    /// eth_sendRawTransaction.
    pub fn sign_transaction(&self, tx: &TxParams) -> Result<String, WalletError> {
        // EIP-155 preimage: (nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0)
        let unsigned = rlp_list(&[
            rlp_uint(tx.nonce as u128),
            rlp_uint(tx.gas_price),
            rlp_uint(tx.gas_limit as u128),
            rlp_bytes(&tx.to),
            rlp_uint(tx.value),
            rlp_bytes(&tx.data),
            rlp_uint(tx.chain_id as u128),
            rlp_uint(0),
            rlp_uint(0),
        ]);

        let digest = keccak256(&unsigned);
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| WalletError::Signing(e.to_string()))?;

        let v = tx.chain_id * 2 + 35 + u64::from(recovery_id.to_byte());
        let (r, s) = signature.split_bytes();

        let signed = rlp_list(&[
            rlp_uint(tx.nonce as u128),
            rlp_uint(tx.gas_price),
            rlp_uint(tx.gas_limit as u128),
            rlp_bytes(&tx.to),
            rlp_uint(tx.value),
            rlp_bytes(&tx.data),
            rlp_uint(v as u128),
            rlp_bytes(&trim_leading_zeros(&r)),
            rlp_bytes(&trim_leading_zeros(&s)),
        ]);

        Ok(format!("0x{}", hex::encode(signed)))
    }
}

// =============================================================================
// Minimal RLP
// =============================================================================

fn rlp_bytes(payload: &[u8]) -> Vec<u8> {
    match payload.len() {
        1 if payload[0] < 0x80 => payload.to_vec(),
        len if len <= 55 => {
            let mut out = vec![0x80 + len as u8];
            out.extend_from_slice(payload);
            out
        }
        len => {
            let len_bytes = trim_leading_zeros(&(len as u64).to_be_bytes());
            let mut out = vec![0xb7 + len_bytes.len() as u8];
            out.extend_from_slice(&len_bytes);
            out.extend_from_slice(payload);
            out
        }
    }
}

fn rlp_uint(value: u128) -> Vec<u8> {
    rlp_bytes(&trim_leading_zeros(&value.to_be_bytes()))
}

fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload: Vec<u8> = items.iter().flatten().copied().collect();
    match payload.len() {
        len if len <= 55 => {
            let mut out = vec![0xc0 + len as u8];
            out.extend_from_slice(&payload);
            out
        }
        len => {
            let len_bytes = trim_leading_zeros(&(len as u64).to_be_bytes());
            let mut out = vec![0xf7 + len_bytes.len() as u8];
            out.extend_from_slice(&len_bytes);
            out.extend_from_slice(&payload);
            out
        }
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}
