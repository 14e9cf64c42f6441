//! BN254 Field Elements
//!
//! All commitments, nullifiers, and roots are elements of the BN254 scalar
//! field. On the wire they travel as 0x-prefixed 32-byte big-endian hex.
//! Parsing enforces the canonical form: values >= the field prime are
//! rejected, never silently reduced.

use ark_bn254::Fr;
use ark_ff::{BigInteger, BigInteger256, PrimeField};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Field parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("expected 0x-prefixed 32-byte hex, got {0:?}")]
    BadEncoding(String),

    #[error("value is not a canonical field element (>= prime)")]
    NotCanonical,
}

/// A canonical BN254 scalar field element, stored as 32 big-endian bytes.
///
/// Construction always goes through the canonical check, so any `Field`
/// in the system is a valid element.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field([u8; 32]);

impl Field {
    /// The zero element, used as the empty-leaf value and the dummy nullifier.
    pub const ZERO: Field = Field([0u8; 32]);

    /// Parse from 0x-prefixed 64-char hex.
    pub fn from_hex(s: &str) -> Result<Self, FieldError> {
        let digits = s
            .strip_prefix("0x")
            .ok_or_else(|| FieldError::BadEncoding(truncate_for_error(s)))?;
        if digits.len() != 64 {
            return Err(FieldError::BadEncoding(truncate_for_error(s)));
        }
        let raw = hex::decode(digits).map_err(|_| FieldError::BadEncoding(truncate_for_error(s)))?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        Self::from_be_bytes(bytes)
    }

    /// Construct from 32 big-endian bytes, rejecting non-canonical values.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Result<Self, FieldError> {
        if Fr::from_bigint(be_bytes_to_bigint(&bytes)).is_none() {
            return Err(FieldError::NotCanonical);
        }
        Ok(Self(bytes))
    }

    /// Construct from an arkworks field element (always canonical).
    pub fn from_fr(fr: &Fr) -> Self {
        let repr = fr.into_bigint().to_bytes_be();
        let mut bytes = [0u8; 32];
        bytes[32 - repr.len()..].copy_from_slice(&repr);
        Self(bytes)
    }

    /// Convert to an arkworks field element.
    pub fn to_fr(&self) -> Fr {
        // Canonical by construction, so mod-order reduction is the identity.
        Fr::from_be_bytes_mod_order(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Render as 0x-prefixed lowercase hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Interpret the low 20 bytes as an EVM address, requiring the high
    /// 12 bytes to be zero.
    pub fn as_address(&self) -> Option<String> {
        if self.0[..12].iter().any(|b| *b != 0) {
            return None;
        }
        Some(format!("0x{}", hex::encode(&self.0[12..])))
    }
}

fn be_bytes_to_bigint(bytes: &[u8; 32]) -> BigInteger256 {
    let mut limbs = [0u64; 4];
    for (i, limb) in limbs.iter_mut().enumerate() {
        let start = 32 - 8 * (i + 1);
        let mut chunk = [0u8; 8];
        chunk.copy_from_slice(&bytes[start..start + 8]);
        *limb = u64::from_be_bytes(chunk);
    }
    BigInteger256::new(limbs)
}

fn truncate_for_error(s: &str) -> String {
    if s.len() > 70 {
        let prefix: String = s.chars().take(70).collect();
        format!("{prefix}...")
    } else {
        s.to_string()
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Field({})", self.to_hex())
    }
}

impl std::str::FromStr for Field {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Field::from_hex(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // BN254 scalar field prime
    const PRIME_HEX: &str = "0x30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000001";

    #[test]
    fn test_hex_round_trip() {
        let f = Field::from_hex(
            "0x0101010101010101010101010101010101010101010101010101010101010101",
        )
        .unwrap();
        assert_eq!(
            f.to_hex(),
            "0x0101010101010101010101010101010101010101010101010101010101010101"
        );
    }

    #[test]
    fn test_rejects_prime_and_above() {
        assert_eq!(Field::from_hex(PRIME_HEX), Err(FieldError::NotCanonical));

        // prime + 1
        let above = "0x30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000002";
        assert_eq!(Field::from_hex(above), Err(FieldError::NotCanonical));

        // prime - 1 is fine
        let below = "0x30644e72e131a029b85045b68181585d2833e84879b9709143e1f593f0000000";
        assert!(Field::from_hex(below).is_ok());
    }

    #[test]
    fn test_rejects_bad_encoding() {
        assert!(matches!(
            Field::from_hex("deadbeef"),
            Err(FieldError::BadEncoding(_))
        ));
        assert!(matches!(
            Field::from_hex("0x01"),
            Err(FieldError::BadEncoding(_))
        ));
        assert!(matches!(
            Field::from_hex("0xzz01010101010101010101010101010101010101010101010101010101010101"),
            Err(FieldError::BadEncoding(_))
        ));
    }

    #[test]
    fn test_fr_round_trip() {
        let f = Field::from_hex(
            "0x000000000000000000000000000000000000000000000000000000000000002a",
        )
        .unwrap();
        let fr = f.to_fr();
        assert_eq!(fr, Fr::from(42u64));
        assert_eq!(Field::from_fr(&fr), f);
    }

    #[test]
    fn test_address_extraction() {
        let f = Field::from_hex(
            "0x000000000000000000000000a0b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9",
        )
        .unwrap();
        assert_eq!(
            f.as_address().unwrap(),
            "0xa0b1c2d3e4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9"
        );

        let not_addr = Field::from_hex(
            "0x0100000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert!(not_addr.as_address().is_none());
    }

    #[test]
    fn test_zero_is_dummy() {
        assert!(Field::ZERO.is_zero());
        assert!(!Field::from_fr(&Fr::from(1u64)).is_zero());
    }
}
