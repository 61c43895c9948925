//! Identifier newtypes and serde helpers

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Identity hash - Keccak-256 of the raw identity credential (32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityHash(#[serde(with = "hex_bytes_32")] pub [u8; 32]);

impl IdentityHash {
    /// Create a new IdentityHash from bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash an identity credential
    pub fn from_credential(credential: &[u8]) -> Self {
        let hash: [u8; 32] = Keccak256::digest(credential).into();
        Self(hash)
    }

    /// Get the bytes of the IdentityHash
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    /// Short display format (first 4 bytes as hex)
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl AsRef<[u8]> for IdentityHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Display for IdentityHash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Opaque handle to off-chain identity document storage (e.g. an IPFS CID).
///
/// Never interpreted by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentRef(String);

impl ContentRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an unsigned integer given as `0x`-prefixed hex or as decimal
pub fn parse_biguint(s: &str) -> Option<BigUint> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
        None => BigUint::parse_bytes(s.as_bytes(), 10),
    }
}

/// Serde helper for 32-byte arrays as hex strings
pub mod hex_bytes_32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&s, &mut bytes).map_err(serde::de::Error::custom)?;
        Ok(bytes)
    }
}

/// Serde helper for big integers as lowercase hex strings
pub mod biguint_hex {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(16))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BigUint::parse_bytes(s.as_bytes(), 16)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex integer: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_hash_is_keccak256() {
        // Keccak-256 of the empty string
        let hash = IdentityHash::from_credential(b"");
        assert_eq!(
            hash.to_hex(),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_identity_hash_hex_roundtrip() {
        let hash = IdentityHash::from_credential(b"identity1");
        let recovered = IdentityHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, recovered);

        let prefixed = IdentityHash::from_hex(&hash.to_string()).unwrap();
        assert_eq!(hash, prefixed);
    }

    #[test]
    fn test_identity_hash_short() {
        let hash = IdentityHash::new([0xab; 32]);
        assert_eq!(hash.short(), "abababab");
    }

    #[test]
    fn test_parse_biguint() {
        assert_eq!(parse_biguint("65537"), Some(BigUint::from(65537u32)));
        assert_eq!(parse_biguint("0x10001"), Some(BigUint::from(65537u32)));
        assert_eq!(parse_biguint("not a number"), None);
    }

    #[test]
    fn test_content_ref_serializes_transparently() {
        let cid = ContentRef::new("Qm12345");
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, "\"Qm12345\"");
    }
}
