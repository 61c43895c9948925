//! Accumulator publication
//!
//! Verifiers only ever need `(modulus, value, generation)` to check a
//! witness. The registry exports that snapshot with a SHA-256 digest over
//! its canonical bytes so a transferred copy can be checked for corruption.
//!
//! Distribution methods:
//! - JSON (for display or API transfer)
//! - Compact binary file
//! - QR text (`CREDO:ACC:1:` followed by base64 of the binary form)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use credo_core::{types::hex_bytes_32, AccumulatorState, BigUint};

use crate::error::{RegistryError, Result};

/// Current export format version
pub const EXPORT_FORMAT_VERSION: u8 = 1;

/// Prefix of the QR text form
pub const QR_PREFIX: &str = "CREDO:ACC:1:";

/// Accumulator export format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorExport {
    /// Format version
    pub format_version: u8,

    /// The published accumulator state
    pub state: AccumulatorState,

    /// SHA-256 over the canonical bytes of `state`
    #[serde(with = "hex_bytes_32")]
    pub digest: [u8; 32],

    /// Unix timestamp of export
    pub exported_at: u64,
}

impl AccumulatorExport {
    /// Create a new export stamped with the current time
    pub fn new(state: AccumulatorState) -> Self {
        let exported_at = chrono::Utc::now().timestamp().max(0) as u64;
        Self::new_at(state, exported_at)
    }

    /// Create a new export with an explicit timestamp
    pub fn new_at(state: AccumulatorState, exported_at: u64) -> Self {
        let digest = state_digest(&state);
        Self {
            format_version: EXPORT_FORMAT_VERSION,
            state,
            digest,
            exported_at,
        }
    }

    /// Check the digest against the carried state
    pub fn verify_digest(&self) -> bool {
        state_digest(&self.state) == self.digest
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to compact binary format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        // Version
        bytes.push(self.format_version);

        // State
        bytes.extend_from_slice(&canonical_state_bytes(&self.state));

        // Timestamp
        bytes.extend_from_slice(&self.exported_at.to_le_bytes());

        // Digest
        bytes.extend_from_slice(&self.digest);

        bytes
    }

    /// Deserialize from binary format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);

        let format_version = reader.take(1)?[0];
        if format_version != EXPORT_FORMAT_VERSION {
            return Err(RegistryError::Serialization(format!(
                "Unsupported export version {}",
                format_version
            )));
        }

        let modulus = reader.biguint()?;
        let value = reader.biguint()?;
        let generation = reader.u64()?;
        let exported_at = reader.u64()?;

        let mut digest = [0u8; 32];
        digest.copy_from_slice(reader.take(32)?);
        reader.finish()?;

        Ok(Self {
            format_version,
            state: AccumulatorState {
                modulus,
                value,
                generation,
            },
            digest,
            exported_at,
        })
    }

    /// Base64 text suitable for a QR code
    pub fn to_qr(&self) -> String {
        let encoded =
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, self.to_bytes());
        format!("{}{}", QR_PREFIX, encoded)
    }
}

/// Canonical byte encoding of a state: length-prefixed big-endian modulus and
/// value, then the little-endian generation
pub fn canonical_state_bytes(state: &AccumulatorState) -> Vec<u8> {
    let mut bytes = Vec::new();
    for n in [&state.modulus, &state.value] {
        let be = n.to_bytes_be();
        bytes.extend_from_slice(&(be.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&be);
    }
    bytes.extend_from_slice(&state.generation.to_le_bytes());
    bytes
}

fn state_digest(state: &AccumulatorState) -> [u8; 32] {
    Sha256::digest(canonical_state_bytes(state)).into()
}

/// Save an export in binary form
pub fn save_to_file(export: &AccumulatorExport, path: &std::path::Path) -> Result<()> {
    std::fs::write(path, export.to_bytes())?;
    Ok(())
}

/// Load an accumulator export from file
pub fn load_from_file(path: &std::path::Path) -> Result<AccumulatorExport> {
    let bytes = std::fs::read(path)?;
    AccumulatorExport::from_bytes(&bytes)
}

/// Decode accumulator from QR data
pub fn decode_from_qr(qr_data: &str) -> Result<AccumulatorExport> {
    let data = qr_data.strip_prefix(QR_PREFIX).ok_or_else(|| {
        RegistryError::Serialization("Invalid accumulator QR prefix".to_string())
    })?;

    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data)
        .map_err(|e| RegistryError::Serialization(format!("Base64 decode failed: {}", e)))?;

    AccumulatorExport::from_bytes(&bytes)
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| RegistryError::Serialization("Export too short".to_string()))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn biguint(&mut self) -> Result<BigUint> {
        let len = self.u32()? as usize;
        Ok(BigUint::from_bytes_be(self.take(len)?))
    }

    fn finish(&self) -> Result<()> {
        if self.offset != self.bytes.len() {
            return Err(RegistryError::Serialization(
                "Trailing bytes after export".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AccumulatorState {
        AccumulatorState {
            modulus: BigUint::from(1_209_553u32),
            value: BigUint::from(424_242u32),
            generation: 7,
        }
    }

    #[test]
    fn test_export_roundtrip() {
        let export = AccumulatorExport::new_at(test_state(), 1_700_000_000);

        let bytes = export.to_bytes();
        let recovered = AccumulatorExport::from_bytes(&bytes).unwrap();

        assert_eq!(recovered, export);
        assert!(recovered.verify_digest());
    }

    #[test]
    fn test_export_to_json() {
        let export = AccumulatorExport::new(test_state());

        let json = export.to_json().unwrap();
        assert!(json.contains("format_version"));
        assert!(json.contains("digest"));

        let recovered = AccumulatorExport::from_json(&json).unwrap();
        assert_eq!(recovered, export);
    }

    #[test]
    fn test_qr_export() {
        let export = AccumulatorExport::new(test_state());

        let qr_data = export.to_qr();
        assert!(qr_data.starts_with("CREDO:ACC:1:"));

        let recovered = decode_from_qr(&qr_data).unwrap();
        assert_eq!(recovered.state, test_state());
    }

    #[test]
    fn test_tampered_state_fails_digest() {
        let mut export = AccumulatorExport::new(test_state());
        export.state.generation += 1;
        assert!(!export.verify_digest());
    }

    #[test]
    fn test_truncated_and_foreign_input_rejected() {
        let bytes = AccumulatorExport::new(test_state()).to_bytes();
        assert!(AccumulatorExport::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        assert!(AccumulatorExport::from_bytes(&[]).is_err());
        assert!(decode_from_qr("OTHER:ACC:1:AAAA").is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accumulator.bin");
        let export = AccumulatorExport::new(test_state());

        save_to_file(&export, &path).unwrap();
        assert_eq!(load_from_file(&path).unwrap(), export);
    }
}
