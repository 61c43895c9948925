//! Identity records held by the identity directory

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::types::{biguint_hex, ContentRef, IdentityHash};

/// Status of an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IdentityStatus {
    /// Member of the accumulator
    #[default]
    Active,

    /// Permanently revoked (tombstoned, never re-registered)
    Revoked {
        /// The accumulator generation produced by the revocation
        revoked_at_generation: u64,
    },
}

impl IdentityStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, IdentityStatus::Active)
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self, IdentityStatus::Revoked { .. })
    }
}

impl core::fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IdentityStatus::Active => write!(f, "Active"),
            IdentityStatus::Revoked {
                revoked_at_generation,
            } => write!(f, "Revoked at generation {}", revoked_at_generation),
        }
    }
}

/// Directory entry for one identity credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Keccak-256 of the identity credential
    pub identity_hash: IdentityHash,

    /// Prime representative, derived once from `identity_hash`
    #[serde(with = "biguint_hex")]
    pub prime: BigUint,

    /// Off-chain document handle. `None` once purged after revocation.
    pub content_ref: Option<ContentRef>,

    /// Generation produced by the addition
    pub added_at_generation: u64,

    /// Current status
    pub status: IdentityStatus,

    /// Unix timestamp of registration
    pub registered_at: u64,
}

impl IdentityRecord {
    /// Create a new active record
    pub fn new(
        identity_hash: IdentityHash,
        prime: BigUint,
        content_ref: ContentRef,
        added_at_generation: u64,
        registered_at: u64,
    ) -> Self {
        Self {
            identity_hash,
            prime,
            content_ref: Some(content_ref),
            added_at_generation,
            status: IdentityStatus::Active,
            registered_at,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.status.is_revoked()
    }

    /// Generation at which the identity was revoked, if it was
    pub fn revoked_at_generation(&self) -> Option<u64> {
        match self.status {
            IdentityStatus::Active => None,
            IdentityStatus::Revoked {
                revoked_at_generation,
            } => Some(revoked_at_generation),
        }
    }

    /// Revoke this identity (permanent)
    ///
    /// Returns `false` if it was already revoked; the first revocation
    /// generation is kept.
    pub fn revoke(&mut self, generation: u64) -> bool {
        if self.is_revoked() {
            return false;
        }
        self.status = IdentityStatus::Revoked {
            revoked_at_generation: generation,
        };
        true
    }

    /// Drop the content reference, keeping the tombstone
    pub fn purge_content(&mut self) {
        self.content_ref = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> IdentityRecord {
        IdentityRecord::new(
            IdentityHash::new([0x01; 32]),
            BigUint::from(65539u32),
            ContentRef::new("Qm12345"),
            1,
            1000,
        )
    }

    #[test]
    fn test_new_record_is_active() {
        let record = record();
        assert!(record.status.is_active());
        assert_eq!(record.revoked_at_generation(), None);
        assert_eq!(record.content_ref, Some(ContentRef::new("Qm12345")));
    }

    #[test]
    fn test_revoke_is_permanent() {
        let mut record = record();

        assert!(record.revoke(3));
        assert!(record.is_revoked());
        assert_eq!(record.revoked_at_generation(), Some(3));

        assert!(!record.revoke(7));
        assert_eq!(record.revoked_at_generation(), Some(3));
    }

    #[test]
    fn test_purge_keeps_tombstone() {
        let mut record = record();
        record.revoke(2);
        record.purge_content();

        assert!(record.content_ref.is_none());
        assert!(record.is_revoked());
    }
}
