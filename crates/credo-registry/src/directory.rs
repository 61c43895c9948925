//! Identity directory
//!
//! Maps identity hashes to their records. Records are never removed: a
//! revoked identity stays as a tombstone so the same hash can never be
//! registered again.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use credo_core::{BigUint, ContentRef, IdentityHash, IdentityRecord, IdentityStatus};

use crate::config::TombstonePolicy;
use crate::error::{RegistryError, Result};

/// Read-only view of membership used by external consumers
pub trait MembershipLookup {
    /// Primes of every non-revoked identity
    fn lookup_active_primes(&self) -> Result<BTreeSet<BigUint>>;

    /// Whether a known identity has been revoked
    fn is_revoked(&self, identity_hash: &IdentityHash) -> Result<bool>;

    /// Off-chain document handle of a known identity
    fn resolve_content_ref(&self, identity_hash: &IdentityHash) -> Result<ContentRef>;
}

/// Directory of all identities ever registered
///
/// Serialized as a list of records. Loading rejects a list that names the
/// same identity twice or gives two active identities the same prime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<IdentityRecord>", into = "Vec<IdentityRecord>")]
pub struct IdentityDirectory {
    records: HashMap<IdentityHash, IdentityRecord>,
}

impl TryFrom<Vec<IdentityRecord>> for IdentityDirectory {
    type Error = RegistryError;

    fn try_from(records: Vec<IdentityRecord>) -> Result<Self> {
        let mut directory = Self::new();
        for record in records {
            directory.insert_checked(record)?;
        }
        Ok(directory)
    }
}

impl From<IdentityDirectory> for Vec<IdentityRecord> {
    fn from(directory: IdentityDirectory) -> Self {
        let mut records: Vec<IdentityRecord> = directory.records.into_values().collect();
        records.sort_by_key(|record| (record.added_at_generation, record.identity_hash));
        records
    }
}

impl IdentityDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `AlreadyExists` if the hash was ever registered
    pub fn ensure_absent(&self, identity_hash: &IdentityHash) -> Result<()> {
        if self.records.contains_key(identity_hash) {
            return Err(RegistryError::AlreadyExists(identity_hash.to_hex()));
        }
        Ok(())
    }

    /// Fail with `DuplicatePrime` if an active identity already holds `prime`
    pub fn ensure_prime_free(&self, prime: &BigUint) -> Result<()> {
        match self
            .records
            .values()
            .find(|record| record.status.is_active() && record.prime == *prime)
        {
            Some(owner) => Err(RegistryError::DuplicatePrime(owner.identity_hash.to_hex())),
            None => Ok(()),
        }
    }

    /// Insert a new active record
    pub fn add(&mut self, record: IdentityRecord) -> Result<()> {
        if record.is_revoked() {
            return Err(RegistryError::AlreadyRevoked(record.identity_hash.to_hex()));
        }
        self.insert_checked(record)
    }

    fn insert_checked(&mut self, record: IdentityRecord) -> Result<()> {
        self.ensure_absent(&record.identity_hash)?;
        if record.status.is_active() {
            self.ensure_prime_free(&record.prime)?;
        }

        self.records.insert(record.identity_hash, record);
        Ok(())
    }

    /// Get a record by identity hash
    pub fn get(&self, identity_hash: &IdentityHash) -> Result<&IdentityRecord> {
        self.records
            .get(identity_hash)
            .ok_or_else(|| RegistryError::NotFound(identity_hash.to_hex()))
    }

    /// Get a record that may still be revoked
    pub fn get_active(&self, identity_hash: &IdentityHash) -> Result<&IdentityRecord> {
        let record = self.get(identity_hash)?;
        if record.is_revoked() {
            return Err(RegistryError::AlreadyRevoked(identity_hash.to_hex()));
        }
        Ok(record)
    }

    /// Mark an identity revoked at `generation` (permanent)
    pub fn revoke(
        &mut self,
        identity_hash: &IdentityHash,
        generation: u64,
        policy: TombstonePolicy,
    ) -> Result<&IdentityRecord> {
        let record = self
            .records
            .get_mut(identity_hash)
            .ok_or_else(|| RegistryError::NotFound(identity_hash.to_hex()))?;

        if !record.revoke(generation) {
            return Err(RegistryError::AlreadyRevoked(identity_hash.to_hex()));
        }
        if policy == TombstonePolicy::Purge {
            record.purge_content();
        }

        Ok(record)
    }

    /// Primes of all non-revoked records
    pub fn active_primes(&self) -> BTreeSet<BigUint> {
        self.list_active()
            .into_iter()
            .map(|record| record.prime.clone())
            .collect()
    }

    /// Identity hashes of all non-revoked records
    pub fn active_hashes(&self) -> BTreeSet<IdentityHash> {
        self.list_active()
            .into_iter()
            .map(|record| record.identity_hash)
            .collect()
    }

    /// List all active records
    pub fn list_active(&self) -> Vec<&IdentityRecord> {
        self.records
            .values()
            .filter(|record| record.status.is_active())
            .collect()
    }

    /// List all records
    pub fn list_all(&self) -> Vec<&IdentityRecord> {
        self.records.values().collect()
    }

    /// Get count of records as (active, revoked)
    pub fn count_by_status(&self) -> (usize, usize) {
        let mut active = 0;
        let mut revoked = 0;

        for record in self.records.values() {
            match record.status {
                IdentityStatus::Active => active += 1,
                IdentityStatus::Revoked { .. } => revoked += 1,
            }
        }

        (active, revoked)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MembershipLookup for IdentityDirectory {
    fn lookup_active_primes(&self) -> Result<BTreeSet<BigUint>> {
        Ok(self.active_primes())
    }

    fn is_revoked(&self, identity_hash: &IdentityHash) -> Result<bool> {
        Ok(self.get(identity_hash)?.is_revoked())
    }

    fn resolve_content_ref(&self, identity_hash: &IdentityHash) -> Result<ContentRef> {
        self.get(identity_hash)?
            .content_ref
            .clone()
            .ok_or_else(|| RegistryError::ContentPurged(identity_hash.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(byte: u8, prime: u32, generation: u64) -> IdentityRecord {
        IdentityRecord::new(
            IdentityHash::new([byte; 32]),
            BigUint::from(prime),
            ContentRef::new(format!("Qm{:02x}", byte)),
            generation,
            1000,
        )
    }

    #[test]
    fn test_add_and_get() {
        let mut directory = IdentityDirectory::new();
        directory.add(record(1, 65539, 1)).unwrap();

        let found = directory.get(&IdentityHash::new([1; 32])).unwrap();
        assert_eq!(found.added_at_generation, 1);
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let mut directory = IdentityDirectory::new();
        directory.add(record(1, 65539, 1)).unwrap();

        let result = directory.add(record(1, 65543, 2));
        assert!(matches!(result, Err(RegistryError::AlreadyExists(_))));
    }

    #[test]
    fn test_duplicate_prime_rejected() {
        let mut directory = IdentityDirectory::new();
        directory.add(record(1, 65539, 1)).unwrap();

        let result = directory.add(record(2, 65539, 2));
        assert!(matches!(result, Err(RegistryError::DuplicatePrime(_))));
    }

    #[test]
    fn test_revoked_identity_cannot_reregister() {
        let mut directory = IdentityDirectory::new();
        let hash = IdentityHash::new([1; 32]);
        directory.add(record(1, 65539, 1)).unwrap();
        directory.revoke(&hash, 2, TombstonePolicy::Retain).unwrap();

        let result = directory.add(record(1, 65539, 3));
        assert!(matches!(result, Err(RegistryError::AlreadyExists(_))));
    }

    #[test]
    fn test_revoke_errors() {
        let mut directory = IdentityDirectory::new();
        let hash = IdentityHash::new([1; 32]);

        let result = directory.revoke(&hash, 1, TombstonePolicy::Retain);
        assert!(matches!(result, Err(RegistryError::NotFound(_))));

        directory.add(record(1, 65539, 1)).unwrap();
        directory.revoke(&hash, 2, TombstonePolicy::Retain).unwrap();

        let result = directory.revoke(&hash, 3, TombstonePolicy::Retain);
        assert!(matches!(result, Err(RegistryError::AlreadyRevoked(_))));
        assert_eq!(directory.get(&hash).unwrap().revoked_at_generation(), Some(2));
    }

    #[test]
    fn test_active_primes_excludes_revoked() {
        let mut directory = IdentityDirectory::new();
        directory.add(record(1, 65539, 1)).unwrap();
        directory.add(record(2, 65543, 2)).unwrap();
        directory.add(record(3, 65551, 3)).unwrap();
        directory
            .revoke(&IdentityHash::new([2; 32]), 4, TombstonePolicy::Retain)
            .unwrap();

        let primes = directory.active_primes();
        assert_eq!(primes.len(), 2);
        assert!(primes.contains(&BigUint::from(65539u32)));
        assert!(primes.contains(&BigUint::from(65551u32)));
        assert_eq!(directory.count_by_status(), (2, 1));
    }

    #[test]
    fn test_tombstone_policy() {
        let mut directory = IdentityDirectory::new();
        let kept = IdentityHash::new([1; 32]);
        let purged = IdentityHash::new([2; 32]);
        directory.add(record(1, 65539, 1)).unwrap();
        directory.add(record(2, 65543, 2)).unwrap();

        directory.revoke(&kept, 3, TombstonePolicy::Retain).unwrap();
        directory.revoke(&purged, 4, TombstonePolicy::Purge).unwrap();

        assert_eq!(
            directory.resolve_content_ref(&kept).unwrap(),
            ContentRef::new("Qm01")
        );
        assert!(matches!(
            directory.resolve_content_ref(&purged),
            Err(RegistryError::ContentPurged(_))
        ));
        assert!(directory.is_revoked(&purged).unwrap());
    }

    #[test]
    fn test_lookup_unknown_identity() {
        let directory = IdentityDirectory::new();
        let hash = IdentityHash::new([9; 32]);
        assert!(matches!(
            directory.is_revoked(&hash),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_serde_roundtrip() {
        let mut directory = IdentityDirectory::new();
        directory.add(record(1, 65539, 1)).unwrap();

        let json = serde_json::to_string(&directory).unwrap();
        let recovered: IdentityDirectory = serde_json::from_str(&json).unwrap();
        assert_eq!(recovered, directory);
    }

    #[test]
    fn test_deserialize_rejects_conflicting_records() {
        let first = serde_json::to_value(record(1, 65539, 1)).unwrap();
        let same_hash = serde_json::to_value(record(1, 65543, 2)).unwrap();
        let same_prime = serde_json::to_value(record(2, 65539, 2)).unwrap();

        let duplicated = serde_json::Value::Array(vec![first.clone(), same_hash]);
        assert!(serde_json::from_value::<IdentityDirectory>(duplicated).is_err());

        let shared_prime = serde_json::Value::Array(vec![first, same_prime]);
        assert!(serde_json::from_value::<IdentityDirectory>(shared_prime).is_err());
    }

    #[test]
    fn test_add_rejects_revoked_record() {
        let mut directory = IdentityDirectory::new();
        let mut tombstone = record(1, 65539, 1);
        tombstone.revoke(2);

        let result = directory.add(tombstone);
        assert!(matches!(result, Err(RegistryError::AlreadyRevoked(_))));
        assert!(directory.is_empty());
    }
}
