//! Credential registry
//!
//! The public operation surface. Owns the accumulator engine, the identity
//! directory and the witness manager behind one lock, so every state change
//! is serialized while verification runs in parallel under the read lock.
//!
//! A state change goes through three steps:
//!
//! 1. stage the transition (pure, nothing observable changes)
//! 2. hand the staged history entry, with its directory change, to the ledger
//! 3. commit the transition, then update directory and witnesses
//!
//! If step 2 fails the transition is dropped and the error is returned. The
//! ledger is the only durable state: directory and tombstones are rebuilt
//! from it on restore.

use std::collections::BTreeSet;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use credo_core::{
    AccumulatorEngine, AccumulatorParams, AccumulatorState, BigUint, ContentRef, HistoryEntry,
    HistoryLog, IdentityHash, IdentityRecord, Operation, PrimeEncoder, Witness,
};

use crate::config::{RegistryConfig, TombstonePolicy};
use crate::directory::{IdentityDirectory, MembershipLookup};
use crate::error::{RegistryError, Result};
use crate::persistence::{HistoryLedger, LedgerRecord};
use crate::witness::WitnessManager;

/// Everything guarded by the registry lock
#[derive(Debug)]
struct RegistryState {
    engine: AccumulatorEngine,
    directory: IdentityDirectory,
    witnesses: WitnessManager,
}

/// Snapshot of the registry for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStatus {
    pub state: AccumulatorState,
    pub active: usize,
    pub revoked: usize,
}

/// Identity credential registry backed by an RSA accumulator
pub struct CredentialRegistry {
    inner: RwLock<RegistryState>,
    ledger: Box<dyn HistoryLedger>,
    encoder: PrimeEncoder,
    config: RegistryConfig,
}

impl CredentialRegistry {
    /// Create an uninitialized registry
    pub fn new(config: RegistryConfig, ledger: Box<dyn HistoryLedger>) -> Self {
        Self {
            inner: RwLock::new(RegistryState {
                engine: AccumulatorEngine::new(),
                directory: IdentityDirectory::new(),
                witnesses: WitnessManager::new(config.refresh_strategy),
            }),
            ledger,
            encoder: PrimeEncoder::new(config.max_prime_attempts),
            config,
        }
    }

    /// Rebuild a registry from its ledger records
    ///
    /// The history is audited from genesis and the directory is replayed
    /// from the same records, so every revoked hash comes back as a
    /// tombstone. Witnesses are recomputed on demand.
    pub fn restore(
        config: RegistryConfig,
        params: AccumulatorParams,
        records: Vec<LedgerRecord>,
        ledger: Box<dyn HistoryLedger>,
    ) -> Result<Self> {
        config.validate()?;
        let encoder = PrimeEncoder::new(config.max_prime_attempts);

        let mut directory = IdentityDirectory::new();
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            apply_to_directory(&mut directory, &record, &encoder, config.tombstone_policy)?;
            entries.push(record.entry);
        }

        let history = HistoryLog::from_entries(params, entries)?;
        history.audit(&encoder)?;

        let expected = history.active_members(history.last_generation());
        let actual = directory.active_hashes();
        if expected != actual {
            return Err(RegistryError::Inconsistent(format!(
                "history has {} active identities, directory has {}",
                expected.len(),
                actual.len()
            )));
        }

        info!(
            "Restored registry at generation {} with {} active identities",
            history.last_generation(),
            actual.len()
        );

        Ok(Self {
            inner: RwLock::new(RegistryState {
                engine: AccumulatorEngine::restore(history),
                directory,
                witnesses: WitnessManager::new(config.refresh_strategy),
            }),
            ledger,
            encoder,
            config,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>> {
        self.inner.read().map_err(|_| RegistryError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>> {
        self.inner.write().map_err(|_| RegistryError::LockPoisoned)
    }

    /// Hand a staged entry and its directory change to the ledger
    fn persist(&self, entry: &HistoryEntry, content_ref: Option<ContentRef>) -> Result<u64> {
        let record = LedgerRecord {
            entry: entry.clone(),
            content_ref,
            recorded_at: chrono::Utc::now().timestamp().max(0) as u64,
        };
        self.ledger.persist(&record).map_err(|e| {
            warn!(
                "Failed to persist generation {}, rolling back: {}",
                entry.generation, e
            );
            RegistryError::Persist(e)
        })?;
        Ok(record.recorded_at)
    }

    /// One-time setup of the accumulator parameters
    pub fn initialize(&self, modulus: BigUint, base: BigUint) -> Result<AccumulatorState> {
        let mut inner = self.write()?;
        let state = inner.engine.initialize(modulus, base)?;
        info!(
            "Initialized accumulator with {}-bit modulus",
            state.modulus.bits()
        );
        Ok(state)
    }

    /// Register a new identity, returning its hash and its first witness
    pub fn add_identity(
        &self,
        identity: &[u8],
        content_ref: ContentRef,
    ) -> Result<(IdentityHash, Witness)> {
        let identity_hash = IdentityHash::from_credential(identity);

        let mut inner = self.write()?;
        let RegistryState {
            engine,
            directory,
            witnesses,
        } = &mut *inner;

        engine.state()?;
        directory.ensure_absent(&identity_hash)?;

        let prime = self.encoder.encode(identity_hash.as_bytes())?;
        directory.ensure_prime_free(&prime)?;

        let transition = engine.stage_add(identity_hash, &prime)?;
        let witness = transition
            .witness()
            .cloned()
            .ok_or(credo_core::Error::NotInitialized)?;

        let registered_at = self.persist(transition.entry(), Some(content_ref.clone()))?;
        let state = engine.commit(transition)?;

        directory.add(IdentityRecord::new(
            identity_hash,
            prime.clone(),
            content_ref,
            state.generation,
            registered_at,
        ))?;
        witnesses.on_add(witness.clone(), &prime, engine)?;

        info!(
            "Added identity {} at generation {}",
            identity_hash.short(),
            state.generation
        );
        Ok((identity_hash, witness))
    }

    /// Permanently revoke an identity
    pub fn revoke_identity(&self, identity_hash: &IdentityHash) -> Result<AccumulatorState> {
        let mut inner = self.write()?;
        let RegistryState {
            engine,
            directory,
            witnesses,
        } = &mut *inner;

        engine.state()?;
        let prime = directory.get_active(identity_hash)?.prime.clone();
        let survivors: BTreeSet<BigUint> = directory
            .active_primes()
            .into_iter()
            .filter(|other| *other != prime)
            .collect();

        let transition = engine.stage_revoke(*identity_hash, &prime, survivors.iter())?;

        self.persist(transition.entry(), None)?;
        let state = engine.commit(transition)?;

        directory.revoke(identity_hash, state.generation, self.config.tombstone_policy)?;
        witnesses.on_revoke(identity_hash, engine, directory)?;

        info!(
            "Revoked identity {} at generation {}",
            identity_hash.short(),
            state.generation
        );
        Ok(state)
    }

    /// Check a witness against the live accumulator
    ///
    /// Unknown or revoked identities, and witnesses issued for another
    /// identity, simply do not verify.
    pub fn verify_identity(&self, identity_hash: &IdentityHash, witness: &Witness) -> Result<bool> {
        let inner = self.read()?;
        let state = inner.engine.state()?;

        if witness.identity_hash != *identity_hash {
            debug!("Witness for {} names another identity", identity_hash.short());
            return Ok(false);
        }

        let record = match inner.directory.get(identity_hash) {
            Ok(record) => record,
            Err(_) => {
                debug!("Unknown identity {}", identity_hash.short());
                return Ok(false);
            }
        };
        if record.is_revoked() {
            debug!("Identity {} is revoked", identity_hash.short());
            return Ok(false);
        }

        let valid = state.verify(&record.prime, witness);
        debug!(
            "Verified {} at generation {}: {}",
            identity_hash.short(),
            state.generation,
            valid
        );
        Ok(valid)
    }

    /// Current accumulator (value, modulus, generation)
    pub fn get_accumulator(&self) -> Result<AccumulatorState> {
        Ok(self.read()?.engine.state()?.clone())
    }

    /// Recompute the accumulator value at `to` from the logged operations
    pub fn replay_history(&self, from: u64, to: u64) -> Result<BigUint> {
        let inner = self.read()?;
        let state = inner.engine.history()?.replay(from, to, &self.encoder)?;
        Ok(state.value)
    }

    /// Current witness for an active identity, refreshed if stale
    pub fn witness(&self, identity_hash: &IdentityHash) -> Result<Witness> {
        let mut inner = self.write()?;
        let RegistryState {
            engine,
            directory,
            witnesses,
        } = &mut *inner;

        engine.state()?;
        witnesses.current(identity_hash, engine, directory)
    }

    /// Copy of the full history log
    pub fn history(&self) -> Result<HistoryLog> {
        Ok(self.read()?.engine.history()?.clone())
    }

    /// Replay the whole history and compare it with the live state
    pub fn audit(&self) -> Result<AccumulatorState> {
        let inner = self.read()?;
        let replayed = inner.engine.history()?.audit(&self.encoder)?;
        let live = inner.engine.state()?;
        if replayed != *live {
            return Err(RegistryError::Inconsistent(format!(
                "replayed generation {} does not match live generation {}",
                replayed.generation, live.generation
            )));
        }
        Ok(replayed)
    }

    /// Accumulator state with identity counts
    pub fn status(&self) -> Result<RegistryStatus> {
        let inner = self.read()?;
        let state = inner.engine.state()?.clone();
        let (active, revoked) = inner.directory.count_by_status();
        Ok(RegistryStatus {
            state,
            active,
            revoked,
        })
    }

    /// Directory record for an identity
    pub fn record(&self, identity_hash: &IdentityHash) -> Result<IdentityRecord> {
        Ok(self.read()?.directory.get(identity_hash)?.clone())
    }

    /// Accumulator parameters
    pub fn params(&self) -> Result<AccumulatorParams> {
        Ok(self.read()?.engine.params()?.clone())
    }
}

/// Replay one ledger record onto the directory being rebuilt
fn apply_to_directory(
    directory: &mut IdentityDirectory,
    record: &LedgerRecord,
    encoder: &PrimeEncoder,
    policy: TombstonePolicy,
) -> Result<()> {
    let generation = record.entry.generation;
    let applied = match &record.entry.operation {
        Operation::Add(identity_hash) => {
            let content_ref = record.content_ref.clone().ok_or_else(|| {
                RegistryError::Inconsistent(format!(
                    "add at generation {} has no content reference",
                    generation
                ))
            })?;
            let prime = encoder.encode(identity_hash.as_bytes())?;
            directory.add(IdentityRecord::new(
                *identity_hash,
                prime,
                content_ref,
                generation,
                record.recorded_at,
            ))
        }
        Operation::Revoke(identity_hash) => directory
            .revoke(identity_hash, generation, policy)
            .map(|_| ()),
    };

    applied.map_err(|e| {
        RegistryError::Inconsistent(format!(
            "ledger record at generation {} does not apply: {}",
            generation, e
        ))
    })
}

impl MembershipLookup for CredentialRegistry {
    fn lookup_active_primes(&self) -> Result<BTreeSet<BigUint>> {
        self.read()?.directory.lookup_active_primes()
    }

    fn is_revoked(&self, identity_hash: &IdentityHash) -> Result<bool> {
        self.read()?.directory.is_revoked(identity_hash)
    }

    fn resolve_content_ref(&self, identity_hash: &IdentityHash) -> Result<ContentRef> {
        self.read()?.directory.resolve_content_ref(identity_hash)
    }
}
