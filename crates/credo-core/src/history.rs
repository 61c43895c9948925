//! Append-only history of accumulator states
//!
//! Every state-changing operation appends exactly one entry. Entries form a
//! chain: entry `g` has `generation == g` and its `previous_value` equals the
//! `resulting_value` of entry `g - 1` (or the base for `g == 1`).
//!
//! Anyone holding the log and the public parameters can recompute every
//! accumulator value from the logged operations alone, without trusting the
//! engine that produced them.

use std::collections::{BTreeSet, HashMap};

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

use crate::accumulator::{accumulate, AccumulatorParams, AccumulatorState};
use crate::error::{Error, Result};
use crate::prime::PrimeEncoder;
use crate::types::{biguint_hex, IdentityHash};

/// Operation that produced a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "identity_hash", rename_all = "snake_case")]
pub enum Operation {
    Add(IdentityHash),
    Revoke(IdentityHash),
}

impl Operation {
    /// The identity the operation applies to
    pub fn identity_hash(&self) -> &IdentityHash {
        match self {
            Operation::Add(hash) | Operation::Revoke(hash) => hash,
        }
    }

    pub fn is_revoke(&self) -> bool {
        matches!(self, Operation::Revoke(_))
    }
}

impl core::fmt::Display for Operation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Operation::Add(hash) => write!(f, "add {}", hash.short()),
            Operation::Revoke(hash) => write!(f, "revoke {}", hash.short()),
        }
    }
}

/// One accumulator state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Generation produced by this entry (first entry is 1)
    pub generation: u64,

    pub operation: Operation,

    /// Accumulator value after the operation
    #[serde(with = "biguint_hex")]
    pub resulting_value: BigUint,

    /// Accumulator value before the operation
    #[serde(with = "biguint_hex")]
    pub previous_value: BigUint,
}

/// Append-only, chain-checked history log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryLog {
    params: AccumulatorParams,
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    /// Create an empty log at generation 0
    pub fn new(params: AccumulatorParams) -> Self {
        Self {
            params,
            entries: Vec::new(),
        }
    }

    /// Rebuild a log from stored entries, enforcing the chain rules
    pub fn from_entries<I>(params: AccumulatorParams, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = HistoryEntry>,
    {
        let mut log = Self::new(params);
        for entry in entries {
            log.append(entry)?;
        }
        Ok(log)
    }

    pub fn params(&self) -> &AccumulatorParams {
        &self.params
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Generation of the newest entry (0 when empty)
    pub fn last_generation(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Accumulator value after the newest entry (the base when empty)
    pub fn last_value(&self) -> &BigUint {
        self.entries
            .last()
            .map(|entry| &entry.resulting_value)
            .unwrap_or(&self.params.base)
    }

    /// State at the newest entry
    pub fn tip(&self) -> AccumulatorState {
        AccumulatorState {
            modulus: self.params.modulus.clone(),
            value: self.last_value().clone(),
            generation: self.last_generation(),
        }
    }

    /// Entry that produced `generation`
    pub fn get(&self, generation: u64) -> Option<&HistoryEntry> {
        if generation == 0 {
            return None;
        }
        self.entries.get((generation - 1) as usize)
    }

    /// Entries strictly after `generation`
    pub fn since(&self, generation: u64) -> &[HistoryEntry] {
        let start = (generation as usize).min(self.entries.len());
        &self.entries[start..]
    }

    /// Logged accumulator value at `generation`
    pub fn value_at(&self, generation: u64) -> Option<&BigUint> {
        if generation == 0 {
            Some(&self.params.base)
        } else {
            self.get(generation).map(|entry| &entry.resulting_value)
        }
    }

    /// Check that `entry` may be appended next, without appending it
    pub fn check_next(&self, entry: &HistoryEntry) -> Result<()> {
        let expected = self.last_generation() + 1;
        if entry.generation != expected {
            return Err(Error::GenerationMismatch {
                generation: entry.generation,
                reason: format!("expected generation {}", expected),
            });
        }
        if entry.previous_value != *self.last_value() {
            return Err(Error::GenerationMismatch {
                generation: entry.generation,
                reason: "previous value does not match the prior resulting value".to_string(),
            });
        }
        if entry.resulting_value.is_zero() || entry.resulting_value >= self.params.modulus {
            return Err(Error::GenerationMismatch {
                generation: entry.generation,
                reason: "resulting value outside (0, modulus)".to_string(),
            });
        }
        Ok(())
    }

    /// Append the next entry
    pub fn append(&mut self, entry: HistoryEntry) -> Result<()> {
        self.check_next(&entry)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Identities that are active after `generation`, according to the log
    pub fn active_members(&self, generation: u64) -> BTreeSet<IdentityHash> {
        let end = (generation as usize).min(self.entries.len());
        let mut active = BTreeSet::new();
        for entry in &self.entries[..end] {
            match entry.operation {
                Operation::Add(hash) => {
                    active.insert(hash);
                }
                Operation::Revoke(hash) => {
                    active.remove(&hash);
                }
            }
        }
        active
    }

    /// Recompute the accumulator at `to`, starting from the logged value at
    /// `from` and re-applying every operation in between
    ///
    /// `replay(0, g)` depends on nothing but the parameters and the logged
    /// operations.
    pub fn replay(&self, from: u64, to: u64, encoder: &PrimeEncoder) -> Result<AccumulatorState> {
        self.walk(from, to, encoder, false)
    }

    /// Replay the whole log from genesis, failing at the first generation
    /// whose recomputed value differs from the logged one
    pub fn audit(&self, encoder: &PrimeEncoder) -> Result<AccumulatorState> {
        self.walk(0, self.last_generation(), encoder, true)
    }

    fn walk(
        &self,
        from: u64,
        to: u64,
        encoder: &PrimeEncoder,
        strict: bool,
    ) -> Result<AccumulatorState> {
        let last = self.last_generation();
        if from > to || to > last {
            return Err(Error::InvalidRange { from, to, last });
        }

        let modulus = &self.params.modulus;
        let mut active = self.active_members(from);
        let mut primes: HashMap<IdentityHash, BigUint> = HashMap::new();
        let mut value = self
            .value_at(from)
            .cloned()
            .ok_or(Error::InvalidRange { from, to, last })?;

        for entry in &self.entries[from as usize..to as usize] {
            match entry.operation {
                Operation::Add(hash) => {
                    let prime = prime_for(&mut primes, encoder, &hash)?;
                    value = value.modpow(&prime, modulus);
                    active.insert(hash);
                }
                Operation::Revoke(hash) => {
                    if !active.remove(&hash) {
                        return Err(Error::NotAMember(hash.short()));
                    }
                    let survivors = active
                        .iter()
                        .map(|member| prime_for(&mut primes, encoder, member))
                        .collect::<Result<Vec<_>>>()?;
                    value = accumulate(&self.params.base, survivors.iter(), modulus);
                }
            }

            if strict && value != entry.resulting_value {
                return Err(Error::ReplayDivergence {
                    generation: entry.generation,
                });
            }
        }

        Ok(AccumulatorState {
            modulus: modulus.clone(),
            value,
            generation: to,
        })
    }
}

fn prime_for(
    cache: &mut HashMap<IdentityHash, BigUint>,
    encoder: &PrimeEncoder,
    hash: &IdentityHash,
) -> Result<BigUint> {
    if let Some(prime) = cache.get(hash) {
        return Ok(prime.clone());
    }
    let prime = encoder.encode(hash.as_bytes())?;
    cache.insert(*hash, prime.clone());
    Ok(prime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::AccumulatorEngine;

    fn params() -> AccumulatorParams {
        AccumulatorParams::new(BigUint::from(1_209_553u32), BigUint::from(4u8)).unwrap()
    }

    fn populated_engine() -> (AccumulatorEngine, Vec<IdentityHash>) {
        let encoder = PrimeEncoder::default();
        let mut engine = AccumulatorEngine::new();
        let params = params();
        engine.initialize(params.modulus, params.base).unwrap();

        let labels: [&[u8]; 3] = [b"alice", b"bob", b"carol"];
        let hashes: Vec<IdentityHash> = labels
            .iter()
            .map(|label| IdentityHash::from_credential(label))
            .collect();
        let primes: Vec<BigUint> = hashes
            .iter()
            .map(|hash| encoder.encode(hash.as_bytes()).unwrap())
            .collect();

        for (hash, prime) in hashes.iter().zip(&primes) {
            engine.add(*hash, prime).unwrap();
        }
        engine
            .revoke(hashes[1], &primes[1], [&primes[0], &primes[2]])
            .unwrap();

        (engine, hashes)
    }

    #[test]
    fn test_append_enforces_generation() {
        let mut log = HistoryLog::new(params());
        let entry = HistoryEntry {
            generation: 2,
            operation: Operation::Add(IdentityHash::new([1; 32])),
            resulting_value: BigUint::from(16u8),
            previous_value: BigUint::from(4u8),
        };
        assert!(matches!(
            log.append(entry),
            Err(Error::GenerationMismatch { generation: 2, .. })
        ));
        assert!(log.is_empty());
    }

    #[test]
    fn test_append_enforces_chain() {
        let mut log = HistoryLog::new(params());
        log.append(HistoryEntry {
            generation: 1,
            operation: Operation::Add(IdentityHash::new([1; 32])),
            resulting_value: BigUint::from(16u8),
            previous_value: BigUint::from(4u8),
        })
        .unwrap();

        let broken = HistoryEntry {
            generation: 2,
            operation: Operation::Add(IdentityHash::new([2; 32])),
            resulting_value: BigUint::from(256u16),
            previous_value: BigUint::from(17u8),
        };
        assert!(matches!(
            log.append(broken),
            Err(Error::GenerationMismatch { generation: 2, .. })
        ));
        assert_eq!(log.last_generation(), 1);
    }

    #[test]
    fn test_first_entry_chains_from_base() {
        let mut log = HistoryLog::new(params());
        let entry = HistoryEntry {
            generation: 1,
            operation: Operation::Add(IdentityHash::new([1; 32])),
            resulting_value: BigUint::from(16u8),
            previous_value: BigUint::from(5u8),
        };
        assert!(log.append(entry).is_err());
    }

    #[test]
    fn test_replay_matches_live_state_at_every_generation() {
        let (engine, _) = populated_engine();
        let history = engine.history().unwrap();
        let encoder = PrimeEncoder::default();

        for generation in 0..=history.last_generation() {
            let replayed = history.replay(0, generation, &encoder).unwrap();
            assert_eq!(Some(&replayed.value), history.value_at(generation));
            assert_eq!(replayed.generation, generation);
        }

        let tip = history.replay(0, history.last_generation(), &encoder).unwrap();
        assert_eq!(&tip, engine.state().unwrap());
    }

    #[test]
    fn test_partial_replay() {
        let (engine, _) = populated_engine();
        let history = engine.history().unwrap();
        let encoder = PrimeEncoder::default();

        let replayed = history.replay(2, 4, &encoder).unwrap();
        assert_eq!(&replayed, engine.state().unwrap());
    }

    #[test]
    fn test_replay_invalid_range() {
        let (engine, _) = populated_engine();
        let history = engine.history().unwrap();
        let encoder = PrimeEncoder::default();

        assert!(matches!(
            history.replay(3, 2, &encoder),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            history.replay(0, 5, &encoder),
            Err(Error::InvalidRange { last: 4, .. })
        ));
    }

    #[test]
    fn test_audit_detects_forged_value() {
        let (engine, _) = populated_engine();
        let history = engine.history().unwrap();
        let encoder = PrimeEncoder::default();
        assert!(history.audit(&encoder).is_ok());

        // A forged chain that is internally consistent but not derivable
        // from the logged operations
        let mut forged: Vec<HistoryEntry> = history.entries().to_vec();
        forged[1].resulting_value = BigUint::from(9u8);
        forged[2].previous_value = BigUint::from(9u8);
        let forged_log = HistoryLog::from_entries(params(), forged).unwrap();

        assert_eq!(
            forged_log.audit(&encoder),
            Err(Error::ReplayDivergence { generation: 2 })
        );
    }

    #[test]
    fn test_active_members() {
        let (engine, hashes) = populated_engine();
        let history = engine.history().unwrap();

        let active = history.active_members(history.last_generation());
        assert!(active.contains(&hashes[0]));
        assert!(!active.contains(&hashes[1]));
        assert!(active.contains(&hashes[2]));
        assert_eq!(history.active_members(0).len(), 0);
    }

    #[test]
    fn test_since() {
        let (engine, _) = populated_engine();
        let history = engine.history().unwrap();
        assert_eq!(history.since(2).len(), 2);
        assert_eq!(history.since(2)[0].generation, 3);
        assert!(history.since(10).is_empty());
    }

    #[test]
    fn test_history_serde_roundtrip() {
        let (engine, _) = populated_engine();
        let history = engine.history().unwrap();

        let json = serde_json::to_string(history).unwrap();
        let recovered: HistoryLog = serde_json::from_str(&json).unwrap();
        assert_eq!(&recovered, history);
        assert!(json.contains("\"type\":\"revoke\""));
    }
}
