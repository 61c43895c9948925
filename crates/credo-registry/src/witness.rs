//! Witness manager
//!
//! Keeps, per active identity, the last witness handed out together with the
//! generation it verifies against. Every state change makes all stored
//! witnesses stale:
//!
//! - after an addition of prime p: `w' = w^p mod N`
//! - after a revocation: `w' = g^(product of the other survivors) mod N`
//!
//! With [`RefreshStrategy::Eager`] all witnesses are refreshed as part of the
//! state change. With [`RefreshStrategy::Lazy`] a witness is brought forward
//! only when requested, by replaying the history entries since its
//! generation.

use std::collections::HashMap;

use tracing::debug;

use credo_core::{
    accumulate, update_witness, AccumulatorEngine, BigUint, IdentityHash, IdentityRecord,
    Witness,
};

use crate::config::RefreshStrategy;
use crate::directory::IdentityDirectory;
use crate::error::{RegistryError, Result};

/// Per-identity witness cache
#[derive(Debug, Clone, Default)]
pub struct WitnessManager {
    strategy: RefreshStrategy,
    witnesses: HashMap<IdentityHash, Witness>,
}

impl WitnessManager {
    pub fn new(strategy: RefreshStrategy) -> Self {
        Self {
            strategy,
            witnesses: HashMap::new(),
        }
    }

    pub fn strategy(&self) -> RefreshStrategy {
        self.strategy
    }

    /// Stored witness, whatever generation it is at
    pub fn cached(&self, identity_hash: &IdentityHash) -> Option<&Witness> {
        self.witnesses.get(identity_hash)
    }

    pub fn len(&self) -> usize {
        self.witnesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
    }

    /// Record the witness of a newly added identity and account for its prime
    /// in every other stored witness
    pub fn on_add(
        &mut self,
        witness: Witness,
        added_prime: &BigUint,
        engine: &AccumulatorEngine,
    ) -> Result<()> {
        let state = engine.state()?;

        if self.strategy == RefreshStrategy::Eager {
            for existing in self.witnesses.values_mut() {
                if existing.generation + 1 == state.generation {
                    existing.value = update_witness(&existing.value, added_prime, &state.modulus);
                    existing.generation = state.generation;
                }
            }
            debug!(
                "Refreshed {} witnesses to generation {}",
                self.witnesses.len(),
                state.generation
            );
        }

        self.witnesses.insert(witness.identity_hash, witness);
        Ok(())
    }

    /// Discard the revoked identity's witness; recompute the others when eager
    ///
    /// `directory` must already show the identity as revoked.
    pub fn on_revoke(
        &mut self,
        revoked: &IdentityHash,
        engine: &AccumulatorEngine,
        directory: &IdentityDirectory,
    ) -> Result<()> {
        self.witnesses.remove(revoked);

        if self.strategy == RefreshStrategy::Eager {
            let generation = engine.state()?.generation;
            for record in directory.list_active() {
                let witness = recompute(record, engine, directory)?;
                self.witnesses.insert(record.identity_hash, witness);
            }
            debug!(
                "Recomputed {} witnesses at generation {}",
                self.witnesses.len(),
                generation
            );
        }

        Ok(())
    }

    /// Witness for `identity_hash` valid against the live accumulator
    pub fn current(
        &mut self,
        identity_hash: &IdentityHash,
        engine: &AccumulatorEngine,
        directory: &IdentityDirectory,
    ) -> Result<Witness> {
        let record = directory.get(identity_hash)?;
        if record.is_revoked() {
            self.witnesses.remove(identity_hash);
            return Err(RegistryError::WitnessRevoked(identity_hash.to_hex()));
        }

        let state = engine.state()?;
        let refreshed = match self.witnesses.get(identity_hash) {
            Some(witness) if witness.generation == state.generation => return Ok(witness.clone()),
            Some(witness) if witness.generation < state.generation => {
                replay_additions(witness, record, engine, directory)?
            }
            _ => None,
        };

        let witness = match refreshed {
            Some(witness) => witness,
            None => recompute(record, engine, directory)?,
        };

        debug!(
            "Refreshed witness for {} to generation {}",
            identity_hash.short(),
            witness.generation
        );
        self.witnesses.insert(*identity_hash, witness.clone());
        Ok(witness)
    }
}

/// Bring `witness` forward by exponentiating with every prime added since its
/// generation. Returns `None` when a revocation intervened, since the
/// witness then has to be recomputed over the survivors.
fn replay_additions(
    witness: &Witness,
    record: &IdentityRecord,
    engine: &AccumulatorEngine,
    directory: &IdentityDirectory,
) -> Result<Option<Witness>> {
    let modulus = &engine.state()?.modulus;
    let mut value = witness.value.clone();
    let mut generation = witness.generation;

    for entry in engine.history()?.since(witness.generation) {
        let added = entry.operation.identity_hash();
        if entry.operation.is_revoke() || *added == record.identity_hash {
            return Ok(None);
        }
        let prime = &directory.get(added)?.prime;
        value = update_witness(&value, prime, modulus);
        generation = entry.generation;
    }

    Ok(Some(Witness {
        identity_hash: record.identity_hash,
        value,
        generation,
    }))
}

/// Witness from scratch: the base raised to every other active prime
fn recompute(
    record: &IdentityRecord,
    engine: &AccumulatorEngine,
    directory: &IdentityDirectory,
) -> Result<Witness> {
    let params = engine.params()?;
    let state = engine.state()?;
    let others = directory
        .list_active()
        .into_iter()
        .filter(|other| other.identity_hash != record.identity_hash)
        .map(|other| &other.prime);

    Ok(Witness {
        identity_hash: record.identity_hash,
        value: accumulate(&params.base, others, &params.modulus),
        generation: state.generation,
    })
}
