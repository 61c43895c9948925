//! Property-based tests for credo-core using proptest
//!
//! These tests verify accumulator invariants that should hold for all
//! identity sets and operation sequences.

use std::collections::BTreeSet;

use proptest::prelude::*;
use credo_core::{
    accumulate,
    prime::is_probable_prime,
    update_witness, AccumulatorEngine, AccumulatorParams, BigUint, Error, HistoryLog,
    IdentityHash, PrimeEncoder, Witness, RESERVED_PRIME_BOUND,
};

// ============================================
// Helpers
// ============================================

fn params() -> AccumulatorParams {
    AccumulatorParams::rsa2048().unwrap()
}

fn engine() -> AccumulatorEngine {
    let params = params();
    let mut engine = AccumulatorEngine::new();
    engine.initialize(params.modulus, params.base).unwrap();
    engine
}

fn member(label: &[u8]) -> (IdentityHash, BigUint) {
    let hash = IdentityHash::from_credential(label);
    let prime = PrimeEncoder::default().encode(hash.as_bytes()).unwrap();
    (hash, prime)
}

fn arb_labels(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::btree_set(prop::collection::vec(any::<u8>(), 1..24), 2..max)
        .prop_map(|set| set.into_iter().collect())
}

/// Sequence of operations: `Ok(i)` adds label i, `Err(i)` revokes the
/// i-th currently active member (modulo the active count)
fn arb_ops() -> impl Strategy<Value = Vec<Result<u8, u8>>> {
    prop::collection::vec(
        prop_oneof![
            3 => any::<u8>().prop_map(Ok),
            1 => any::<u8>().prop_map(Err),
        ],
        1..12,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    // ----------------------------------------
    // Prime Encoder Properties
    // ----------------------------------------

    #[test]
    fn encoded_primes_are_well_formed(input in prop::collection::vec(any::<u8>(), 0..64)) {
        let encoder = PrimeEncoder::default();
        let prime = encoder.encode(&input).unwrap();

        prop_assert_eq!(&prime, &encoder.encode(&input).unwrap());
        prop_assert!(prime.bit(0));
        prop_assert!(prime.bits() >= 256);
        prop_assert!(prime > BigUint::from(RESERVED_PRIME_BOUND));
        prop_assert!(is_probable_prime(&prime));
    }

    #[test]
    fn distinct_inputs_map_to_distinct_primes(
        a in prop::collection::vec(any::<u8>(), 0..32),
        b in prop::collection::vec(any::<u8>(), 0..32),
    ) {
        prop_assume!(a != b);
        let encoder = PrimeEncoder::default();
        prop_assert_ne!(encoder.encode(&a).unwrap(), encoder.encode(&b).unwrap());
    }

    // ----------------------------------------
    // Witness Refresh Properties
    // ----------------------------------------

    #[test]
    fn refreshed_witnesses_verify(labels in arb_labels(6)) {
        let mut engine = engine();
        let modulus = params().modulus;
        let mut witnesses: Vec<(BigUint, Witness)> = Vec::new();

        for label in &labels {
            let (hash, prime) = member(label);
            let (state, witness) = engine.add(hash, &prime).unwrap();

            for (_, existing) in witnesses.iter_mut() {
                existing.value = update_witness(&existing.value, &prime, &modulus);
                existing.generation = state.generation;
            }
            witnesses.push((prime, witness));
        }

        let state = engine.state().unwrap();
        for (prime, witness) in &witnesses {
            prop_assert!(state.verify(prime, witness));
        }
    }

    // ----------------------------------------
    // Revocation Properties
    // ----------------------------------------

    #[test]
    fn revocation_invalidates_exactly_the_revoked_member(
        labels in arb_labels(6),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut engine = engine();
        let base = params().base;
        let members: Vec<(IdentityHash, BigUint)> = labels.iter().map(|l| member(l)).collect();
        for (hash, prime) in &members {
            engine.add(*hash, prime).unwrap();
        }

        // Every member's witness at the pre-revocation generation
        let before = engine.state().unwrap().clone();
        let old_witnesses: Vec<BigUint> = members
            .iter()
            .map(|(_, prime)| {
                accumulate(&base, members.iter().map(|(_, p)| p).filter(|p| *p != prime), &before.modulus)
            })
            .collect();
        for ((_, prime), witness) in members.iter().zip(&old_witnesses) {
            prop_assert!(before.verify_value(prime, witness));
        }

        let revoked = pick.index(members.len());
        let (revoked_hash, revoked_prime) = &members[revoked];
        let survivors: Vec<&BigUint> = members
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != revoked)
            .map(|(_, (_, p))| p)
            .collect();
        let after = engine.revoke(*revoked_hash, revoked_prime, survivors.iter().copied()).unwrap();

        prop_assert!(!after.verify_value(revoked_prime, &old_witnesses[revoked]));
        let revoked_witness = Witness {
            identity_hash: *revoked_hash,
            value: old_witnesses[revoked].clone(),
            generation: after.generation,
        };
        prop_assert!(!after.verify(revoked_prime, &revoked_witness));

        for (i, (hash, prime)) in members.iter().enumerate() {
            if i == revoked {
                continue;
            }
            let refreshed = accumulate(
                &base,
                survivors.iter().copied().filter(|p| *p != prime),
                &after.modulus,
            );
            let refreshed_witness = Witness {
                identity_hash: *hash,
                value: refreshed,
                generation: after.generation,
            };
            prop_assert!(after.verify(prime, &refreshed_witness));
        }
    }

    // ----------------------------------------
    // History Properties
    // ----------------------------------------

    #[test]
    fn replay_matches_logged_values(ops in arb_ops()) {
        let mut engine = engine();
        let mut active: BTreeSet<(IdentityHash, BigUint)> = BTreeSet::new();
        let mut added: BTreeSet<u8> = BTreeSet::new();

        for op in ops {
            match op {
                Ok(label) => {
                    if !added.insert(label) {
                        continue;
                    }
                    let (hash, prime) = member(&[label]);
                    engine.add(hash, &prime).unwrap();
                    active.insert((hash, prime));
                }
                Err(index) => {
                    if active.is_empty() {
                        continue;
                    }
                    let target = active.iter().nth(index as usize % active.len()).cloned().unwrap();
                    active.remove(&target);
                    engine.revoke(target.0, &target.1, active.iter().map(|(_, p)| p)).unwrap();
                }
            }
        }

        let history = engine.history().unwrap();
        let encoder = PrimeEncoder::default();
        for generation in 0..=history.last_generation() {
            let replayed = history.replay(0, generation, &encoder).unwrap();
            prop_assert_eq!(Some(&replayed.value), history.value_at(generation));
        }
        prop_assert_eq!(&history.audit(&encoder).unwrap(), engine.state().unwrap());
    }

    #[test]
    fn tampered_chain_is_rejected(labels in arb_labels(5), pick in any::<prop::sample::Index>()) {
        let mut engine = engine();
        for label in &labels {
            let (hash, prime) = member(label);
            engine.add(hash, &prime).unwrap();
        }

        let mut entries = engine.history().unwrap().entries().to_vec();
        let target = pick.index(entries.len());
        entries[target].previous_value += 1u32;

        let result = HistoryLog::from_entries(params(), entries);
        let is_generation_mismatch = matches!(result, Err(Error::GenerationMismatch { .. }));
        prop_assert!(is_generation_mismatch);
    }
}
