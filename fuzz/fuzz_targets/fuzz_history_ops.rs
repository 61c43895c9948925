#![no_main]

use std::collections::{BTreeMap, BTreeSet};

use arbitrary::Arbitrary;
use credo_core::{AccumulatorEngine, BigUint, HistoryLog, IdentityHash, PrimeEncoder};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Add(u8),
    Revoke(u8),
    /// Flip the previous value of an entry and re-validate the chain
    Tamper(u8),
}

fuzz_target!(|ops: Vec<Op>| {
    let encoder = PrimeEncoder::default();
    let mut engine = AccumulatorEngine::new();
    // 1019 * 1187
    engine
        .initialize(BigUint::from(1_209_553u32), BigUint::from(4u8))
        .unwrap();

    let mut active: BTreeMap<IdentityHash, BigUint> = BTreeMap::new();

    for op in ops.iter().take(32) {
        match op {
            Op::Add(label) => {
                let hash = IdentityHash::from_credential(&[*label]);
                if active.contains_key(&hash) {
                    continue;
                }
                let prime = encoder.encode(hash.as_bytes()).unwrap();
                engine.add(hash, &prime).unwrap();
                active.insert(hash, prime);
            }
            Op::Revoke(label) => {
                let hash = IdentityHash::from_credential(&[*label]);
                if let Some(prime) = active.remove(&hash) {
                    engine.revoke(hash, &prime, active.values()).unwrap();
                }
            }
            Op::Tamper(index) => {
                let history = engine.history().unwrap();
                if history.is_empty() {
                    continue;
                }
                let mut entries = history.entries().to_vec();
                let target = *index as usize % entries.len();
                entries[target].previous_value += 1u32;
                assert!(HistoryLog::from_entries(history.params().clone(), entries).is_err());
            }
        }
    }

    let history = engine.history().unwrap();
    let audited = history.audit(&encoder).unwrap();
    assert_eq!(&audited, engine.state().unwrap());
    let expected: BTreeSet<IdentityHash> = active.keys().copied().collect();
    assert_eq!(history.active_members(history.last_generation()), expected);
});
