#![no_main]

use credo_core::{prime::is_probable_prime, BigUint, PrimeEncoder, RESERVED_PRIME_BOUND};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let encoder = PrimeEncoder::default();

    if let Ok(prime) = encoder.encode(data) {
        assert!(prime.bit(0));
        assert!(prime > BigUint::from(RESERVED_PRIME_BOUND));
        assert!(is_probable_prime(&prime));

        // Deterministic
        assert_eq!(encoder.encode(data).unwrap(), prime);
    }

    // Primality test must not panic on arbitrary integers
    let _ = is_probable_prime(&BigUint::from_bytes_be(data));
});
