//! Hash-to-prime encoding of identity credentials
//!
//! Every accumulated element must be a prime. The encoder hashes its input
//! to a 256-bit seed, forces the top and bottom bits, and walks odd
//! candidates upwards until a probable prime is found:
//!
//! ```text
//! c_0 = SHA256(DOMAIN || input) | 2^255 | 1
//! c_i = c_0 + 2i            for i < max_attempts
//! ```
//!
//! The search is deterministic, so the same input always yields the same
//! prime and anyone holding an identity hash can rederive its prime.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Domain separation tag for the prime seed
const PRIME_DOMAIN: &[u8] = b"credo:hash-to-prime:v1";

/// Default bound on the number of candidates tried per input
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4096;

/// Primes at or below this bound are reserved and never accumulated
pub const RESERVED_PRIME_BOUND: u64 = 1 << 16;

/// Primes used for trial division before Miller-Rabin
const SMALL_PRIMES: [u32; 25] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
    101,
];

/// Miller-Rabin bases (first twelve primes)
const MR_BASES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Deterministic hash-to-prime encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimeEncoder {
    max_attempts: u32,
}

impl Default for PrimeEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl PrimeEncoder {
    /// Create an encoder that gives up after `max_attempts` candidates
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Map an identity to its prime representative
    pub fn encode(&self, identity: &[u8]) -> Result<BigUint> {
        let mut candidate = seed(identity);
        let step = BigUint::from(2u8);

        for _ in 0..self.max_attempts {
            if is_probable_prime(&candidate) {
                return Ok(candidate);
            }
            candidate += &step;
        }

        Err(Error::EncodingExhausted {
            attempts: self.max_attempts,
        })
    }
}

/// Odd 256-bit starting candidate with the top bit set
fn seed(identity: &[u8]) -> BigUint {
    let mut hasher = Sha256::new();
    hasher.update(PRIME_DOMAIN);
    hasher.update(identity);
    let hash: [u8; 32] = hasher.finalize().into();

    let mut candidate = BigUint::from_bytes_be(&hash);
    candidate.set_bit(255, true);
    candidate.set_bit(0, true);
    candidate
}

/// Probabilistic primality test: trial division, then Miller-Rabin
pub fn is_probable_prime(n: &BigUint) -> bool {
    let two = BigUint::from(2u8);
    if *n < two {
        return false;
    }
    if *n == two {
        return true;
    }
    if n.is_even() {
        return false;
    }

    for &p in SMALL_PRIMES.iter() {
        let p = BigUint::from(p);
        if *n == p {
            return true;
        }
        if (n % &p).is_zero() {
            return false;
        }
    }

    let one = BigUint::one();
    let n_minus_one = n - &one;
    let s = n_minus_one.trailing_zeros().unwrap_or(0);
    let d = &n_minus_one >> s;

    'bases: for &a in MR_BASES.iter() {
        let a = BigUint::from(a);
        if a >= n_minus_one {
            continue;
        }

        let mut x = a.modpow(&d, n);
        if x == one || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = &x * &x % n;
            if x == n_minus_one {
                continue 'bases;
            }
        }
        return false;
    }

    true
}
