//! Credo Core - RSA accumulator primitives for identity credentials
//!
//! This crate provides the arithmetic core of the Credo identity registry:
//! hash-to-prime encoding, the accumulator engine with its witnesses, and the
//! append-only history log that makes every state transition auditable.

pub mod accumulator;
pub mod error;
pub mod history;
pub mod identity;
pub mod prime;
pub mod types;

pub use accumulator::{
    accumulate, update_witness, AccumulatorEngine, AccumulatorParams, AccumulatorState,
    Transition, Witness, DEFAULT_BASE, RSA2048_MODULUS,
};
pub use error::{Error, Result};
pub use history::{HistoryEntry, HistoryLog, Operation};
pub use identity::{IdentityRecord, IdentityStatus};
pub use prime::{PrimeEncoder, DEFAULT_MAX_ATTEMPTS, RESERVED_PRIME_BOUND};
pub use types::{ContentRef, IdentityHash};

pub use num_bigint::BigUint;
