//! Error types for the Credo core library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Accumulator not initialized")]
    NotInitialized,

    #[error("Accumulator already initialized")]
    AlreadyInitialized,

    #[error("Invalid modulus: {0}")]
    InvalidModulus(String),

    #[error("Invalid base: {0}")]
    InvalidBase(String),

    #[error("Invalid prime: {0}")]
    InvalidPrime(String),

    #[error("No prime found after {attempts} candidates")]
    EncodingExhausted { attempts: u32 },

    #[error("Not a member of the accumulator: {0}")]
    NotAMember(String),

    /// History chain violation. Never repaired automatically.
    #[error("History generation mismatch at generation {generation}: {reason}")]
    GenerationMismatch { generation: u64, reason: String },

    #[error("Replayed value diverges from logged value at generation {generation}")]
    ReplayDivergence { generation: u64 },

    #[error("Invalid generation range {from}..={to} (last generation {last})")]
    InvalidRange { from: u64, to: u64, last: u64 },
}
