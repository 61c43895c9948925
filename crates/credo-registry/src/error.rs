//! Error types for the credential registry

use thiserror::Error;

/// Result type alias for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Failure reported by the history ledger
#[derive(Debug, Error)]
pub enum PersistError {
    /// Ledger storage failed
    #[error("Ledger IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded
    #[error("Ledger serialization error: {0}")]
    Serialization(String),

    /// Ledger refused the entry
    #[error("Ledger rejected entry: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for PersistError {
    fn from(e: serde_json::Error) -> Self {
        PersistError::Serialization(e.to_string())
    }
}

/// Errors that can occur in registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] credo_core::Error),

    /// Identity hash already registered (active or revoked)
    #[error("Identity already exists: {0}")]
    AlreadyExists(String),

    /// Prime already belongs to another identity
    #[error("Prime already in use by identity: {0}")]
    DuplicatePrime(String),

    /// Identity not found in the directory
    #[error("Identity not found: {0}")]
    NotFound(String),

    /// Identity already revoked
    #[error("Identity already revoked: {0}")]
    AlreadyRevoked(String),

    /// Witness requested for a revoked identity
    #[error("Witness revoked: {0}")]
    WitnessRevoked(String),

    /// Content reference purged after revocation
    #[error("Content reference purged: {0}")]
    ContentPurged(String),

    /// History ledger failed; the transition was rolled back
    #[error("Persist error: {0}")]
    Persist(#[from] PersistError),

    /// Directory and history disagree
    #[error("Registry inconsistent: {0}")]
    Inconsistent(String),

    /// Registry lock poisoned by a panicking writer
    #[error("Registry lock poisoned")]
    LockPoisoned,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Serialization(e.to_string())
    }
}

impl RegistryError {
    /// Whether the error came from the ledger and the operation may be retried
    pub fn is_persist(&self) -> bool {
        matches!(self, RegistryError::Persist(_))
    }
}
