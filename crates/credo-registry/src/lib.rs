//! Credo Registry - identity credential registry over an RSA accumulator
//!
//! This crate wraps the accumulator core into a usable registry:
//! - Identity directory with permanent revocation tombstones
//! - Witness management with eager or lazy refresh
//! - Durable history ledger with rollback on persistence failure
//! - Accumulator publication for offline verifiers
//! - On-disk storage and the `credo` command line tool

pub mod config;
pub mod directory;
pub mod error;
pub mod persistence;
pub mod publish;
pub mod registry;
pub mod storage;
pub mod witness;

pub use config::{RefreshStrategy, RegistryConfig, TombstonePolicy};
pub use directory::{IdentityDirectory, MembershipLookup};
pub use error::{PersistError, RegistryError, Result};
pub use persistence::{FileLedger, HistoryLedger, LedgerRecord, MemoryLedger};
pub use publish::AccumulatorExport;
pub use registry::{CredentialRegistry, RegistryStatus};
pub use storage::RegistryStorage;
pub use witness::WitnessManager;
