//! Registry storage
//!
//! Lays out a registry on disk under one data directory:
//!
//! ```text
//! <data_dir>/config.json      RegistryConfig
//! <data_dir>/params.json      AccumulatorParams (written once at init)
//! <data_dir>/history.jsonl    ledger, one record per line
//! ```
//!
//! The ledger is the only file that changes after init. The identity
//! directory is rebuilt from it on open.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

use credo_core::AccumulatorParams;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::persistence::FileLedger;
use crate::registry::CredentialRegistry;

/// File-backed registry storage
pub struct RegistryStorage {
    /// Base path for storage
    base_path: PathBuf,
}

impl RegistryStorage {
    /// Create a new storage instance
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Check if accumulator parameters exist
    pub fn is_initialized(&self) -> bool {
        self.params_path().exists()
    }

    /// Load configuration, writing the default if none exists
    pub fn load_config(&self) -> Result<RegistryConfig> {
        let path = self.config_path();
        if !path.exists() {
            let config = RegistryConfig::default();
            config.save(&path)?;
            return Ok(config);
        }
        RegistryConfig::load(&path)
    }

    /// Load accumulator parameters
    pub fn load_params(&self) -> Result<AccumulatorParams> {
        let path = self.params_path();
        if !path.exists() {
            return Err(credo_core::Error::NotInitialized.into());
        }
        read_json(&path)
    }

    /// Save accumulator parameters
    pub fn save_params(&self, params: &AccumulatorParams) -> Result<()> {
        write_json(&self.params_path(), params)
    }

    /// Open the append-only history ledger
    pub fn open_ledger(&self) -> Result<FileLedger> {
        Ok(FileLedger::open(self.history_path())?)
    }

    /// Create a fresh registry and record its parameters
    pub fn create_registry(&self, params: AccumulatorParams) -> Result<CredentialRegistry> {
        if self.is_initialized() {
            return Err(credo_core::Error::AlreadyInitialized.into());
        }

        let config = self.load_config()?;
        let registry = CredentialRegistry::new(config, Box::new(self.open_ledger()?));
        registry.initialize(params.modulus.clone(), params.base.clone())?;
        self.save_params(&params)?;
        Ok(registry)
    }

    /// Rebuild the registry from disk
    pub fn open_registry(&self) -> Result<CredentialRegistry> {
        let config = self.load_config()?;
        let params = self.load_params()?;
        let ledger = self.open_ledger()?;
        let records = ledger.load()?;

        CredentialRegistry::restore(config, params, records, Box::new(ledger))
    }

    fn config_path(&self) -> PathBuf {
        self.base_path.join("config.json")
    }

    fn params_path(&self) -> PathBuf {
        self.base_path.join("params.json")
    }

    fn history_path(&self) -> PathBuf {
        self.base_path.join("history.jsonl")
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write to a temp file first, then rename for atomicity
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, &content)?;
    std::fs::rename(&temp_path, path).map_err(RegistryError::Io)?;
    Ok(())
}
