//! Registry configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use credo_core::DEFAULT_MAX_ATTEMPTS;

use crate::error::{RegistryError, Result};

/// When stored witnesses are brought up to the current generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStrategy {
    /// Refresh every live witness on each state change
    Eager,

    /// Refresh a witness when it is next requested
    #[default]
    Lazy,
}

/// What happens to a revoked identity's content reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TombstonePolicy {
    /// Keep the content reference for audit
    #[default]
    Retain,

    /// Drop the content reference; the tombstone itself stays
    Purge,
}

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Witness refresh strategy
    pub refresh_strategy: RefreshStrategy,

    /// Handling of content references on revocation
    pub tombstone_policy: TombstonePolicy,

    /// Candidate bound for hash-to-prime encoding
    pub max_prime_attempts: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            refresh_strategy: RefreshStrategy::default(),
            tombstone_policy: TombstonePolicy::default(),
            max_prime_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_prime_attempts == 0 {
            return Err(RegistryError::Config(
                "max_prime_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.refresh_strategy, RefreshStrategy::Lazy);
        assert_eq!(config.tombstone_policy, TombstonePolicy::Retain);
        assert_eq!(config.max_prime_attempts, 4096);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = RegistryConfig {
            refresh_strategy: RefreshStrategy::Eager,
            tombstone_policy: TombstonePolicy::Purge,
            max_prime_attempts: 128,
        };
        config.save(&path).unwrap();

        let loaded = RegistryConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "refresh_strategy": "eager" }"#).unwrap();

        let loaded = RegistryConfig::load(&path).unwrap();
        assert_eq!(loaded.refresh_strategy, RefreshStrategy::Eager);
        assert_eq!(loaded.max_prime_attempts, 4096);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "max_prime_attempts": 0 }"#).unwrap();

        assert!(matches!(
            RegistryConfig::load(&path),
            Err(RegistryError::Config(_))
        ));
    }
}
