//! Registry configuration.
//!
//! # Responsibility
//! - Hold the tunables of a registry (load pacing, lookup diagnostics).
//! - Parse them from JSON so hosts can ship them next to their own settings.
//!
//! # Invariants
//! - `load_batch_size` is always > 0 once validated.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Entities materialized per cooperative load step by default.
pub const DEFAULT_LOAD_BATCH_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Entities materialized per `LoadSequence::step` call.
    pub load_batch_size: usize,
    /// Log `find` misses at `warn`.
    pub log_lookup_misses: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            load_batch_size: DEFAULT_LOAD_BATCH_SIZE,
            log_lookup_misses: true,
        }
    }
}

impl RegistryConfig {
    /// Parses and validates a JSON config. Missing fields take defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    ZeroBatchSize,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid registry config: {message}"),
            Self::ZeroBatchSize => write!(f, "load_batch_size must be greater than zero"),
        }
    }
}

impl Error for ConfigError {}
