use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Default PBKDF2 iteration count for the vault unlock key.
pub const DEFAULT_WORK_FACTOR: u32 = 210_000;

/// Upper bound on PBKDF2 iterations, for configs and stored envelopes alike.
pub const MAX_WORK_FACTOR: u32 = 10_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// PBKDF2-SHA512 iterations used when sealing a new CEK envelope.
    /// Existing envelopes keep the count recorded in their header.
    pub key_derivation_work_factor: u32,
    /// Directory for the file-backed store, if one is used.
    pub data_dir: Option<PathBuf>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            key_derivation_work_factor: DEFAULT_WORK_FACTOR,
            data_dir: None,
        }
    }
}

impl VaultConfig {
    pub fn with_work_factor(mut self, work_factor: u32) -> Self {
        self.key_derivation_work_factor = work_factor;
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }
}

pub fn load_config(path: &Path) -> Result<VaultConfig> {
    if !path.exists() {
        return Ok(VaultConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: VaultConfig = serde_json::from_str(&content)?;
    Ok(config)
}

pub fn save_config(path: &Path, config: &VaultConfig) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
