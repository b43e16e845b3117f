//! Vault lifecycle status.
//!
//! The persisted [`VaultStatus`] record is the source of truth for the state
//! machine; [`VaultState`] is the derived view:
//! - `Uninitialized` → `Unlocked` (after `initialize`)
//! - `Unlocked` → `Locked` (after `lock`)
//! - `Locked` → `Unlocked` (after `unlock`, `change_passphrase` or `restore`)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{VaultError, VaultResult};
use crate::storage::{KeyValueStore, STATUS_KEY};

/// Persisted lifecycle record, stored as JSON under `appDataStatus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    pub initialized: bool,
    pub locked: bool,
    pub last_backup: Option<DateTime<Utc>>,
    pub last_restore: Option<DateTime<Utc>>,
}

impl Default for VaultStatus {
    fn default() -> Self {
        Self {
            initialized: false,
            locked: true,
            last_backup: None,
            last_restore: None,
        }
    }
}

impl VaultStatus {
    pub fn state(&self) -> VaultState {
        match (self.initialized, self.locked) {
            (false, _) => VaultState::Uninitialized,
            (true, true) => VaultState::Locked,
            (true, false) => VaultState::Unlocked,
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum VaultState {
    #[default]
    Uninitialized,
    Locked,
    Unlocked,
}

impl std::fmt::Display for VaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Locked => write!(f, "Locked"),
            Self::Unlocked => write!(f, "Unlocked"),
        }
    }
}

/// Read the status record. An absent record is the default (uninitialized,
/// locked) status.
pub fn read_status<S: KeyValueStore + ?Sized>(store: &S) -> VaultResult<VaultStatus> {
    match store.get(STATUS_KEY)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| {
            VaultError::StorageUnavailable(format!("Status record is corrupted: {}", e))
        }),
        None => Ok(VaultStatus::default()),
    }
}

pub fn write_status<S: KeyValueStore + ?Sized>(store: &mut S, status: &VaultStatus) -> VaultResult<()> {
    let raw = serde_json::to_string(status)
        .map_err(|e| VaultError::StorageUnavailable(e.to_string()))?;
    store.set(STATUS_KEY, &raw)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_absent_status_is_uninitialized_and_locked() {
        let store = MemoryStore::new();
        let status = read_status(&store).unwrap();
        assert!(!status.initialized);
        assert!(status.locked);
        assert_eq!(status.state(), VaultState::Uninitialized);
    }

    #[test]
    fn test_status_json_field_names() {
        let mut store = MemoryStore::new();
        let status = VaultStatus {
            initialized: true,
            locked: false,
            last_backup: Some(Utc::now()),
            last_restore: None,
        };
        write_status(&mut store, &status).unwrap();

        let raw = store.get(STATUS_KEY).unwrap().unwrap();
        assert!(raw.contains("\"initialized\":true"));
        assert!(raw.contains("\"lastBackup\""));
        assert!(raw.contains("\"lastRestore\":null"));

        assert_eq!(read_status(&store).unwrap(), status);
    }

    #[test]
    fn test_state_derivation() {
        let mut status = VaultStatus::default();
        status.initialized = true;
        assert_eq!(status.state(), VaultState::Locked);
        status.locked = false;
        assert_eq!(status.state(), VaultState::Unlocked);
        assert_eq!(status.state().to_string(), "Unlocked");
    }

    #[test]
    fn test_corrupted_status_is_storage_error() {
        let mut store = MemoryStore::new();
        store.set(STATUS_KEY, "{not json").unwrap();
        assert!(matches!(
            read_status(&store),
            Err(VaultError::StorageUnavailable(_))
        ));
    }
}
