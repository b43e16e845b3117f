//! String-keyed persistence for the vault.
//!
//! The vault only ever stores three opaque strings (see the key constants
//! below), so the backend contract is a plain key-value store. Two backends
//! ship with the crate:
//! - [`MemoryStore`] for tests and for callers that persist elsewhere
//! - [`FileStore`] which keeps all entries in one JSON file

mod config;
mod file;

use std::collections::BTreeMap;

use crate::error::Result;

pub use config::{load_config, save_config, VaultConfig, DEFAULT_WORK_FACTOR, MAX_WORK_FACTOR};
pub use file::{FileStore, STORE_FILE_NAME};

/// Key for the serialized [`VaultStatus`](crate::vault::VaultStatus) record.
pub const STATUS_KEY: &str = "appDataStatus";

/// Key for the passphrase-wrapped content encryption key envelope.
pub const CEK_KEY: &str = "contentEncryptionKey";

/// Key for the CEK-encrypted portable identity envelope.
pub const DID_KEY: &str = "agentDid";

/// Minimal key-value store consumed by the vault.
pub trait KeyValueStore {
    /// Read a value. Returns `Ok(None)` when the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a value.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<()>;
}

/// In-memory store backed by a `BTreeMap`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        (**self).delete(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_set_get_delete() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get(STATUS_KEY).unwrap(), None);

        store.set(STATUS_KEY, "{}").unwrap();
        assert_eq!(store.get(STATUS_KEY).unwrap().as_deref(), Some("{}"));

        store.set(STATUS_KEY, "{\"x\":1}").unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(STATUS_KEY).unwrap().as_deref(), Some("{\"x\":1}"));

        store.delete(STATUS_KEY).unwrap();
        assert_eq!(store.get(STATUS_KEY).unwrap(), None);

        // Deleting again is a no-op
        store.delete(STATUS_KEY).unwrap();
    }
}
