//! Shareable handle around an [`IdentityVault`].
//!
//! The vault itself does not serialize callers. This wrapper puts it behind
//! an async mutex so `initialize`, `lock`, `unlock`, `change_passphrase` and
//! `restore` can never interleave, even when the handle is cloned across
//! tasks.

use std::sync::Arc;

use tokio::sync::Mutex;
use zeroize::Zeroizing;

use super::backup::VaultBackup;
use super::error::VaultResult;
use super::manager::IdentityVault;
use super::status::{VaultState, VaultStatus};
use crate::security::{
    CryptoProvider, DidKeyProvisioner, Identity, IdentityProvisioner, RustCryptoProvider,
};
use crate::storage::KeyValueStore;

pub struct SharedVault<S, P = DidKeyProvisioner, C = RustCryptoProvider> {
    inner: Arc<Mutex<IdentityVault<S, P, C>>>,
}

impl<S, P, C> Clone for SharedVault<S, P, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, P, C> SharedVault<S, P, C>
where
    S: KeyValueStore,
    P: IdentityProvisioner,
    C: CryptoProvider,
{
    pub fn new(vault: IdentityVault<S, P, C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vault)),
        }
    }

    pub async fn status(&self) -> VaultResult<VaultStatus> {
        self.inner.lock().await.status()
    }

    pub async fn state(&self) -> VaultResult<VaultState> {
        self.inner.lock().await.state()
    }

    pub async fn initialize(
        &self,
        passphrase: &str,
        recovery_phrase: Option<&str>,
    ) -> VaultResult<Zeroizing<String>> {
        self.inner
            .lock()
            .await
            .initialize(passphrase, recovery_phrase)
    }

    pub async fn lock(&self) -> VaultResult<()> {
        self.inner.lock().await.lock()
    }

    pub async fn unlock(&self, passphrase: &str) -> VaultResult<()> {
        self.inner.lock().await.unlock(passphrase)
    }

    pub async fn change_passphrase(
        &self,
        old_passphrase: &str,
        new_passphrase: &str,
    ) -> VaultResult<()> {
        self.inner
            .lock()
            .await
            .change_passphrase(old_passphrase, new_passphrase)
    }

    pub async fn get_agent_did(&self) -> VaultResult<Identity> {
        self.inner.lock().await.get_agent_did()
    }

    pub async fn backup(&self) -> VaultResult<VaultBackup> {
        self.inner.lock().await.backup()
    }

    pub async fn restore(&self, backup: &str, passphrase: &str) -> VaultResult<()> {
        self.inner.lock().await.restore(backup, passphrase)
    }
}
