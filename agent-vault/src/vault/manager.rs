//! IdentityVault - lifecycle management for the agent's root keys and DID.
//!
//! This module provides the IdentityVault struct that handles:
//! - Vault initialization from a passphrase and optional recovery phrase
//! - Locking and unlocking (passphrase verification)
//! - Passphrase rotation without touching the identity payload
//! - Backup and all-or-nothing restore
//! - Access to the decrypted identity while unlocked
//!
//! The content encryption key (CEK) is held in memory only while unlocked and
//! is persisted only inside a passphrase-wrapped envelope.

use chrono::Utc;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

use super::backup::{BackupBundle, VaultBackup};
use super::envelope::{Envelope, ProtectedHeader, CTY_IDENTITY};
use super::error::{VaultError, VaultResult};
use super::kdf::{
    derive_content_encryption_key, derive_salt_input, derive_unlock_key, ContentEncryptionKey,
};
use super::status::{read_status, write_status, VaultState, VaultStatus};
use crate::security::{
    CryptoProvider, DerivedKeys, DidKeyProvisioner, Identity, IdentityProvisioner,
    PortableIdentity, PredefinedKeys, RecoveryPhrase, RustCryptoProvider,
};
use crate::storage::{
    FileStore, KeyValueStore, VaultConfig, CEK_KEY, DID_KEY, MAX_WORK_FACTOR, STATUS_KEY,
};

/// IdentityVault owns the vault state machine.
///
/// Callers must not run mutating operations concurrently on one instance;
/// wrap it in [`SharedVault`](super::SharedVault) when it is shared.
pub struct IdentityVault<S, P = DidKeyProvisioner, C = RustCryptoProvider> {
    store: S,
    provisioner: P,
    crypto: C,
    /// PBKDF2 iterations for newly sealed CEK envelopes
    work_factor: u32,
    /// The CEK (only present when the vault is unlocked)
    cek: Option<ContentEncryptionKey>,
}

impl<S: KeyValueStore> IdentityVault<S> {
    /// Create a vault over `store` with the default configuration.
    pub fn new(store: S) -> Self {
        Self {
            store,
            provisioner: DidKeyProvisioner,
            crypto: RustCryptoProvider,
            work_factor: VaultConfig::default().key_derivation_work_factor,
            cek: None,
        }
    }

    /// Create a vault over `store` with the given configuration.
    pub fn with_config(store: S, config: &VaultConfig) -> VaultResult<Self> {
        Self::with_components(store, DidKeyProvisioner, RustCryptoProvider, config)
    }
}

impl IdentityVault<FileStore> {
    /// Open the file-backed vault in `config.data_dir`.
    pub fn open(config: &VaultConfig) -> VaultResult<Self> {
        let data_dir = config
            .data_dir
            .as_ref()
            .ok_or_else(|| VaultError::Config("data_dir is not set".into()))?;

        debug!("Opening vault store in {:?}", data_dir);
        Self::with_config(FileStore::open(data_dir)?, config)
    }
}

impl<S, P, C> IdentityVault<S, P, C>
where
    S: KeyValueStore,
    P: IdentityProvisioner,
    C: CryptoProvider,
{
    /// Create a vault with explicit collaborators.
    pub fn with_components(
        store: S,
        provisioner: P,
        crypto: C,
        config: &VaultConfig,
    ) -> VaultResult<Self> {
        if config.key_derivation_work_factor == 0 {
            return Err(VaultError::Config(
                "key derivation work factor must be positive".into(),
            ));
        }
        if config.key_derivation_work_factor > MAX_WORK_FACTOR {
            return Err(VaultError::Config(format!(
                "key derivation work factor must not exceed {}",
                MAX_WORK_FACTOR
            )));
        }

        Ok(Self {
            store,
            provisioner,
            crypto,
            work_factor: config.key_derivation_work_factor,
            cek: None,
        })
    }

    /// Borrow the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// The persisted status record.
    pub fn status(&self) -> VaultResult<VaultStatus> {
        read_status(&self.store)
    }

    /// Current lifecycle state.
    ///
    /// A fresh instance over a store whose record says "unlocked" still
    /// reports `Locked`: without the CEK in memory nothing can be decrypted.
    pub fn state(&self) -> VaultResult<VaultState> {
        let state = self.status()?.state();
        match (state, &self.cek) {
            (VaultState::Unlocked, None) => Ok(VaultState::Locked),
            (state, _) => Ok(state),
        }
    }

    pub fn is_initialized(&self) -> VaultResult<bool> {
        Ok(self.status()?.initialized)
    }

    pub fn is_locked(&self) -> VaultResult<bool> {
        Ok(self.state()? != VaultState::Unlocked)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create the vault.
    ///
    /// Derives the vault, identity and signing keys from `recovery_phrase`
    /// (or a freshly generated phrase), seals the CEK under `passphrase`,
    /// provisions the DID and leaves the vault unlocked.
    ///
    /// Returns the recovery phrase so it can be shown to the user once.
    ///
    /// # Errors
    /// `EmptyPassphrase`, `AlreadyInitialized` and `InvalidRecoveryPhrase`
    /// are raised before anything is written.
    pub fn initialize(
        &mut self,
        passphrase: &str,
        recovery_phrase: Option<&str>,
    ) -> VaultResult<Zeroizing<String>> {
        if passphrase.trim().is_empty() {
            return Err(VaultError::EmptyPassphrase);
        }

        let status = self.status()?;
        if status.initialized {
            return Err(VaultError::AlreadyInitialized);
        }

        let phrase = match recovery_phrase {
            Some(phrase) => RecoveryPhrase::parse(phrase)?,
            None => RecoveryPhrase::generate()?,
        };
        let keys = DerivedKeys::from_phrase(&phrase)?;

        info!("Initializing vault");

        let cek = derive_content_encryption_key(&self.crypto, keys.vault.private_key())?;
        let salt_input = derive_salt_input(&self.crypto, &keys.vault.public_key())?;
        let header = ProtectedHeader::key_wrapping(self.work_factor, &salt_input);
        let cek_envelope = self.seal_cek(passphrase, header, &cek)?;

        let identity = self.provisioner.create_identity(PredefinedKeys {
            identity: keys.identity.signing_key(),
            signing: keys.signing.signing_key(),
        })?;
        let did_envelope = self.seal_identity(&identity, &cek)?;

        // Status goes last so an interrupted initialize stays re-runnable
        self.store.set(CEK_KEY, &cek_envelope)?;
        self.store.set(DID_KEY, &did_envelope)?;
        write_status(
            &mut self.store,
            &VaultStatus {
                initialized: true,
                locked: false,
                ..status
            },
        )?;

        self.cek = Some(cek);

        info!("Vault initialized for {}", identity.uri());
        Ok(phrase.phrase())
    }

    /// Lock the vault, erasing the CEK from memory.
    ///
    /// Locking an already locked vault is a no-op.
    pub fn lock(&mut self) -> VaultResult<()> {
        let mut status = self.status()?;
        if !status.initialized {
            return Err(VaultError::NotInitialized);
        }

        self.force_lock(&mut status)?;
        info!("Vault locked");
        Ok(())
    }

    /// Unlock the vault with `passphrase`.
    ///
    /// # Errors
    /// Returns `IncorrectPassphrase` if the CEK envelope does not open. The
    /// vault stays locked and no envelope is modified.
    pub fn unlock(&mut self, passphrase: &str) -> VaultResult<()> {
        let mut status = self.status()?;
        if !status.initialized {
            return Err(VaultError::NotInitialized);
        }

        self.force_lock(&mut status)?;

        let envelope = self.load_envelope(CEK_KEY)?;
        let unlock_key = derive_unlock_key(&self.crypto, passphrase, envelope.header())?;

        let cek_bytes = match envelope.open_key_wrapped(&self.crypto, &unlock_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Vault unlock failed: {}", e.code());
                return Err(e);
            }
        };
        let cek = ContentEncryptionKey::from_slice(&cek_bytes)?;

        status.locked = false;
        write_status(&mut self.store, &status)?;
        self.cek = Some(cek);

        info!("Vault unlocked");
        Ok(())
    }

    /// Re-wrap the CEK under `new_passphrase`.
    ///
    /// Authenticates with `old_passphrase` first (a full lock + unlock). The
    /// existing header, and with it the KDF salt and iteration count, is
    /// reused; only the wrapping secret changes. The identity envelope is not
    /// touched. Leaves the vault unlocked.
    pub fn change_passphrase(
        &mut self,
        old_passphrase: &str,
        new_passphrase: &str,
    ) -> VaultResult<()> {
        if new_passphrase.trim().is_empty() {
            return Err(VaultError::EmptyPassphrase);
        }

        if !self.status()?.initialized {
            return Err(VaultError::NotInitialized);
        }

        self.lock()?;
        self.unlock(old_passphrase)?;

        let header = self.load_envelope(CEK_KEY)?.header().clone();
        let sealed = {
            let cek = self.cek.as_ref().ok_or(VaultError::Locked)?;
            self.seal_cek(new_passphrase, header, cek)?
        };
        self.store.set(CEK_KEY, &sealed)?;

        info!("Vault passphrase changed");
        Ok(())
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Decrypt and import the agent identity. Requires an unlocked vault.
    pub fn get_agent_did(&self) -> VaultResult<Identity> {
        let status = self.status()?;
        let cek = self.require_unlocked(&status)?;

        let envelope = self.load_envelope(DID_KEY)?;
        let plaintext = envelope.open_direct(&self.crypto, cek.as_bytes())?;

        let portable: PortableIdentity = serde_json::from_slice(&plaintext)
            .map_err(|e| VaultError::MalformedEnvelope(format!("identity payload: {}", e)))?;
        let identity = self.provisioner.import(portable)?;

        debug!("Loaded agent identity {}", identity.uri());
        Ok(identity)
    }

    // =========================================================================
    // Backup / Restore
    // =========================================================================

    /// Export both envelopes and the status record as one opaque artifact.
    pub fn backup(&mut self) -> VaultResult<VaultBackup> {
        let mut status = self.status()?;
        self.require_unlocked(&status)?;

        let bundle = BackupBundle {
            agent_did: self.require_entry(DID_KEY)?,
            content_encryption_key: self.require_entry(CEK_KEY)?,
            status: status.clone(),
        };
        let backup = VaultBackup::new(bundle.encode()?);

        status.last_backup = Some(backup.date_created);
        write_status(&mut self.store, &status)?;

        info!("Vault backup created ({} bytes)", backup.size);
        Ok(backup)
    }

    /// Replace the vault contents with a backup and unlock it.
    ///
    /// All-or-nothing: if the artifact does not unlock with `passphrase`,
    /// every store entry is put back exactly as it was before the call and
    /// the in-memory key state is restored.
    pub fn restore(&mut self, backup: &str, passphrase: &str) -> VaultResult<()> {
        let bundle = BackupBundle::decode(backup)?;

        let snapshot = StoreSnapshot::capture(&self.store)?;
        let previous_cek = self.cek.clone();

        match self.apply_restore(&bundle, passphrase) {
            Ok(()) => {
                info!("Vault restored from backup");
                Ok(())
            }
            Err(err) => {
                warn!("Vault restore failed ({}), rolling back", err.code());

                if let Err(rollback_err) = snapshot.apply(&mut self.store) {
                    error!("Vault restore rollback failed: {}", rollback_err);
                    self.cek = None;
                    return Err(rollback_err);
                }

                self.cek = previous_cek;
                Err(err)
            }
        }
    }

    fn apply_restore(&mut self, bundle: &BackupBundle, passphrase: &str) -> VaultResult<()> {
        write_status(&mut self.store, &bundle.status)?;
        self.store.set(CEK_KEY, &bundle.content_encryption_key)?;
        self.store.set(DID_KEY, &bundle.agent_did)?;

        self.unlock(passphrase)?;

        let mut status = self.status()?;
        status.last_restore = Some(Utc::now());
        write_status(&mut self.store, &status)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn force_lock(&mut self, status: &mut VaultStatus) -> VaultResult<()> {
        // ContentEncryptionKey is ZeroizeOnDrop, so dropping it erases the bytes
        self.cek = None;

        if !status.locked {
            status.locked = true;
            write_status(&mut self.store, status)?;
        }
        Ok(())
    }

    fn require_unlocked(&self, status: &VaultStatus) -> VaultResult<&ContentEncryptionKey> {
        if !status.initialized {
            return Err(VaultError::NotInitialized);
        }
        match (&self.cek, status.locked) {
            (Some(cek), false) => Ok(cek),
            _ => Err(VaultError::Locked),
        }
    }

    fn require_entry(&self, key: &str) -> VaultResult<String> {
        self.store
            .get(key)?
            .ok_or_else(|| VaultError::MalformedEnvelope(format!("{} is missing", key)))
    }

    fn load_envelope(&self, key: &str) -> VaultResult<Envelope> {
        Envelope::parse(&self.require_entry(key)?)
    }

    fn seal_cek(
        &self,
        passphrase: &str,
        header: ProtectedHeader,
        cek: &ContentEncryptionKey,
    ) -> VaultResult<String> {
        let unlock_key = derive_unlock_key(&self.crypto, passphrase, &header)?;
        let envelope =
            Envelope::seal_key_wrapped(&self.crypto, header, &unlock_key, cek.as_bytes())?;
        Ok(envelope.to_compact())
    }

    fn seal_identity(
        &self,
        identity: &Identity,
        cek: &ContentEncryptionKey,
    ) -> VaultResult<String> {
        let portable = self.provisioner.export(identity)?;
        let payload = Zeroizing::new(
            serde_json::to_vec(&portable).map_err(|e| VaultError::Provisioning(e.to_string()))?,
        );

        let envelope = Envelope::seal_direct(
            &self.crypto,
            ProtectedHeader::direct(CTY_IDENTITY),
            cek.as_bytes(),
            &payload,
        )?;
        Ok(envelope.to_compact())
    }
}

/// Raw copies of the three vault entries, taken before a restore.
struct StoreSnapshot {
    entries: Vec<(&'static str, Option<String>)>,
}

impl StoreSnapshot {
    fn capture<S: KeyValueStore + ?Sized>(store: &S) -> VaultResult<Self> {
        let mut entries = Vec::with_capacity(3);
        for key in [STATUS_KEY, CEK_KEY, DID_KEY] {
            entries.push((key, store.get(key)?));
        }
        Ok(Self { entries })
    }

    fn apply<S: KeyValueStore + ?Sized>(&self, store: &mut S) -> VaultResult<()> {
        for (key, value) in &self.entries {
            match value {
                Some(value) => store.set(key, value)?,
                None => store.delete(key)?,
            }
        }
        Ok(())
    }
}
