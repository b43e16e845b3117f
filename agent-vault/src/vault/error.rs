//! Vault error taxonomy.
//!
//! Every error a caller can see from the vault is one of these variants.
//! Low-level crypto errors are normalized before they get here, so the set
//! stays stable if the primitive implementations change.

use thiserror::Error;

use crate::error::StoreError;
use crate::security::{HdError, ProvisionError};

/// Errors that can occur during vault operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// `initialize` was called on a vault that already holds an identity.
    #[error("Vault is already initialized")]
    AlreadyInitialized,

    /// The operation needs an initialized vault.
    #[error("Vault is not initialized")]
    NotInitialized,

    /// The operation needs the vault to be unlocked.
    #[error("Vault is locked")]
    Locked,

    /// Passphrase was empty or whitespace-only.
    #[error("Passphrase must not be empty")]
    EmptyPassphrase,

    /// Unwrapping the content encryption key failed. A wrong passphrase and
    /// a corrupted envelope are deliberately reported the same way.
    #[error("Incorrect passphrase")]
    IncorrectPassphrase,

    /// An envelope could not be parsed or lacks fields required by its mode.
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A backup artifact failed shape validation.
    #[error("Malformed backup: {0}")]
    MalformedBackup(String),

    /// The key-value store failed to read or write.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The recovery phrase failed word-list or checksum validation.
    #[error("Invalid recovery phrase")]
    InvalidRecoveryPhrase,

    /// The identity provisioner rejected the keys or the stored identity.
    #[error("Identity provisioning failed: {0}")]
    Provisioning(String),

    /// Invalid vault configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sealing a new envelope failed.
    #[error("Encryption failed")]
    EncryptionFailed,
}

/// Result type alias for vault operations.
pub type VaultResult<T> = std::result::Result<T, VaultError>;

impl VaultError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::AlreadyInitialized => "ALREADY_INITIALIZED",
            VaultError::NotInitialized => "NOT_INITIALIZED",
            VaultError::Locked => "LOCKED",
            VaultError::EmptyPassphrase => "EMPTY_PASSPHRASE",
            VaultError::IncorrectPassphrase => "INCORRECT_PASSPHRASE",
            VaultError::MalformedEnvelope(_) => "MALFORMED_ENVELOPE",
            VaultError::MalformedBackup(_) => "MALFORMED_BACKUP",
            VaultError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            VaultError::InvalidRecoveryPhrase => "INVALID_RECOVERY_PHRASE",
            VaultError::Provisioning(_) => "PROVISIONING_ERROR",
            VaultError::Config(_) => "CONFIG_ERROR",
            VaultError::EncryptionFailed => "ENCRYPTION_FAILED",
        }
    }
}

// ============================================================================
// Conversions from lower layers
// ============================================================================

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        VaultError::StorageUnavailable(err.to_string())
    }
}

impl From<HdError> for VaultError {
    fn from(err: HdError) -> Self {
        match err {
            HdError::InvalidMnemonic(_) => VaultError::InvalidRecoveryPhrase,
            HdError::InvalidPath(_) | HdError::Derivation => {
                VaultError::Provisioning(err.to_string())
            }
        }
    }
}

impl From<ProvisionError> for VaultError {
    fn from(err: ProvisionError) -> Self {
        VaultError::Provisioning(err.to_string())
    }
}

// ============================================================================
// Serialization for UI / IPC layers
// ============================================================================

impl serde::Serialize for VaultError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("VaultError", 2)?;
        state.serialize_field("code", self.code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
