//! Passphrase-protected vault for the agent's root keys and DID.
//!
//! This module persists:
//! - The content encryption key (CEK), wrapped under a passphrase-derived key
//! - The agent's portable identity, encrypted under the CEK
//! - A small status record driving the lifecycle state machine
//!
//! The passphrase is stretched with PBKDF2-HMAC-SHA512 into the vault
//! unlock key; nothing secret is ever stored in plaintext.

pub mod backup;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod manager;
pub mod shared;
pub mod status;

pub use backup::{BackupBundle, VaultBackup};
pub use envelope::{ContentEncryptionAlgorithm, Envelope, KeyManagementAlgorithm, ProtectedHeader};
pub use error::{VaultError, VaultResult};
pub use kdf::ContentEncryptionKey;
pub use manager::IdentityVault;
pub use shared::SharedVault;
pub use status::{read_status, write_status, VaultState, VaultStatus};
