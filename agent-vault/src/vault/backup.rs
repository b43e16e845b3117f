//! Backup artifact format.
//!
//! A backup is `base64url(JSON { agentDid, contentEncryptionKey, status })`.
//! Both envelopes stay encrypted, so the artifact never carries plaintext
//! secrets; restoring it still requires the passphrase.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::envelope::{Envelope, KeyManagementAlgorithm};
use super::error::{VaultError, VaultResult};
use super::status::VaultStatus;

/// The three store entries captured by a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupBundle {
    pub agent_did: String,
    pub content_encryption_key: String,
    pub status: VaultStatus,
}

impl BackupBundle {
    pub fn encode(&self) -> VaultResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| VaultError::MalformedBackup(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode and shape-check a backup artifact.
    ///
    /// Both envelopes must parse and be of the expected mode; nothing is
    /// decrypted here.
    pub fn decode(data: &str) -> VaultResult<Self> {
        let json = URL_SAFE_NO_PAD
            .decode(data.trim().trim_end_matches('='))
            .map_err(|_| VaultError::MalformedBackup("backup is not base64url".into()))?;

        let bundle: BackupBundle = serde_json::from_slice(&json)
            .map_err(|e| VaultError::MalformedBackup(e.to_string()))?;

        let cek = Envelope::parse(&bundle.content_encryption_key).map_err(|e| {
            VaultError::MalformedBackup(format!("contentEncryptionKey: {}", e))
        })?;
        if cek.header().alg != KeyManagementAlgorithm::Pbes2Hs512A256Kw {
            return Err(VaultError::MalformedBackup(
                "contentEncryptionKey is not a key-wrapping envelope".into(),
            ));
        }

        let did = Envelope::parse(&bundle.agent_did)
            .map_err(|e| VaultError::MalformedBackup(format!("agentDid: {}", e)))?;
        if did.header().alg != KeyManagementAlgorithm::Direct {
            return Err(VaultError::MalformedBackup(
                "agentDid is not a direct envelope".into(),
            ));
        }

        Ok(bundle)
    }
}

/// Result of [`IdentityVault::backup`](super::IdentityVault::backup).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultBackup {
    /// The opaque backup artifact
    pub data: String,
    pub date_created: DateTime<Utc>,
    /// Length of `data` in bytes
    pub size: usize,
}

impl VaultBackup {
    pub(crate) fn new(data: String) -> Self {
        let size = data.len();
        Self {
            data,
            date_created: Utc::now(),
            size,
        }
    }
}
