//! Compact authenticated-encryption envelopes.
//!
//! Wire format: five base64url (unpadded) segments joined by `.`:
//!
//! ```text
//! protectedHeader.wrappedKey.iv.ciphertext.tag
//! ```
//!
//! Two modes share the format:
//! - key-wrapping (`PBES2-HS512+A256KW`): a random content key is wrapped
//!   under the passphrase-derived key with AES-256-KW, and the payload is
//!   sealed under that content key with AES-256-GCM
//! - direct (`dir`): the payload is sealed under the vault CEK with
//!   AES-256-GCM and the wrapped-key segment is empty
//!
//! The header segment, exactly as encoded, is the AEAD associated data, so
//! any header change breaks the tag.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::error::{VaultError, VaultResult};
use crate::security::{CryptoError, CryptoProvider, IV_SIZE, KEY_SIZE, TAG_SIZE};
use crate::storage::MAX_WORK_FACTOR;

const SEGMENT_COUNT: usize = 5;

/// Content type for a wrapped CEK payload.
pub const CTY_KEY: &str = "text/plain";

/// Content type for a portable identity payload.
pub const CTY_IDENTITY: &str = "json";

/// How the payload key is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyManagementAlgorithm {
    #[serde(rename = "PBES2-HS512+A256KW")]
    Pbes2Hs512A256Kw,
    #[serde(rename = "dir")]
    Direct,
}

impl KeyManagementAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pbes2Hs512A256Kw => "PBES2-HS512+A256KW",
            Self::Direct => "dir",
        }
    }
}

/// Payload cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncryptionAlgorithm {
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedHeader {
    pub alg: KeyManagementAlgorithm,
    pub enc: ContentEncryptionAlgorithm,
    pub cty: String,
    /// PBKDF2 iteration count (key-wrapping mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2c: Option<u32>,
    /// base64url salt input (key-wrapping mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p2s: Option<String>,
}

impl ProtectedHeader {
    /// Header for a passphrase-wrapped key envelope.
    pub fn key_wrapping(work_factor: u32, salt_input: &[u8]) -> Self {
        Self {
            alg: KeyManagementAlgorithm::Pbes2Hs512A256Kw,
            enc: ContentEncryptionAlgorithm::A256Gcm,
            cty: CTY_KEY.to_string(),
            p2c: Some(work_factor),
            p2s: Some(URL_SAFE_NO_PAD.encode(salt_input)),
        }
    }

    /// Header for a payload sealed directly under the CEK.
    pub fn direct(cty: &str) -> Self {
        Self {
            alg: KeyManagementAlgorithm::Direct,
            enc: ContentEncryptionAlgorithm::A256Gcm,
            cty: cty.to_string(),
            p2c: None,
            p2s: None,
        }
    }

    /// PBKDF2 iteration count. Key-wrapping headers only.
    ///
    /// Counts above [`MAX_WORK_FACTOR`] are rejected before any derivation
    /// runs.
    pub fn work_factor(&self) -> VaultResult<u32> {
        match self.p2c {
            Some(p2c) if p2c > MAX_WORK_FACTOR => Err(VaultError::MalformedEnvelope(format!(
                "p2c {} exceeds the maximum of {}",
                p2c, MAX_WORK_FACTOR
            ))),
            Some(p2c) if p2c > 0 => Ok(p2c),
            _ => Err(VaultError::MalformedEnvelope(
                "header is missing a positive p2c".into(),
            )),
        }
    }

    /// Decoded `p2s`. Key-wrapping headers only.
    pub fn salt_input(&self) -> VaultResult<Vec<u8>> {
        let p2s = self
            .p2s
            .as_deref()
            .ok_or_else(|| VaultError::MalformedEnvelope("header is missing p2s".into()))?;
        let salt = URL_SAFE_NO_PAD
            .decode(p2s)
            .map_err(|_| VaultError::MalformedEnvelope("p2s is not base64url".into()))?;
        if salt.is_empty() {
            return Err(VaultError::MalformedEnvelope("p2s is empty".into()));
        }
        Ok(salt)
    }

    fn encode(&self) -> VaultResult<String> {
        let json = serde_json::to_vec(self)
            .map_err(|e| VaultError::MalformedEnvelope(format!("header: {}", e)))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }
}

/// A parsed or freshly sealed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    header: ProtectedHeader,
    encoded_header: String,
    wrapped_key: Vec<u8>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl Envelope {
    /// Parse and validate a compact envelope. No cryptography happens here;
    /// anything structurally wrong is rejected as `MalformedEnvelope`.
    pub fn parse(compact: &str) -> VaultResult<Self> {
        let segments: Vec<&str> = compact.trim().split('.').collect();
        if segments.len() != SEGMENT_COUNT {
            return Err(VaultError::MalformedEnvelope(format!(
                "expected {} segments, found {}",
                SEGMENT_COUNT,
                segments.len()
            )));
        }

        let decode = |name: &str, segment: &str| {
            URL_SAFE_NO_PAD
                .decode(segment)
                .map_err(|_| VaultError::MalformedEnvelope(format!("{} is not base64url", name)))
        };

        let header_bytes = decode("protected header", segments[0])?;
        let header: ProtectedHeader = serde_json::from_slice(&header_bytes)
            .map_err(|e| VaultError::MalformedEnvelope(format!("protected header: {}", e)))?;

        let envelope = Self {
            header,
            encoded_header: segments[0].to_string(),
            wrapped_key: decode("wrapped key", segments[1])?,
            iv: decode("iv", segments[2])?,
            ciphertext: decode("ciphertext", segments[3])?,
            tag: decode("tag", segments[4])?,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    fn validate(&self) -> VaultResult<()> {
        match self.header.alg {
            KeyManagementAlgorithm::Pbes2Hs512A256Kw => {
                self.header.work_factor()?;
                self.header.salt_input()?;
                if self.wrapped_key.len() < 24 || self.wrapped_key.len() % 8 != 0 {
                    return Err(VaultError::MalformedEnvelope(
                        "wrapped key has an invalid length".into(),
                    ));
                }
            }
            KeyManagementAlgorithm::Direct => {
                if !self.wrapped_key.is_empty() {
                    return Err(VaultError::MalformedEnvelope(
                        "direct envelope carries a wrapped key".into(),
                    ));
                }
            }
        }

        if self.iv.len() != IV_SIZE {
            return Err(VaultError::MalformedEnvelope(format!(
                "iv must be {} bytes",
                IV_SIZE
            )));
        }
        if self.tag.len() != TAG_SIZE {
            return Err(VaultError::MalformedEnvelope(format!(
                "tag must be {} bytes",
                TAG_SIZE
            )));
        }
        Ok(())
    }

    /// Compact serialization.
    pub fn to_compact(&self) -> String {
        [
            self.encoded_header.clone(),
            URL_SAFE_NO_PAD.encode(&self.wrapped_key),
            URL_SAFE_NO_PAD.encode(&self.iv),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
            URL_SAFE_NO_PAD.encode(&self.tag),
        ]
        .join(".")
    }

    pub fn header(&self) -> &ProtectedHeader {
        &self.header
    }

    /// Seal `plaintext` under a key-encryption key derived from a passphrase.
    pub fn seal_key_wrapped<C: CryptoProvider + ?Sized>(
        crypto: &C,
        header: ProtectedHeader,
        kek: &[u8],
        plaintext: &[u8],
    ) -> VaultResult<Self> {
        if header.alg != KeyManagementAlgorithm::Pbes2Hs512A256Kw {
            return Err(VaultError::MalformedEnvelope(
                "key-wrapped envelope needs a PBES2 header".into(),
            ));
        }

        let content_key = Zeroizing::new(crypto.random_bytes(KEY_SIZE));
        let wrapped_key = crypto
            .wrap_key(kek, &content_key)
            .map_err(|_| VaultError::EncryptionFailed)?;

        Self::seal(crypto, header, wrapped_key, &content_key, plaintext)
    }

    /// Seal `plaintext` directly under `cek`.
    pub fn seal_direct<C: CryptoProvider + ?Sized>(
        crypto: &C,
        header: ProtectedHeader,
        cek: &[u8],
        plaintext: &[u8],
    ) -> VaultResult<Self> {
        if header.alg != KeyManagementAlgorithm::Direct {
            return Err(VaultError::MalformedEnvelope(
                "direct envelope needs a dir header".into(),
            ));
        }

        Self::seal(crypto, header, Vec::new(), cek, plaintext)
    }

    fn seal<C: CryptoProvider + ?Sized>(
        crypto: &C,
        header: ProtectedHeader,
        wrapped_key: Vec<u8>,
        content_key: &[u8],
        plaintext: &[u8],
    ) -> VaultResult<Self> {
        let encoded_header = header.encode()?;
        let iv = crypto.random_bytes(IV_SIZE);

        let mut sealed = crypto
            .aead_encrypt(content_key, &iv, encoded_header.as_bytes(), plaintext)
            .map_err(|_| VaultError::EncryptionFailed)?;
        if sealed.len() < TAG_SIZE {
            return Err(VaultError::EncryptionFailed);
        }
        let tag = sealed.split_off(sealed.len() - TAG_SIZE);

        Ok(Self {
            header,
            encoded_header,
            wrapped_key,
            iv,
            ciphertext: sealed,
            tag,
        })
    }

    /// Open a key-wrapped envelope with the passphrase-derived key.
    ///
    /// Any cryptographic failure (wrong key, flipped bit in the wrapped key,
    /// ciphertext, tag or header) is reported as `IncorrectPassphrase`.
    pub fn open_key_wrapped<C: CryptoProvider + ?Sized>(
        &self,
        crypto: &C,
        kek: &[u8],
    ) -> VaultResult<Zeroizing<Vec<u8>>> {
        if self.header.alg != KeyManagementAlgorithm::Pbes2Hs512A256Kw {
            return Err(VaultError::MalformedEnvelope(
                "expected a key-wrapped envelope".into(),
            ));
        }

        self.unwrap_and_open(crypto, kek)
            .map_err(|_| VaultError::IncorrectPassphrase)
    }

    fn unwrap_and_open<C: CryptoProvider + ?Sized>(
        &self,
        crypto: &C,
        kek: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let content_key = crypto.unwrap_key(kek, &self.wrapped_key)?;
        self.open(crypto, &content_key)
    }

    /// Open a direct envelope with the CEK.
    pub fn open_direct<C: CryptoProvider + ?Sized>(
        &self,
        crypto: &C,
        cek: &[u8],
    ) -> VaultResult<Zeroizing<Vec<u8>>> {
        if self.header.alg != KeyManagementAlgorithm::Direct {
            return Err(VaultError::MalformedEnvelope(
                "expected a direct envelope".into(),
            ));
        }

        self.open(crypto, cek)
            .map_err(|_| VaultError::MalformedEnvelope("envelope failed authentication".into()))
    }

    fn open<C: CryptoProvider + ?Sized>(
        &self,
        crypto: &C,
        content_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        let mut sealed = Vec::with_capacity(self.ciphertext.len() + self.tag.len());
        sealed.extend_from_slice(&self.ciphertext);
        sealed.extend_from_slice(&self.tag);

        crypto.aead_decrypt(content_key, &self.iv, self.encoded_header.as_bytes(), &sealed)
    }
}
