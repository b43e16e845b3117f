//! Key derivation for the vault.
//!
//! From the HD vault key pair:
//! - `CEK        = HKDF-SHA512(ikm = vault private key, info = "vault_cek")`
//! - `saltInput  = HKDF-SHA512(ikm = vault public key,  info = "vault_unlock_salt")`
//!
//! Both use an empty salt since the input keying material is already
//! high-entropy. The unlock key is
//! `VUK = PBKDF2-SHA512(passphrase, UTF8(alg) || 0x00 || saltInput, p2c)`.

use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::envelope::{KeyManagementAlgorithm, ProtectedHeader};
use super::error::{VaultError, VaultResult};
use crate::security::{CryptoProvider, HashAlgorithm, KEY_SIZE};

pub const CEK_INFO: &[u8] = b"vault_cek";
pub const UNLOCK_SALT_INFO: &[u8] = b"vault_unlock_salt";

/// 256-bit content encryption key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ContentEncryptionKey {
    key: [u8; KEY_SIZE],
}

impl ContentEncryptionKey {
    pub fn from_slice(slice: &[u8]) -> VaultResult<Self> {
        let key: [u8; KEY_SIZE] = slice.try_into().map_err(|_| {
            VaultError::MalformedEnvelope(format!(
                "content encryption key must be {} bytes",
                KEY_SIZE
            ))
        })?;
        Ok(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for ContentEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never log the actual key material
        f.debug_struct("ContentEncryptionKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive the CEK from the vault private key.
pub fn derive_content_encryption_key<C: CryptoProvider + ?Sized>(
    crypto: &C,
    vault_private_key: &[u8],
) -> VaultResult<ContentEncryptionKey> {
    let bytes = crypto
        .derive_key_bytes(HashAlgorithm::Sha512, vault_private_key, &[], CEK_INFO, KEY_SIZE)
        .map_err(|_| VaultError::EncryptionFailed)?;
    ContentEncryptionKey::from_slice(&bytes)
}

/// Derive the non-secret salt input (`p2s`) from the vault public key.
pub fn derive_salt_input<C: CryptoProvider + ?Sized>(
    crypto: &C,
    vault_public_key: &[u8],
) -> VaultResult<Vec<u8>> {
    let bytes = crypto
        .derive_key_bytes(
            HashAlgorithm::Sha512,
            vault_public_key,
            &[],
            UNLOCK_SALT_INFO,
            KEY_SIZE,
        )
        .map_err(|_| VaultError::EncryptionFailed)?;
    Ok(bytes.to_vec())
}

/// `UTF8(alg) || 0x00 || saltInput`. Binding the algorithm id into the salt
/// keeps precomputed tables for one algorithm useless for another.
pub fn pbes2_salt(alg: KeyManagementAlgorithm, salt_input: &[u8]) -> Vec<u8> {
    let alg = alg.as_str().as_bytes();
    let mut salt = Vec::with_capacity(alg.len() + 1 + salt_input.len());
    salt.extend_from_slice(alg);
    salt.push(0x00);
    salt.extend_from_slice(salt_input);
    salt
}

/// Derive the vault unlock key for a key-wrapping header.
///
/// Uses the header's own `p2c`/`p2s`, so envelopes sealed with an older work
/// factor keep opening after the configured default changes.
pub fn derive_unlock_key<C: CryptoProvider + ?Sized>(
    crypto: &C,
    passphrase: &str,
    header: &ProtectedHeader,
) -> VaultResult<Zeroizing<Vec<u8>>> {
    let iterations = header.work_factor()?;
    let salt = pbes2_salt(header.alg, &header.salt_input()?);

    let key = crypto
        .pbkdf2(
            HashAlgorithm::Sha512,
            passphrase.as_bytes(),
            &salt,
            iterations,
            KEY_SIZE,
        )
        .map_err(|_| VaultError::EncryptionFailed)?;

    debug!("Derived {}-byte unlock key ({} iterations)", key.len(), iterations);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::RustCryptoProvider;

    #[test]
    fn test_cek_and_salt_are_deterministic() {
        let crypto = RustCryptoProvider;
        let a = derive_content_encryption_key(&crypto, &[3u8; 32]).unwrap();
        let b = derive_content_encryption_key(&crypto, &[3u8; 32]).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());

        let s1 = derive_salt_input(&crypto, &[4u8; 32]).unwrap();
        let s2 = derive_salt_input(&crypto, &[4u8; 32]).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.len(), 32);
    }

    #[test]
    fn test_cek_and_salt_are_domain_separated() {
        let crypto = RustCryptoProvider;
        let ikm = [9u8; 32];
        let cek = derive_content_encryption_key(&crypto, &ikm).unwrap();
        let salt = derive_salt_input(&crypto, &ikm).unwrap();
        assert_ne!(cek.as_bytes().as_slice(), salt.as_slice());
    }

    #[test]
    fn test_pbes2_salt_layout() {
        let salt = pbes2_salt(KeyManagementAlgorithm::Pbes2Hs512A256Kw, &[0xAA, 0xBB]);
        let mut expected = b"PBES2-HS512+A256KW".to_vec();
        expected.push(0);
        expected.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(salt, expected);
    }

    #[test]
    fn test_unlock_key_depends_on_passphrase_and_header() {
        let crypto = RustCryptoProvider;
        let header = ProtectedHeader::key_wrapping(1_000, &[1u8; 32]);

        let k1 = derive_unlock_key(&crypto, "correct horse", &header).unwrap();
        let k2 = derive_unlock_key(&crypto, "correct horse", &header).unwrap();
        let k3 = derive_unlock_key(&crypto, "wrong horse", &header).unwrap();
        assert_eq!(*k1, *k2);
        assert_ne!(*k1, *k3);

        let other = ProtectedHeader::key_wrapping(1_001, &[1u8; 32]);
        let k4 = derive_unlock_key(&crypto, "correct horse", &other).unwrap();
        assert_ne!(*k1, *k4);
    }

    #[test]
    fn test_unlock_key_needs_kdf_params() {
        let crypto = RustCryptoProvider;
        let header = ProtectedHeader::direct("json");
        assert!(matches!(
            derive_unlock_key(&crypto, "pass", &header),
            Err(VaultError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_cek_from_slice_rejects_wrong_length() {
        assert!(ContentEncryptionKey::from_slice(&[0u8; 31]).is_err());
        assert!(ContentEncryptionKey::from_slice(&[0u8; 32]).is_ok());
    }

    #[test]
    fn test_cek_debug_redacted() {
        let cek = ContentEncryptionKey::from_slice(&[0x42; 32]).unwrap();
        assert_eq!(
            format!("{:?}", cek),
            "ContentEncryptionKey { key: \"[REDACTED]\" }"
        );
    }
}
