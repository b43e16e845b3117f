//! Cryptographic primitives behind a provider trait.
//!
//! The vault never calls a cipher directly. It receives a [`CryptoProvider`]
//! at construction, which keeps the primitive choice swappable and lets tests
//! inject their own implementation.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use aes_kw::KekAes256;
use hkdf::Hkdf;
use rand::RngCore;
use sha2::{Sha256, Sha512};
use thiserror::Error;
use zeroize::Zeroizing;

/// AES-GCM nonce size (96 bits)
pub const IV_SIZE: usize = 12;

/// AES-GCM authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// AES-256 key size
pub const KEY_SIZE: usize = 32;

/// AES key-wrap adds one 64-bit integrity block
pub const KEY_WRAP_OVERHEAD: usize = 8;

/// Low-level crypto failures. These stay inside the crate; the vault maps
/// them onto its own error kinds before anything reaches a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length")]
    InvalidKeyLength,

    #[error("invalid output length")]
    InvalidOutputLength,

    #[error("invalid nonce length")]
    InvalidNonceLength,

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("key unwrap integrity check failed")]
    UnwrapFailed,

    #[error("encryption failed")]
    EncryptionFailed,
}

pub type CryptoResult<T> = std::result::Result<T, CryptoError>;

/// Hash functions usable with the KDFs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

/// Primitives the vault depends on.
pub trait CryptoProvider {
    /// HKDF extract-and-expand.
    fn derive_key_bytes(
        &self,
        hash: HashAlgorithm,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
        len: usize,
    ) -> CryptoResult<Zeroizing<Vec<u8>>>;

    /// PBKDF2 with HMAC over `hash`.
    fn pbkdf2(
        &self,
        hash: HashAlgorithm,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        len: usize,
    ) -> CryptoResult<Zeroizing<Vec<u8>>>;

    /// AES-256-GCM. Returns `ciphertext || tag`.
    fn aead_encrypt(&self, key: &[u8], iv: &[u8], aad: &[u8], plaintext: &[u8])
        -> CryptoResult<Vec<u8>>;

    /// AES-256-GCM. `ciphertext` must include the trailing tag.
    fn aead_decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> CryptoResult<Zeroizing<Vec<u8>>>;

    /// AES-256-KW (RFC 3394).
    fn wrap_key(&self, kek: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>>;

    /// Inverse of [`wrap_key`](Self::wrap_key).
    fn unwrap_key(&self, kek: &[u8], wrapped: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>>;

    /// Cryptographically secure random bytes.
    fn random_bytes(&self, len: usize) -> Vec<u8>;
}

/// [`CryptoProvider`] backed by the RustCrypto crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    fn derive_key_bytes(
        &self,
        hash: HashAlgorithm,
        ikm: &[u8],
        salt: &[u8],
        info: &[u8],
        len: usize,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let salt = if salt.is_empty() { None } else { Some(salt) };
        let mut okm = Zeroizing::new(vec![0u8; len]);

        match hash {
            HashAlgorithm::Sha256 => Hkdf::<Sha256>::new(salt, ikm)
                .expand(info, &mut okm)
                .map_err(|_| CryptoError::InvalidOutputLength)?,
            HashAlgorithm::Sha512 => Hkdf::<Sha512>::new(salt, ikm)
                .expand(info, &mut okm)
                .map_err(|_| CryptoError::InvalidOutputLength)?,
        }

        Ok(okm)
    }

    fn pbkdf2(
        &self,
        hash: HashAlgorithm,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        len: usize,
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if len == 0 {
            return Err(CryptoError::InvalidOutputLength);
        }

        let mut out = Zeroizing::new(vec![0u8; len]);
        match hash {
            HashAlgorithm::Sha256 => pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out),
            HashAlgorithm::Sha512 => pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, iterations, &mut out),
        }
        Ok(out)
    }

    fn aead_encrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        if iv.len() != IV_SIZE {
            return Err(CryptoError::InvalidNonceLength);
        }

        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
        cipher
            .encrypt(Nonce::from_slice(iv), Payload { msg: plaintext, aad })
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    fn aead_decrypt(
        &self,
        key: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if iv.len() != IV_SIZE {
            return Err(CryptoError::InvalidNonceLength);
        }

        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength)?;
        cipher
            .decrypt(Nonce::from_slice(iv), Payload { msg: ciphertext, aad })
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    fn wrap_key(&self, kek: &[u8], key: &[u8]) -> CryptoResult<Vec<u8>> {
        let kek = KekAes256::try_from(kek).map_err(|_| CryptoError::InvalidKeyLength)?;

        let mut wrapped = vec![0u8; key.len() + KEY_WRAP_OVERHEAD];
        kek.wrap(key, &mut wrapped)
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        Ok(wrapped)
    }

    fn unwrap_key(&self, kek: &[u8], wrapped: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        if wrapped.len() < KEY_WRAP_OVERHEAD * 3 {
            return Err(CryptoError::InvalidKeyLength);
        }

        let kek = KekAes256::try_from(kek).map_err(|_| CryptoError::InvalidKeyLength)?;

        let mut key = Zeroizing::new(vec![0u8; wrapped.len() - KEY_WRAP_OVERHEAD]);
        kek.unwrap(wrapped, &mut key)
            .map_err(|_| CryptoError::UnwrapFailed)?;
        Ok(key)
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        rand::rng().fill_bytes(&mut bytes);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hkdf_deterministic_and_domain_separated() {
        let crypto = RustCryptoProvider;
        let ikm = [7u8; 32];

        let a = crypto
            .derive_key_bytes(HashAlgorithm::Sha512, &ikm, &[], b"vault_cek", 32)
            .unwrap();
        let b = crypto
            .derive_key_bytes(HashAlgorithm::Sha512, &ikm, &[], b"vault_cek", 32)
            .unwrap();
        let c = crypto
            .derive_key_bytes(HashAlgorithm::Sha512, &ikm, &[], b"vault_unlock_salt", 32)
            .unwrap();

        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_hkdf_rejects_oversized_output() {
        let crypto = RustCryptoProvider;
        // HKDF-SHA256 caps output at 255 * 32 bytes
        let result = crypto.derive_key_bytes(HashAlgorithm::Sha256, &[1u8; 32], &[], b"x", 255 * 32 + 1);
        assert_eq!(result.unwrap_err(), CryptoError::InvalidOutputLength);
    }

    #[test]
    fn test_pbkdf2_depends_on_password_and_salt() {
        let crypto = RustCryptoProvider;
        let k1 = crypto.pbkdf2(HashAlgorithm::Sha512, b"pass", b"salt", 10, 32).unwrap();
        let k2 = crypto.pbkdf2(HashAlgorithm::Sha512, b"pass", b"salt", 10, 32).unwrap();
        let k3 = crypto.pbkdf2(HashAlgorithm::Sha512, b"other", b"salt", 10, 32).unwrap();
        let k4 = crypto.pbkdf2(HashAlgorithm::Sha512, b"pass", b"pepper", 10, 32).unwrap();

        assert_eq!(*k1, *k2);
        assert_ne!(*k1, *k3);
        assert_ne!(*k1, *k4);
    }

    #[test]
    fn test_aead_binds_aad() {
        let crypto = RustCryptoProvider;
        let key = crypto.random_bytes(KEY_SIZE);
        let iv = crypto.random_bytes(IV_SIZE);

        let sealed = crypto.aead_encrypt(&key, &iv, b"header", b"payload").unwrap();
        assert_eq!(sealed.len(), b"payload".len() + TAG_SIZE);

        let opened = crypto.aead_decrypt(&key, &iv, b"header", &sealed).unwrap();
        assert_eq!(opened.as_slice(), b"payload");

        let err = crypto.aead_decrypt(&key, &iv, b"headex", &sealed).unwrap_err();
        assert_eq!(err, CryptoError::AuthenticationFailed);
    }

    #[test]
    fn test_aead_rejects_bad_lengths() {
        let crypto = RustCryptoProvider;
        assert_eq!(
            crypto.aead_encrypt(&[0u8; 16], &[0u8; IV_SIZE], b"", b"x").unwrap_err(),
            CryptoError::InvalidKeyLength
        );
        assert_eq!(
            crypto.aead_encrypt(&[0u8; 32], &[0u8; 8], b"", b"x").unwrap_err(),
            CryptoError::InvalidNonceLength
        );
    }

    #[test]
    fn test_key_wrap_with_wrong_kek_fails() {
        let crypto = RustCryptoProvider;
        let kek = [1u8; 32];
        let key = [9u8; 32];

        let wrapped = crypto.wrap_key(&kek, &key).unwrap();
        assert_eq!(wrapped.len(), 40);
        assert_eq!(crypto.unwrap_key(&kek, &wrapped).unwrap().as_slice(), &key);

        let err = crypto.unwrap_key(&[2u8; 32], &wrapped).unwrap_err();
        assert_eq!(err, CryptoError::UnwrapFailed);
    }

    #[test]
    fn test_random_bytes_are_not_constant() {
        let crypto = RustCryptoProvider;
        let a = crypto.random_bytes(32);
        let b = crypto.random_bytes(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }
}
