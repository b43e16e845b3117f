//! Recovery phrase handling and hierarchical-deterministic key derivation.
//!
//! ```text
//! BIP-39 recovery phrase (12 or 24 words)
//!         │
//!         ▼
//! Mnemonic::to_seed("")  → [u8; 64]
//!         │
//!         ▼
//! SLIP-0010 Ed25519 master key (HMAC-SHA512, key "ed25519 seed")
//!         │
//!         ├─► m/44'/0'/0'/0'/0'            → vault key
//!         ├─► m/44'/0'/1708523827'/0'/0'   → identity key
//!         └─► m/44'/0'/1708523827'/0'/1'   → signing key
//! ```
//!
//! Ed25519 only supports hardened derivation, so every path segment is
//! hardened. The same phrase always yields byte-identical keys.

use bip39::{Language, Mnemonic};
use ed25519_dalek::SigningKey;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha512;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Fixed account index for identity keys. Keeping it constant lets later
/// protocol versions re-derive the same identity from the same phrase.
pub const IDENTITY_EPOCH: u32 = 1_708_523_827;

pub const VAULT_KEY_PATH: &str = "m/44'/0'/0'/0'/0'";
pub const IDENTITY_KEY_PATH: &str = "m/44'/0'/1708523827'/0'/0'";
pub const SIGNING_KEY_PATH: &str = "m/44'/0'/1708523827'/0'/1'";

const ED25519_CURVE_KEY: &[u8] = b"ed25519 seed";
const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Entropy for a generated 12-word phrase
const GENERATED_ENTROPY_BYTES: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HdError {
    #[error("Invalid recovery phrase: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid derivation path: {0}")]
    InvalidPath(String),

    #[error("HD key derivation failed")]
    Derivation,
}

/// A validated BIP-39 recovery phrase.
pub struct RecoveryPhrase {
    mnemonic: Mnemonic,
}

impl RecoveryPhrase {
    /// Parse and validate a phrase (word list and checksum).
    ///
    /// Extra whitespace and letter case are normalized first.
    pub fn parse(phrase: &str) -> Result<Self, HdError> {
        let normalized = Zeroizing::new(
            phrase
                .split_whitespace()
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(" "),
        );

        let mnemonic = Mnemonic::parse_in(Language::English, normalized.as_str())
            .map_err(|e| HdError::InvalidMnemonic(e.to_string()))?;
        Ok(Self { mnemonic })
    }

    /// Generate a fresh 12-word phrase from OS randomness.
    pub fn generate() -> Result<Self, HdError> {
        let mut entropy = Zeroizing::new([0u8; GENERATED_ENTROPY_BYTES]);
        rand::rng().fill_bytes(&mut entropy[..]);

        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy[..])
            .map_err(|e| HdError::InvalidMnemonic(e.to_string()))?;
        Ok(Self { mnemonic })
    }

    /// The space-separated phrase.
    pub fn phrase(&self) -> Zeroizing<String> {
        Zeroizing::new(self.mnemonic.to_string())
    }

    pub fn word_count(&self) -> usize {
        self.mnemonic.word_count()
    }

    /// BIP-39 seed with an empty passphrase.
    pub fn to_seed(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.mnemonic.to_seed(""))
    }
}

impl std::fmt::Debug for RecoveryPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryPhrase")
            .field("words", &self.word_count())
            .finish()
    }
}

/// SLIP-0010 extended private key (Ed25519).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct HdKey {
    private_key: [u8; 32],
    chain_code: [u8; 32],
}

impl HdKey {
    /// Master key from a BIP-39 seed.
    pub fn from_master_seed(seed: &[u8]) -> Result<Self, HdError> {
        Self::from_hmac(ED25519_CURVE_KEY, seed)
    }

    /// Derive a descendant along `path` (e.g. `m/44'/0'/0'`).
    pub fn derive(&self, path: &str) -> Result<Self, HdError> {
        let mut segments = path.split('/');
        if segments.next() != Some("m") {
            return Err(HdError::InvalidPath(path.to_string()));
        }

        let mut key = self.clone();
        for segment in segments {
            let index = parse_hardened_index(segment)
                .ok_or_else(|| HdError::InvalidPath(path.to_string()))?;
            key = key.derive_child(index)?;
        }
        Ok(key)
    }

    fn derive_child(&self, index: u32) -> Result<Self, HdError> {
        let mut data = Zeroizing::new(Vec::with_capacity(1 + 32 + 4));
        data.push(0u8);
        data.extend_from_slice(&self.private_key);
        data.extend_from_slice(&(index | HARDENED_OFFSET).to_be_bytes());
        Self::from_hmac(&self.chain_code, &data)
    }

    fn from_hmac(key: &[u8], data: &[u8]) -> Result<Self, HdError> {
        let mut mac =
            <Hmac<Sha512> as Mac>::new_from_slice(key).map_err(|_| HdError::Derivation)?;
        mac.update(data);

        let mut output = [0u8; 64];
        output.copy_from_slice(&mac.finalize().into_bytes());

        let mut private_key = [0u8; 32];
        let mut chain_code = [0u8; 32];
        private_key.copy_from_slice(&output[..32]);
        chain_code.copy_from_slice(&output[32..]);
        output.zeroize();

        Ok(Self {
            private_key,
            chain_code,
        })
    }

    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key().verifying_key().to_bytes()
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.private_key)
    }
}

impl std::fmt::Debug for HdKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HdKey")
            .field("private_key", &"[REDACTED]")
            .field("public_key", &bs58::encode(self.public_key()).into_string())
            .finish()
    }
}

fn parse_hardened_index(segment: &str) -> Option<u32> {
    let digits = segment.strip_suffix('\'').or_else(|| segment.strip_suffix('h'))?;
    let index: u32 = digits.parse().ok()?;
    (index < HARDENED_OFFSET).then_some(index)
}

/// The three keys the vault derives from one recovery phrase.
#[derive(Debug, Clone)]
pub struct DerivedKeys {
    pub vault: HdKey,
    pub identity: HdKey,
    pub signing: HdKey,
}

impl DerivedKeys {
    pub fn from_phrase(phrase: &RecoveryPhrase) -> Result<Self, HdError> {
        let seed = phrase.to_seed();
        let root = HdKey::from_master_seed(&seed[..])?;

        Ok(Self {
            vault: root.derive(VAULT_KEY_PATH)?,
            identity: root.derive(IDENTITY_KEY_PATH)?,
            signing: root.derive(SIGNING_KEY_PATH)?,
        })
    }
}
