mod crypto;
mod hd;
mod identity;

pub use crypto::{
    CryptoError, CryptoProvider, CryptoResult, HashAlgorithm, RustCryptoProvider, IV_SIZE,
    KEY_SIZE, TAG_SIZE,
};
pub use hd::{
    DerivedKeys, HdError, HdKey, RecoveryPhrase, IDENTITY_EPOCH, IDENTITY_KEY_PATH,
    SIGNING_KEY_PATH, VAULT_KEY_PATH,
};
pub use identity::{
    did_key_for_ed25519, DidDocument, DidKeyProvisioner, Identity, IdentityProvisioner, Jwk,
    KeyPurpose, PortableIdentity, PredefinedKeys, ProvisionError, VerificationMethod,
};
