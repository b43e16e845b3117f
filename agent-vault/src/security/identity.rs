//! Agent identity (DID) provisioning.
//!
//! The vault hands pre-derived HD keys to an [`IdentityProvisioner`], which
//! builds the DID and its document. The identity only ever reaches storage in
//! its portable form, encrypted under the vault's content encryption key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bs58::Alphabet;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Multicodec prefix for an Ed25519 public key
const ED25519_MULTICODEC: [u8; 2] = [0xED, 0x01];

const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
const IDENTITY_KEY_FRAGMENT: &str = "0";
const SIGNING_KEY_FRAGMENT: &str = "sig";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Invalid DID document: {0}")]
    InvalidDocument(String),

    #[error("Private key does not match document: {0}")]
    KeyMismatch(String),
}

/// Keys derived by the vault before the identity is built.
pub struct PredefinedKeys {
    pub identity: SigningKey,
    pub signing: SigningKey,
}

/// Verification relationships a key can be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyPurpose {
    Authentication,
    AssertionMethod,
}

/// Ed25519 key as an OKP JSON Web Key.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

impl Jwk {
    fn public(key: &VerifyingKey) -> Self {
        Self {
            kty: "OKP".into(),
            crv: "Ed25519".into(),
            x: URL_SAFE_NO_PAD.encode(key.as_bytes()),
            d: None,
            kid: None,
        }
    }

    fn private(key: &SigningKey, kid: &str) -> Self {
        Self {
            d: Some(URL_SAFE_NO_PAD.encode(key.to_bytes())),
            kid: Some(kid.to_string()),
            ..Self::public(&key.verifying_key())
        }
    }

    fn to_signing_key(&self) -> Result<SigningKey, ProvisionError> {
        if self.kty != "OKP" || self.crv != "Ed25519" {
            return Err(ProvisionError::InvalidDocument(format!(
                "unsupported key type {}/{}",
                self.kty, self.crv
            )));
        }

        let d = self
            .d
            .as_deref()
            .ok_or_else(|| ProvisionError::InvalidDocument("missing private key".into()))?;
        let bytes = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(d)
                .map_err(|_| ProvisionError::InvalidDocument("private key is not base64url".into()))?,
        );
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ProvisionError::InvalidDocument("private key must be 32 bytes".into()))?;

        let key = SigningKey::from_bytes(&seed);
        if URL_SAFE_NO_PAD.encode(key.verifying_key().as_bytes()) != self.x {
            return Err(ProvisionError::KeyMismatch(
                self.kid.clone().unwrap_or_default(),
            ));
        }
        Ok(key)
    }
}

impl std::fmt::Debug for Jwk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jwk")
            .field("kty", &self.kty)
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("d", &self.d.as_ref().map(|_| "[REDACTED]"))
            .field("kid", &self.kid)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub controller: String,
    pub public_key_jwk: Jwk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    pub verification_method: Vec<VerificationMethod>,
    #[serde(default)]
    pub authentication: Vec<String>,
    #[serde(default)]
    pub assertion_method: Vec<String>,
}

impl DidDocument {
    /// Method ids usable for the given purpose.
    pub fn methods_for(&self, purpose: KeyPurpose) -> &[String] {
        match purpose {
            KeyPurpose::Authentication => &self.authentication,
            KeyPurpose::AssertionMethod => &self.assertion_method,
        }
    }

    fn method(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method.iter().find(|m| m.id == id)
    }
}

/// Exportable identity: DID URI, document and private keys.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableIdentity {
    pub uri: String,
    pub document: DidDocument,
    pub private_keys: Vec<Jwk>,
}

impl std::fmt::Debug for PortableIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortableIdentity")
            .field("uri", &self.uri)
            .field("private_keys", &self.private_keys.len())
            .finish()
    }
}

/// Live identity with usable signing keys.
#[derive(Clone)]
pub struct Identity {
    uri: String,
    document: DidDocument,
    identity_key: SigningKey,
    signing_key: SigningKey,
}

impl Identity {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn document(&self) -> &DidDocument {
        &self.document
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign with the `#sig` assertion key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
            && self.document == other.document
            && self.identity_key.to_bytes() == other.identity_key.to_bytes()
            && self.signing_key.to_bytes() == other.signing_key.to_bytes()
    }
}

impl Eq for Identity {}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("uri", &self.uri)
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

/// Builds identities from pre-derived keys and converts them to and from
/// their portable form.
pub trait IdentityProvisioner {
    fn create_identity(&self, keys: PredefinedKeys) -> Result<Identity, ProvisionError>;

    fn export(&self, identity: &Identity) -> Result<PortableIdentity, ProvisionError>;

    fn import(&self, portable: PortableIdentity) -> Result<Identity, ProvisionError>;
}

/// `did:key` provisioner. The identity key anchors the DID URI; the signing
/// key is published as `#sig` for authentication and assertions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DidKeyProvisioner;

impl IdentityProvisioner for DidKeyProvisioner {
    fn create_identity(&self, keys: PredefinedKeys) -> Result<Identity, ProvisionError> {
        let uri = did_key_for_ed25519(&keys.identity.verifying_key());
        let document = build_document(&uri, &keys.identity, &keys.signing);

        Ok(Identity {
            uri,
            document,
            identity_key: keys.identity,
            signing_key: keys.signing,
        })
    }

    fn export(&self, identity: &Identity) -> Result<PortableIdentity, ProvisionError> {
        Ok(PortableIdentity {
            uri: identity.uri.clone(),
            document: identity.document.clone(),
            private_keys: vec![
                Jwk::private(&identity.identity_key, &method_id(&identity.uri, IDENTITY_KEY_FRAGMENT)),
                Jwk::private(&identity.signing_key, &method_id(&identity.uri, SIGNING_KEY_FRAGMENT)),
            ],
        })
    }

    fn import(&self, portable: PortableIdentity) -> Result<Identity, ProvisionError> {
        if portable.document.id != portable.uri {
            return Err(ProvisionError::InvalidDocument(
                "document id does not match DID URI".into(),
            ));
        }

        let identity_id = method_id(&portable.uri, IDENTITY_KEY_FRAGMENT);
        let signing_id = method_id(&portable.uri, SIGNING_KEY_FRAGMENT);

        let identity_key = private_key_for(&portable, &identity_id)?;
        let signing_key = private_key_for(&portable, &signing_id)?;

        if did_key_for_ed25519(&identity_key.verifying_key()) != portable.uri {
            return Err(ProvisionError::KeyMismatch(identity_id));
        }

        Ok(Identity {
            uri: portable.uri,
            document: portable.document,
            identity_key,
            signing_key,
        })
    }
}

fn private_key_for(portable: &PortableIdentity, id: &str) -> Result<SigningKey, ProvisionError> {
    let method = portable
        .document
        .method(id)
        .ok_or_else(|| ProvisionError::InvalidDocument(format!("missing method {}", id)))?;

    let jwk = portable
        .private_keys
        .iter()
        .find(|k| k.kid.as_deref() == Some(id))
        .ok_or_else(|| ProvisionError::InvalidDocument(format!("missing private key {}", id)))?;

    if jwk.x != method.public_key_jwk.x {
        return Err(ProvisionError::KeyMismatch(id.to_string()));
    }
    jwk.to_signing_key()
}

fn build_document(uri: &str, identity: &SigningKey, signing: &SigningKey) -> DidDocument {
    let identity_id = method_id(uri, IDENTITY_KEY_FRAGMENT);
    let signing_id = method_id(uri, SIGNING_KEY_FRAGMENT);

    let method = |id: &str, key: &SigningKey| VerificationMethod {
        id: id.to_string(),
        method_type: "JsonWebKey".into(),
        controller: uri.to_string(),
        public_key_jwk: Jwk::public(&key.verifying_key()),
    };

    DidDocument {
        context: vec![DID_CONTEXT.to_string()],
        id: uri.to_string(),
        verification_method: vec![method(&identity_id, identity), method(&signing_id, signing)],
        authentication: vec![signing_id.clone()],
        assertion_method: vec![signing_id],
    }
}

fn method_id(uri: &str, fragment: &str) -> String {
    format!("{}#{}", uri, fragment)
}

/// `did:key` URI for an Ed25519 public key (multicodec + base58btc).
pub fn did_key_for_ed25519(key: &VerifyingKey) -> String {
    let mut bytes = [0u8; 34];
    bytes[..2].copy_from_slice(&ED25519_MULTICODEC);
    bytes[2..].copy_from_slice(key.as_bytes());
    let encoded = bs58::encode(bytes)
        .with_alphabet(Alphabet::BITCOIN)
        .into_string();
    format!("did:key:z{}", encoded)
}
