//! Ed25519 proposer keys: signing, verification, and key lifecycle.
//!
//! The ledger has a single trusted proposer. `KeyManager` owns that
//! proposer's signing key and is the only place private key material lives.
//! Everything else works with the exported `PublicKey`.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;
use thiserror::Error;

/// Errors raised by key lifecycle and signature operations.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("no signing key has been generated")]
    NoKey,

    #[error("signature verification failed")]
    VerificationFailed,

    #[error("invalid public key bytes")]
    InvalidPublicKey,
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serde::Serialize::serialize(self.0.as_slice(), serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        if bytes.len() != 64 {
            return Err(serde::de::Error::custom("signature must be 64 bytes"));
        }
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Signature(arr))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// The proposer's public verification key.
#[derive(Clone, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "public_key_serde")] pub VerifyingKey);

mod public_key_serde {
    use ed25519_dalek::VerifyingKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(key: &VerifyingKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        key.to_bytes().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<VerifyingKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = <[u8; 32]>::deserialize(deserializer)?;
        VerifyingKey::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl PublicKey {
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, KeyError> {
        VerifyingKey::from_bytes(bytes)
            .map(PublicKey)
            .map_err(|_| KeyError::InvalidPublicKey)
    }

    /// Verify a signature over `message` against this key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), KeyError> {
        let sig = DalekSignature::from_bytes(&signature.0);
        self.0
            .verify(message, &sig)
            .map_err(|_| KeyError::VerificationFailed)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0.as_bytes()[..8]))
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes() == other.0.as_bytes()
    }
}

impl Eq for PublicKey {}

/// Owner of the proposer's signing key.
///
/// The signing key never leaves this struct except through
/// [`KeyManager::export_private_key`]. `Debug` shows only the public half,
/// and no method puts key bytes into an error or a log line.
pub struct KeyManager {
    // RwLock rather than Mutex: signing reads the key, only rotation writes.
    signing_key: RwLock<Option<SigningKey>>,
}

impl KeyManager {
    /// Create a manager with no active key. Signing fails until
    /// [`KeyManager::generate`] is called.
    pub fn new() -> Self {
        Self {
            signing_key: RwLock::new(None),
        }
    }

    /// Create a manager with a freshly generated key.
    pub fn generated() -> Result<Self, KeyError> {
        let manager = Self::new();
        manager.generate()?;
        Ok(manager)
    }

    /// Generate a fresh Ed25519 key pair and make it the active key.
    ///
    /// Calling this again rotates the key: blocks signed under the previous
    /// key no longer verify against [`KeyManager::public_key`] unless the
    /// caller retained the old public key.
    pub fn generate(&self) -> Result<PublicKey, KeyError> {
        let mut seed = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut seed)
            .map_err(|e| KeyError::Generation(e.to_string()))?;
        let signing_key = SigningKey::from_bytes(&seed);
        let public = PublicKey(signing_key.verifying_key());
        *self.signing_key.write().expect("key lock poisoned") = Some(signing_key);
        Ok(public)
    }

    /// The current public verification key.
    pub fn public_key(&self) -> Result<PublicKey, KeyError> {
        self.signing_key
            .read()
            .expect("key lock poisoned")
            .as_ref()
            .map(|k| PublicKey(k.verifying_key()))
            .ok_or(KeyError::NoKey)
    }

    /// Sign arbitrary bytes with the active key.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, KeyError> {
        let guard = self.signing_key.read().expect("key lock poisoned");
        let key = guard.as_ref().ok_or(KeyError::NoKey)?;
        Ok(Signature(key.sign(message).to_bytes()))
    }

    /// Export the raw private key bytes.
    ///
    /// DANGER: this materializes the secret half of the key pair. It exists
    /// only as an operator escape hatch for out-of-band backup before a
    /// planned rotation. Nothing in the ledger engine calls it, and nothing
    /// should: whoever holds these 32 bytes can forge blocks.
    pub fn export_private_key(&self) -> Result<[u8; 32], KeyError> {
        self.signing_key
            .read()
            .expect("key lock poisoned")
            .as_ref()
            .map(|k| k.to_bytes())
            .ok_or(KeyError::NoKey)
    }
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the signing key.
        match self.public_key() {
            Ok(pk) => f.debug_struct("KeyManager").field("public_key", &pk).finish(),
            Err(_) => f.debug_struct("KeyManager").field("public_key", &"<none>").finish(),
        }
    }
}
