//! AES-256-GCM field cipher and data-key providers.
//!
//! Sealed values are `enc:` followed by the hex encoding of
//! `nonce || ciphertext || tag`.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use budget_core::error::DomainError;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Prefix marking a sealed value.
pub const SEALED_PREFIX: &str = "enc:";

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;
const DERIVATION_CONTEXT: &[u8] = b"budget-event-data-key:v1";

/// Failures of the field cipher.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The value does not carry the sealed prefix.
    #[error("value is not sealed")]
    NotSealed,
    /// The hex body could not be decoded.
    #[error("invalid ciphertext encoding: {0}")]
    Encoding(#[from] hex::FromHexError),
    /// The ciphertext is shorter than a nonce.
    #[error("ciphertext truncated")]
    Truncated,
    /// Authentication failed: wrong key or tampered data.
    #[error("ciphertext authentication failed")]
    Authentication,
    /// Encryption itself failed.
    #[error("encryption failed")]
    Encryption,
}

/// A 256-bit data key.
#[derive(Clone, PartialEq, Eq)]
pub struct DataKey([u8; KEY_LEN]);

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey(..)")
    }
}

impl DataKey {
    /// Wraps raw key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a hex-encoded 32-byte key.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the input is not 64 hex digits.
    pub fn from_hex(encoded: &str) -> Result<Self, DomainError> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| DomainError::Validation(format!("encryption key is not hex: {e}")))?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            DomainError::Validation(format!("encryption key must be {KEY_LEN} bytes"))
        })?;
        Ok(Self(bytes))
    }

    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(key.as_slice());
        Self(bytes)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

/// Returns `true` if `value` looks like output of [`seal`].
#[must_use]
pub fn is_sealed(value: &str) -> bool {
    value.starts_with(SEALED_PREFIX)
}

/// Encrypts `plaintext` under `key` with a random nonce.
///
/// # Errors
///
/// Returns `CipherError::Encryption` if the AEAD rejects the input.
pub fn seal(key: &DataKey, plaintext: &[u8]) -> Result<String, CipherError> {
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = key
        .cipher()
        .encrypt(&nonce, plaintext)
        .map_err(|_| CipherError::Encryption)?;
    let mut body = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    body.extend_from_slice(nonce.as_slice());
    body.extend_from_slice(&ciphertext);
    Ok(format!("{SEALED_PREFIX}{}", hex::encode(body)))
}

/// Decrypts a value produced by [`seal`].
///
/// # Errors
///
/// Returns a `CipherError` if the value is malformed or fails authentication.
pub fn open(key: &DataKey, sealed: &str) -> Result<Vec<u8>, CipherError> {
    let encoded = sealed
        .strip_prefix(SEALED_PREFIX)
        .ok_or(CipherError::NotSealed)?;
    let body = hex::decode(encoded)?;
    if body.len() < NONCE_LEN {
        return Err(CipherError::Truncated);
    }
    let (nonce, ciphertext) = body.split_at(NONCE_LEN);
    key.cipher()
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::Authentication)
}

/// Supplies the data key of an owner (usually a user).
pub trait KeyProvider: Send + Sync {
    /// Returns the owner's key, or `None` if it does not exist (never
    /// created, or revoked).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the key source is unavailable.
    fn key_for(&self, owner: Uuid) -> Result<Option<DataKey>, DomainError>;

    /// Returns the owner's key, creating it if the provider supports it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if no key can be produced.
    fn ensure_key(&self, owner: Uuid) -> Result<DataKey, DomainError>;
}

/// Derives per-owner keys from a master secret with SHA-256.
#[derive(Debug, Clone)]
pub struct DerivedKeyProvider {
    master: DataKey,
}

impl DerivedKeyProvider {
    /// Creates a provider over `master`.
    #[must_use]
    pub fn new(master: DataKey) -> Self {
        Self { master }
    }

    fn derive(&self, owner: Uuid) -> DataKey {
        let mut hasher = Sha256::new();
        hasher.update(DERIVATION_CONTEXT);
        hasher.update(self.master.0);
        hasher.update(owner.as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&digest);
        DataKey(bytes)
    }
}

impl KeyProvider for DerivedKeyProvider {
    fn key_for(&self, owner: Uuid) -> Result<Option<DataKey>, DomainError> {
        Ok(Some(self.derive(owner)))
    }

    fn ensure_key(&self, owner: Uuid) -> Result<DataKey, DomainError> {
        Ok(self.derive(owner))
    }
}

/// Random per-owner keys held in memory. Revoking a key makes every value
/// sealed with it unreadable.
#[derive(Debug, Default)]
pub struct InMemoryKeyRing {
    keys: RwLock<HashMap<Uuid, DataKey>>,
}

impl InMemoryKeyRing {
    /// Creates an empty key ring.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the owner's key. Returns `true` if a key was removed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn revoke(&self, owner: Uuid) -> Result<bool, DomainError> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| DomainError::Infrastructure("key ring lock poisoned".into()))?;
        Ok(keys.remove(&owner).is_some())
    }
}

impl KeyProvider for InMemoryKeyRing {
    fn key_for(&self, owner: Uuid) -> Result<Option<DataKey>, DomainError> {
        let keys = self
            .keys
            .read()
            .map_err(|_| DomainError::Infrastructure("key ring lock poisoned".into()))?;
        Ok(keys.get(&owner).cloned())
    }

    fn ensure_key(&self, owner: Uuid) -> Result<DataKey, DomainError> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| DomainError::Infrastructure("key ring lock poisoned".into()))?;
        Ok(keys.entry(owner).or_insert_with(DataKey::generate).clone())
    }
}
