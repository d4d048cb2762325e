//! Scoped keys: permission documents encrypted under a master key.
//!
//! The document is serialized to JSON and sealed with AES-256-GCM using a key
//! derived from the master key with SHA-256. A fresh random nonce is drawn per
//! call, so the same document never produces the same token twice. The token
//! is `hex(nonce || ciphertext)`; the GCM tag makes any tampering fail
//! decryption instead of yielding altered permissions.

use crate::query::Filter;
use crate::Error;
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes.
const TAG_SIZE: usize = 16;

/// An operation a scoped key may allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

/// The permission document carried by a scoped key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopedKeyPermissions {
    pub allowed_operations: BTreeSet<Operation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<Filter>>,
    /// Any other restrictions, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScopedKeyPermissions {
    /// Permissions allowing exactly the given operations.
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Self {
        Self {
            allowed_operations: operations.into_iter().collect(),
            filters: None,
            extra: Map::new(),
        }
    }

    /// Restrict queries made with the key by a filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.get_or_insert_with(Vec::new).push(filter);
        self
    }

    /// Attach an additional restriction.
    pub fn restriction(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn allows(&self, operation: Operation) -> bool {
        self.allowed_operations.contains(&operation)
    }
}

fn cipher_for(master_key: &str) -> Result<Aes256Gcm, Error> {
    if master_key.is_empty() {
        return Err(Error::InvalidScopedKey("master key cannot be empty".into()));
    }
    let digest = Sha256::digest(master_key.as_bytes());
    let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
    Ok(Aes256Gcm::new(key))
}

/// Encrypt a permission document into a scoped key.
pub fn encrypt(master_key: &str, permissions: &ScopedKeyPermissions) -> Result<String, Error> {
    let cipher = cipher_for(master_key)?;
    let plaintext = serde_json::to_vec(permissions)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|e| Error::InvalidScopedKey(format!("encryption failed: {e}")))?;

    let mut token = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    token.extend_from_slice(&nonce_bytes);
    token.extend_from_slice(&ciphertext);
    Ok(hex::encode(token))
}

/// Decrypt a scoped key back into its permission document.
pub fn decrypt(master_key: &str, token: &str) -> Result<ScopedKeyPermissions, Error> {
    let cipher = cipher_for(master_key)?;

    let raw = hex::decode(token)
        .map_err(|e| Error::InvalidScopedKey(format!("malformed token: {e}")))?;
    if raw.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::InvalidScopedKey(format!(
            "token too short: {} bytes",
            raw.len()
        )));
    }

    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| Error::InvalidScopedKey(format!("decryption failed: {e}")))?;

    serde_json::from_slice(&plaintext)
        .map_err(|e| Error::InvalidScopedKey(format!("invalid permission document: {e}")))
}
