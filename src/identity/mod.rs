// src/identity/mod.rs
//! Identity resolution contract.
//!
//! Signers are identified by a fixed 6-byte identity id. The keys that an
//! identity may sign with live in an external registry; the crate only
//! consumes it through [`IdentityService`] and [`Identity`], injected where
//! they are needed. Results are never cached here, so a revocation is
//! visible on the next check.

use anyhow::{bail, Result};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::crypto::{from_hex_prefixed, keys, to_hex_prefixed};
use crate::error::DocumentError;

pub const IDENTITY_ID_LENGTH: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityId([u8; IDENTITY_ID_LENGTH]);

impl IdentityId {
    pub fn new(bytes: [u8; IDENTITY_ID_LENGTH]) -> Self {
        IdentityId(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> crate::error::Result<Self> {
        let arr: [u8; IDENTITY_ID_LENGTH] = bytes.try_into().map_err(|_| {
            DocumentError::InvalidPayload(format!(
                "invalid length byte slice provided for identity id: {}",
                bytes.len()
            ))
        })?;
        Ok(IdentityId(arr))
    }

    pub fn from_hex(s: &str) -> crate::error::Result<Self> {
        let bytes = from_hex_prefixed(s)
            .map_err(|e| DocumentError::InvalidPayload(format!("identity id {}: {}", s, e)))?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        to_hex_prefixed(&self.0)
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPurpose {
    Management,
    Signing,
    Encryption,
}

/// Key as recorded by the identity registry. `revoked_at` is the block height
/// of revocation; zero means never revoked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key: Vec<u8>,
    pub purposes: Vec<KeyPurpose>,
    pub revoked_at: u64,
}

impl KeyRecord {
    pub fn signing(key: Vec<u8>) -> Self {
        KeyRecord {
            key,
            purposes: vec![KeyPurpose::Signing],
            revoked_at: 0,
        }
    }

    pub fn has_purpose(&self, purpose: KeyPurpose) -> bool {
        self.purposes.contains(&purpose)
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at != 0
    }
}

#[async_trait]
pub trait Identity: Send + Sync {
    fn id(&self) -> IdentityId;
    async fn fetch_key(&self, key: &[u8]) -> Result<KeyRecord>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn lookup_identity(&self, id: &IdentityId) -> Result<Arc<dyn Identity>>;
}

/// Local signing identity: who we are and the key we sign with.
#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub id: IdentityId,
    pub signing_key: SigningKey,
}

impl IdentityConfig {
    pub fn new(id: IdentityId, signing_key: SigningKey) -> Self {
        Self { id, signing_key }
    }

    pub fn public_key(&self) -> Vec<u8> {
        keys::pubkey_bytes(&self.signing_key)
    }
}

/// In-memory identity registry.
#[derive(Default)]
pub struct MemIdentityService {
    identities: RwLock<HashMap<IdentityId, Arc<MemIdentity>>>,
}

pub struct MemIdentity {
    id: IdentityId,
    keys: RwLock<HashMap<Vec<u8>, KeyRecord>>,
}

impl MemIdentityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_key(&self, id: IdentityId, record: KeyRecord) {
        let mut identities = self.identities.write();
        let identity = identities.entry(id).or_insert_with(|| {
            Arc::new(MemIdentity {
                id,
                keys: RwLock::new(HashMap::new()),
            })
        });
        identity.keys.write().insert(record.key.clone(), record);
    }

    /// Register the signing key of a local identity.
    pub fn register_identity(&self, identity: &IdentityConfig) {
        self.register_key(identity.id, KeyRecord::signing(identity.public_key()));
    }

    pub fn revoke_key(&self, id: &IdentityId, key: &[u8], at_block: u64) -> Result<()> {
        let identities = self.identities.read();
        let identity = match identities.get(id) {
            Some(i) => i,
            None => bail!("identity {} not registered", id),
        };
        let mut keys = identity.keys.write();
        match keys.get_mut(key) {
            Some(record) => {
                record.revoked_at = at_block;
                log::info!("Revoked key {} of {} at block {}", hex::encode(key), id, at_block);
                Ok(())
            }
            None => bail!("key {} not registered for {}", hex::encode(key), id),
        }
    }
}

#[async_trait]
impl Identity for MemIdentity {
    fn id(&self) -> IdentityId {
        self.id
    }

    async fn fetch_key(&self, key: &[u8]) -> Result<KeyRecord> {
        self.keys
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("key {} not found for {}", hex::encode(key), self.id))
    }
}

#[async_trait]
impl IdentityService for MemIdentityService {
    async fn lookup_identity(&self, id: &IdentityId) -> Result<Arc<dyn Identity>> {
        let identities = self.identities.read();
        match identities.get(id) {
            Some(identity) => Ok(identity.clone() as Arc<dyn Identity>),
            None => bail!("identity {} not registered", id),
        }
    }
}
