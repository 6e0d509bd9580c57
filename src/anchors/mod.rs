// src/anchors/mod.rs
//! Anchor registry contract and the check that gates proof generation.
//!
//! Every document version is anchored under its own identifier, so older
//! versions stay provable after the document moves on.

use anyhow::bail;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

use crate::crypto::{Hash, HASH_LENGTH};
use crate::error::{DocumentError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnchorId([u8; HASH_LENGTH]);

impl AnchorId {
    /// Anchor id of a document version: the 32-byte version identifier itself.
    pub fn from_version(version: &[u8]) -> Result<Self> {
        let arr: [u8; HASH_LENGTH] = version.try_into().map_err(|_| {
            DocumentError::InvalidPayload(format!(
                "version identifier {} is not {} bytes",
                hex::encode(version),
                HASH_LENGTH
            ))
        })?;
        Ok(AnchorId(arr))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[async_trait]
pub trait AnchorRegistry: Send + Sync {
    /// Root recorded for `anchor_id`, `None` if nothing was anchored.
    async fn get_document_root_of(&self, anchor_id: &AnchorId) -> anyhow::Result<Option<Hash>>;

    async fn commit_anchor(&self, anchor_id: AnchorId, document_root: Hash) -> anyhow::Result<()>;
}

/// In-memory, write-once anchor registry.
#[derive(Default)]
pub struct MemAnchorRegistry {
    anchors: RwLock<HashMap<AnchorId, Hash>>,
}

impl MemAnchorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.anchors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.read().is_empty()
    }
}

#[async_trait]
impl AnchorRegistry for MemAnchorRegistry {
    async fn get_document_root_of(&self, anchor_id: &AnchorId) -> anyhow::Result<Option<Hash>> {
        Ok(self.anchors.read().get(anchor_id).copied())
    }

    async fn commit_anchor(&self, anchor_id: AnchorId, document_root: Hash) -> anyhow::Result<()> {
        let mut anchors = self.anchors.write();
        if let Some(existing) = anchors.get(&anchor_id) {
            if *existing == document_root {
                return Ok(());
            }
            bail!(
                "anchor {} already committed with root {}",
                anchor_id,
                hex::encode(existing)
            );
        }
        anchors.insert(anchor_id, document_root);
        log::info!(
            "Anchored {} with document root {}",
            anchor_id,
            hex::encode(document_root)
        );
        Ok(())
    }
}

/// Confirm that the registry recorded `claimed_root` for `version`.
pub async fn verify_anchored(
    registry: &dyn AnchorRegistry,
    version: &[u8],
    claimed_root: &Hash,
) -> Result<()> {
    let anchor_id = AnchorId::from_version(version)?;
    let recorded = registry
        .get_document_root_of(&anchor_id)
        .await
        .map_err(|e| DocumentError::Registry(format!("get document root of {}: {}", anchor_id, e)))?;

    match recorded {
        None => Err(DocumentError::NotAnchored(anchor_id.to_string())),
        Some(root) if root != *claimed_root => Err(DocumentError::RootMismatch {
            expected: root,
            actual: *claimed_root,
        }),
        Some(_) => Ok(()),
    }
}
