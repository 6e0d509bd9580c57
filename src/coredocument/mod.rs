// src/coredocument/mod.rs
//! The versioned envelope shared by every document type.
//!
//! Commitments are layered:
//! - data root: salted field tree over the embedded payload;
//! - signing root: salted core metadata leaves plus the data root as a leaf;
//! - document root: the signing root as a leaf plus one leaf per signature.
//!
//! Because the lower root enters the higher tree as a plain leaf, a field
//! proof's sibling path can be extended level by level up to the document
//! root that is anchored.

use serde::{Deserialize, Serialize};

use crate::crypto::merkle::MerkleTree;
use crate::crypto::{random_bytes32, Hash};
use crate::error::{DocumentError, Result};
use crate::identity::IdentityId;
use crate::proofs::{leaf_hash, Field, FieldValue, Salts};
use crate::signatures::Signature;

/// Core fields committed into the signing tree.
pub const CORE_FIELDS: [&str; 5] = [
    "collaborators",
    "current_version",
    "document_identifier",
    "next_version",
    "previous_version",
];

/// Type-tagged opaque blob carrying a variant payload or its salts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedData {
    pub type_url: String,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreDocument {
    pub document_identifier: Vec<u8>,
    pub current_version: Vec<u8>,
    pub next_version: Vec<u8>,
    pub previous_version: Option<Vec<u8>>,
    pub data_root: Option<Hash>,
    pub signing_root: Option<Hash>,
    pub document_root: Option<Hash>,
    pub collaborators: Vec<IdentityId>,
    pub signatures: Vec<Signature>,
    pub core_salts: Salts,
    pub embedded_data: Option<EmbeddedData>,
    pub embedded_data_salts: Option<EmbeddedData>,
}

impl Default for CoreDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreDocument {
    /// First version of a new document: its identifier is also its version.
    pub fn new() -> Self {
        let id = random_bytes32().to_vec();
        CoreDocument {
            document_identifier: id.clone(),
            current_version: id,
            next_version: random_bytes32().to_vec(),
            previous_version: None,
            data_root: None,
            signing_root: None,
            document_root: None,
            collaborators: Vec::new(),
            signatures: Vec::new(),
            core_salts: Salts::generate(CORE_FIELDS),
            embedded_data: None,
            embedded_data_salts: None,
        }
    }

    /// Successor of this version. Nothing of `self` is modified; the new
    /// version starts with empty roots and signatures and fresh salts.
    pub fn prepare_new_version(&self, collaborators: &[IdentityId]) -> Result<CoreDocument> {
        if self.next_version.is_empty() {
            return Err(DocumentError::InvalidPayload(format!(
                "version {} has no next version",
                hex::encode(&self.current_version)
            )));
        }

        let mut next = CoreDocument {
            document_identifier: self.document_identifier.clone(),
            current_version: self.next_version.clone(),
            next_version: random_bytes32().to_vec(),
            previous_version: Some(self.current_version.clone()),
            data_root: None,
            signing_root: None,
            document_root: None,
            collaborators: self.collaborators.clone(),
            signatures: Vec::new(),
            core_salts: Salts::generate(CORE_FIELDS),
            embedded_data: None,
            embedded_data_salts: None,
        };
        for c in collaborators {
            if !next.collaborators.contains(c) {
                next.collaborators.push(*c);
            }
        }
        Ok(next)
    }

    /// Append a collaborator; the list is an ordered set.
    pub fn add_collaborator(&mut self, id: IdentityId) -> Result<()> {
        if self.collaborators.contains(&id) {
            return Err(DocumentError::InvalidPayload(format!(
                "duplicate collaborator {}",
                id
            )));
        }
        self.collaborators.push(id);
        Ok(())
    }

    fn core_fields(&self) -> Vec<Field> {
        let collaborators: Vec<u8> = self
            .collaborators
            .iter()
            .flat_map(|c| c.as_bytes().to_vec())
            .collect();
        vec![
            ("collaborators", FieldValue::Bytes(collaborators)),
            ("current_version", FieldValue::Bytes(self.current_version.clone())),
            (
                "document_identifier",
                FieldValue::Bytes(self.document_identifier.clone()),
            ),
            ("next_version", FieldValue::Bytes(self.next_version.clone())),
            (
                "previous_version",
                FieldValue::Bytes(self.previous_version.clone().unwrap_or_default()),
            ),
        ]
    }

    fn signing_tree(&self, data_root: Hash) -> Result<MerkleTree> {
        let mut leaves = Vec::with_capacity(CORE_FIELDS.len() + 1);
        for (name, value) in self.core_fields() {
            let salt = self.core_salts.get(name).ok_or_else(|| {
                DocumentError::InvalidPayload(format!("missing core salt for {}", name))
            })?;
            leaves.push(leaf_hash(name, &value, salt));
        }
        leaves.push(data_root);
        Ok(MerkleTree::from_leaf_hashes(leaves))
    }

    fn document_tree(&self, signing_root: Hash) -> MerkleTree {
        let mut leaves = Vec::with_capacity(self.signatures.len() + 1);
        leaves.push(signing_root);
        leaves.extend(self.signatures.iter().map(|s| s.leaf_hash()));
        MerkleTree::from_leaf_hashes(leaves)
    }

    /// Signing root from the current fields; does not store it.
    pub fn compute_signing_root(&self) -> Result<Hash> {
        let data_root = self
            .data_root
            .ok_or_else(|| DocumentError::MissingDataRoot(self.current_version.clone()))?;
        Ok(self.signing_tree(data_root)?.root())
    }

    pub fn calculate_signing_root(&mut self) -> Result<Hash> {
        let root = self.compute_signing_root()?;
        self.signing_root = Some(root);
        Ok(root)
    }

    /// Document root from the current signing root and signatures; does not store it.
    pub fn compute_document_root(&self) -> Result<Hash> {
        let signing_root = self
            .signing_root
            .ok_or_else(|| DocumentError::MissingSigningRoot(self.current_version.clone()))?;
        Ok(self.document_tree(signing_root).root())
    }

    pub fn calculate_document_root(&mut self) -> Result<Hash> {
        let root = self.compute_document_root()?;
        self.document_root = Some(root);
        Ok(root)
    }

    /// Sibling path from the data root up to the document root.
    pub fn data_root_path(&self) -> Result<Vec<Hash>> {
        let data_root = self
            .data_root
            .ok_or_else(|| DocumentError::MissingDataRoot(self.current_version.clone()))?;
        let signing_root = self
            .signing_root
            .ok_or_else(|| DocumentError::MissingSigningRoot(self.current_version.clone()))?;

        let signing_tree = self.signing_tree(data_root)?;
        let data_index = signing_tree.leaf_count() - 1;
        let mut path = signing_tree.proof_for_index(data_index).unwrap_or_default();
        path.extend(
            self.document_tree(signing_root)
                .proof_for_index(0)
                .unwrap_or_default(),
        );
        Ok(path)
    }

    pub fn is_first_version(&self) -> bool {
        self.current_version == self.document_identifier
    }
}
