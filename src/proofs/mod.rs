//! Salted field trees and per-field disclosure proofs.
//!
//! Every field of a document becomes one leaf:
//! `SHA256(DOC_LEAF_V1 || len(name) || name || len(value) || value || salt)`.
//! Leaves are ordered by property name and combined with sorted-pair hashing,
//! so the same `(fields, salts)` pair always yields the same root and the same
//! proof paths, on any machine. Proofs are rebuilt on demand from the stored
//! model; nothing here is cached.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::merkle::{root_from_path, MerkleTree};
use crate::crypto::{random_bytes32, u32_be, Hash, DOMAIN_LEAF};
use crate::error::{DocumentError, Result};
use sha2::{Digest, Sha256};

pub type Salt = [u8; 32];

/// Typed value of a single committed field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Tagged encoding hashed into the leaf.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            FieldValue::Str(s) => {
                let mut out = vec![0x01];
                out.extend_from_slice(s.as_bytes());
                out
            }
            FieldValue::Int(n) => {
                let mut out = vec![0x02];
                out.extend_from_slice(&n.to_be_bytes());
                out
            }
            FieldValue::Bytes(b) => {
                let mut out = vec![0x03];
                out.extend_from_slice(b);
                out
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Int(n)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(b: Vec<u8>) -> Self {
        FieldValue::Bytes(b)
    }
}

/// Named field ready to be committed.
pub type Field = (&'static str, FieldValue);

/// One random blinding value per field name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salts(BTreeMap<String, Salt>);

impl Salts {
    /// Fresh salts from the OS RNG for every name.
    pub fn generate<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Salts(
            names
                .into_iter()
                .map(|n| (n.to_string(), random_bytes32()))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&Salt> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, salt: Salt) {
        self.0.insert(name.into(), salt);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn leaf_hash(name: &str, value: &FieldValue, salt: &Salt) -> Hash {
    let encoded = value.encode();
    let mut h = Sha256::new();
    h.update(DOMAIN_LEAF);
    h.update(u32_be(name.len()));
    h.update(name.as_bytes());
    h.update(u32_be(encoded.len()));
    h.update(&encoded);
    h.update(salt);
    h.finalize().into()
}

/// Disclosure of one field: the revealed value and salt plus the sorted
/// sibling path to the committing root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldProof {
    pub property: String,
    pub value: FieldValue,
    pub salt: Salt,
    pub hashes: Vec<Hash>,
}

impl FieldProof {
    pub fn leaf(&self) -> Hash {
        leaf_hash(&self.property, &self.value, &self.salt)
    }

    /// Root implied by this proof.
    pub fn root(&self) -> Hash {
        root_from_path(&self.leaf(), &self.hashes)
    }

    pub fn verify(&self, expected_root: &Hash) -> bool {
        self.root() == *expected_root
    }

    /// Append higher-level siblings, e.g. the path of the data root inside the
    /// signing tree, so the proof verifies against that higher root.
    pub fn extend(&mut self, path: &[Hash]) {
        self.hashes.extend_from_slice(path);
    }
}

/// Proofs for a set of fields of one document version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub document_id: Vec<u8>,
    pub version_id: Vec<u8>,
    pub field_proofs: Vec<FieldProof>,
}

impl Proof {
    pub fn verify(&self, expected_root: &Hash) -> bool {
        !self.field_proofs.is_empty() && self.field_proofs.iter().all(|p| p.verify(expected_root))
    }
}

struct TreeLeaf {
    value: FieldValue,
    salt: Salt,
    index: usize,
}

/// Salted Merkle tree over a document's fields.
pub struct DocumentTree {
    leaves: BTreeMap<String, TreeLeaf>,
    tree: MerkleTree,
}

impl DocumentTree {
    pub fn build(fields: Vec<Field>, salts: &Salts) -> Result<Self> {
        let mut ordered: BTreeMap<String, (FieldValue, Salt)> = BTreeMap::new();
        for (name, value) in fields {
            let salt = salts
                .get(name)
                .ok_or_else(|| DocumentError::InvalidPayload(format!("missing salt for field {}", name)))?;
            if ordered.insert(name.to_string(), (value, *salt)).is_some() {
                return Err(DocumentError::InvalidPayload(format!(
                    "duplicate field {}",
                    name
                )));
            }
        }

        let mut hashes = Vec::with_capacity(ordered.len());
        let mut leaves = BTreeMap::new();
        for (index, (name, (value, salt))) in ordered.into_iter().enumerate() {
            hashes.push(leaf_hash(&name, &value, &salt));
            leaves.insert(name, TreeLeaf { value, salt, index });
        }

        Ok(DocumentTree {
            leaves,
            tree: MerkleTree::from_leaf_hashes(hashes),
        })
    }

    pub fn root_hash(&self) -> Hash {
        self.tree.root()
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.leaves.keys().map(|k| k.as_str())
    }

    pub fn create_proof(&self, name: &str) -> Result<FieldProof> {
        let leaf = self
            .leaves
            .get(name)
            .ok_or_else(|| DocumentError::FieldNotFound(name.to_string()))?;
        let hashes = self
            .tree
            .proof_for_index(leaf.index)
            .ok_or_else(|| DocumentError::FieldNotFound(name.to_string()))?;
        Ok(FieldProof {
            property: name.to_string(),
            value: leaf.value.clone(),
            salt: leaf.salt,
            hashes,
        })
    }

    /// Proofs for every requested name. All names are evaluated; if any is
    /// unknown the whole request fails with the first unknown name.
    pub fn create_proofs<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<FieldProof>> {
        let results: Vec<Result<FieldProof>> =
            names.iter().map(|n| self.create_proof(n.as_ref())).collect();
        results.into_iter().collect()
    }

    pub fn validate_proof(&self, proof: &FieldProof, expected_root: &Hash) -> bool {
        proof.verify(expected_root)
    }
}
