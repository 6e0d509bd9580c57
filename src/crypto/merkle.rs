// src/crypto/merkle.rs
use crate::crypto::{hash_sorted_pair, sha256, Hash, DOMAIN_NODE};

/// Binary Merkle tree over precomputed leaf hashes, combined with sorted-pair
/// hashing. An odd node at the end of a level is promoted unchanged.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>, // levels[0] = leaves, last = [root]
}

impl MerkleTree {
    pub fn from_leaf_hashes(leaves: Vec<Hash>) -> Self {
        if leaves.is_empty() {
            return MerkleTree { levels: Vec::new() };
        }

        let mut levels = vec![leaves];
        while levels.last().map_or(0, |l| l.len()) > 1 {
            let prev = &levels[levels.len() - 1];
            let next: Vec<Hash> = prev
                .chunks(2)
                .map(|chunk| {
                    if chunk.len() == 2 {
                        hash_sorted_pair(&chunk[0], &chunk[1])
                    } else {
                        // odd, promote last
                        chunk[0]
                    }
                })
                .collect();
            levels.push(next);
        }
        MerkleTree { levels }
    }

    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .unwrap_or_else(|| sha256(DOMAIN_NODE))
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    pub fn leaf(&self, index: usize) -> Option<Hash> {
        self.levels.first().and_then(|l| l.get(index)).copied()
    }

    /// Sibling hashes from the leaf at `index` up to the root.
    /// Promoted nodes have no sibling and contribute nothing to the path.
    pub fn proof_for_index(&self, index: usize) -> Option<Vec<Hash>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut path = Vec::new();
        let mut idx = index;
        for level in &self.levels {
            if level.len() == 1 {
                break;
            }
            let sibling = idx ^ 1;
            if sibling < level.len() {
                path.push(level[sibling]);
            }
            idx /= 2;
        }
        Some(path)
    }
}

/// Fold a sorted-pair sibling path onto a leaf hash.
pub fn root_from_path(leaf: &Hash, path: &[Hash]) -> Hash {
    path.iter()
        .fold(*leaf, |acc, sibling| hash_sorted_pair(&acc, sibling))
}

pub fn verify_path(leaf: &Hash, path: &[Hash], root: &Hash) -> bool {
    root_from_path(leaf, path) == *root
}
