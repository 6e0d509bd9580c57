pub mod keys;
pub mod merkle;

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 32-byte SHA-256 digest used for every root and tree node.
pub type Hash = [u8; 32];

pub const HASH_LENGTH: usize = 32;

/// Domain tag for salted field leaves.
pub const DOMAIN_LEAF: &[u8] = b"DOC_LEAF_V1";
/// Domain tag for sorted-pair internal nodes.
pub const DOMAIN_NODE: &[u8] = b"DOC_NODE_V1";
/// Domain tag for signature leaves of the document tree.
pub const DOMAIN_SIGNATURE: &[u8] = b"DOC_SIG_V1";

pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Big-endian length prefix, so adjacent variable-length fields cannot collide.
pub fn u32_be(n: usize) -> [u8; 4] {
    (n as u32).to_be_bytes()
}

/// Internal node hash. Children are ordered by value before hashing, so a
/// proof only needs the sibling hashes and no left/right flags.
pub fn hash_sorted_pair(a: &Hash, b: &Hash) -> Hash {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let mut h = Sha256::new();
    h.update(DOMAIN_NODE);
    h.update(lo);
    h.update(hi);
    h.finalize().into()
}

/// Fill a fresh 32-byte value from the OS RNG (salts, version identifiers).
pub fn random_bytes32() -> [u8; 32] {
    let mut out = [0u8; 32];
    OsRng.fill_bytes(&mut out);
    out
}

/// Parse a 32-byte hash from an arbitrary slice.
pub fn hash_from_slice(bytes: &[u8]) -> Option<Hash> {
    bytes.try_into().ok()
}

/// `0x`-prefixed lower-case hex, the rendering used in responses.
pub fn to_hex_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode hex with or without a `0x` prefix.
pub fn from_hex_prefixed(s: &str) -> Result<Vec<u8>, hex::FromHexError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
}
