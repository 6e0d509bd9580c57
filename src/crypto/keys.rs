// src/crypto/keys.rs
use anyhow::{Context, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use std::fs;
use std::path::Path;

pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;

/// Verify a signature over `msg` using `pubkey` (32 bytes) and signature bytes.
/// Returns `true` if signature verifies.
pub fn verify_bytes(pubkey: &[u8], msg: &[u8], sig_bytes: &[u8]) -> bool {
    let vk = match <&[u8; PUBLIC_KEY_LENGTH]>::try_from(pubkey) {
        Ok(pubkey_array) => match VerifyingKey::from_bytes(pubkey_array) {
            Ok(v) => v,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    let sig = match <&[u8; SIGNATURE_LENGTH]>::try_from(sig_bytes) {
        Ok(sig_array) => Signature::from_bytes(sig_array),
        Err(_) => return false,
    };

    vk.verify(msg, &sig).is_ok()
}

/// Sign message bytes and return signature bytes.
pub fn sign_bytes(sk: &SigningKey, msg: &[u8]) -> Vec<u8> {
    sk.sign(msg).to_bytes().to_vec()
}

/// Extract public key bytes (32 bytes) from signing key.
pub fn pubkey_bytes(sk: &SigningKey) -> Vec<u8> {
    sk.verifying_key().to_bytes().to_vec()
}

/// Build a signing key from a 32-byte secret seed.
pub fn signing_key_from_seed(seed: &[u8]) -> Result<SigningKey> {
    let seed_array: &[u8; 32] = seed
        .try_into()
        .map_err(|_| anyhow::anyhow!("invalid seed length {}", seed.len()))?;
    Ok(SigningKey::from_bytes(seed_array))
}

pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Fresh keypair persisted at `path` as its 64 raw bytes, owner-only.
pub fn generate_and_write_signing_key(path: &Path) -> Result<SigningKey> {
    let sk = generate_signing_key();
    fs::write(path, sk.to_keypair_bytes())
        .with_context(|| format!("write key file {}", path.display()))?;
    restrict_to_owner(path);
    Ok(sk)
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        log::warn!("key file {} left with default mode: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) {}

/// Signing key stored by [`generate_and_write_signing_key`].
pub fn load_signing_key(path: &Path) -> Result<SigningKey> {
    let raw = fs::read(path).with_context(|| format!("read key file {}", path.display()))?;
    let keypair: [u8; 64] = raw.as_slice().try_into().map_err(|_| {
        anyhow::anyhow!("key file {} holds {} bytes, expected 64", path.display(), raw.len())
    })?;
    SigningKey::from_keypair_bytes(&keypair)
        .map_err(|e| anyhow::anyhow!("key file {}: {}", path.display(), e))
}
