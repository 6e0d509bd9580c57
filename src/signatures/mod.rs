// src/signatures/mod.rs
//! Detached ed25519 signatures over a document's signing root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{keys, Hash, DOMAIN_SIGNATURE};
use crate::error::{DocumentError, Result};
use crate::identity::{IdentityConfig, IdentityId, IdentityService, KeyPurpose};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub entity_id: IdentityId,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

impl Signature {
    /// Leaf committed into the document tree for this signature.
    pub fn leaf_hash(&self) -> Hash {
        let mut h = Sha256::new();
        h.update(DOMAIN_SIGNATURE);
        h.update(self.entity_id.as_bytes());
        h.update(&self.public_key);
        h.update(&self.signature);
        h.update(self.timestamp.timestamp().to_be_bytes());
        h.finalize().into()
    }
}

/// Sign `signing_root` with the local identity. The signature bytes depend
/// only on the key and the root.
pub fn sign(identity: &IdentityConfig, signing_root: &Hash) -> Signature {
    Signature {
        entity_id: identity.id,
        public_key: identity.public_key(),
        signature: keys::sign_bytes(&identity.signing_key, signing_root),
        timestamp: Utc::now(),
    }
}

/// Cryptographic check only; no registry lookup.
pub fn verify(signature: &Signature, message: &[u8], public_key: &[u8]) -> bool {
    keys::verify_bytes(public_key, message, &signature.signature)
}

/// Full check of a signature: the signer's identity must exist, the key must
/// be registered for signing and not revoked, and the signature must verify.
pub async fn validate_signature(
    identity_service: &dyn IdentityService,
    signature: &Signature,
    message: &[u8],
) -> Result<()> {
    let signer = signature.entity_id.to_string();

    let identity = identity_service
        .lookup_identity(&signature.entity_id)
        .await
        .map_err(|e| DocumentError::IdentityResolutionFailed {
            id: signer.clone(),
            reason: e.to_string(),
        })?;

    let record = identity
        .fetch_key(&signature.public_key)
        .await
        .map_err(|e| DocumentError::IdentityResolutionFailed {
            id: signer.clone(),
            reason: e.to_string(),
        })?;

    if !record.has_purpose(KeyPurpose::Signing) {
        return Err(DocumentError::InvalidSignature {
            signer,
            reason: "key is not valid for signature purpose".into(),
        });
    }

    if record.is_revoked() {
        return Err(DocumentError::InvalidSignature {
            signer,
            reason: format!("key is currently revoked since block {}", record.revoked_at),
        });
    }

    if !verify(signature, message, &record.key) {
        return Err(DocumentError::InvalidSignature {
            signer,
            reason: "signature verification failed".into(),
        });
    }

    log::debug!("Validated signature of {} over {}", signer, hex::encode(message));
    Ok(())
}
