use thiserror::Error;

use crate::crypto::Hash;
use crate::documents::PipelineStage;

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("unknown document type: {0}")]
    UnknownDocumentType(String),

    #[error("document already exists: {}", hex::encode(.0))]
    AlreadyExists(Vec<u8>),

    #[error("document not found: {}", hex::encode(.0))]
    NotFound(Vec<u8>),

    #[error(
        "document not found for the given version: version {} is not valid for identifier {}",
        hex::encode(.version),
        hex::encode(.document_id)
    )]
    VersionNotFound { document_id: Vec<u8>, version: Vec<u8> },

    #[error("data root missing for version {}", hex::encode(.0))]
    MissingDataRoot(Vec<u8>),

    #[error("signing root missing for version {}", hex::encode(.0))]
    MissingSigningRoot(Vec<u8>),

    #[error("no such field: {0}")]
    FieldNotFound(String),

    #[error("identity resolution failed for {id}: {reason}")]
    IdentityResolutionFailed { id: String, reason: String },

    #[error("signature from {signer} rejected: {reason}")]
    InvalidSignature { signer: String, reason: String },

    #[error("document not anchored: no root recorded for anchor {0}")]
    NotAnchored(String),

    #[error("root mismatch: expected {}, got {}", hex::encode(.expected), hex::encode(.actual))]
    RootMismatch { expected: Hash, actual: Hash },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("{stage} failed: {source}")]
    StageFailed {
        stage: PipelineStage,
        #[source]
        source: anyhow::Error,
    },

    #[error("document {} is anchored and cannot be modified", hex::encode(.0))]
    AlreadyAnchored(Vec<u8>),

    #[error("pipeline cancelled before {0}")]
    Cancelled(PipelineStage),

    #[error("anchor registry error: {0}")]
    Registry(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DocumentError {
    /// Wrap a stage failure; typed errors raised inside a stage are kept as the source.
    pub fn stage(stage: PipelineStage, source: impl Into<anyhow::Error>) -> Self {
        DocumentError::StageFailed {
            stage,
            source: source.into(),
        }
    }
}

impl From<rocksdb::Error> for DocumentError {
    fn from(e: rocksdb::Error) -> Self {
        DocumentError::Storage(e.to_string())
    }
}
