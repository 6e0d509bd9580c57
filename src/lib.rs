// Versioned business documents with salted field commitments, signatures,
// anchoring and per-field proofs.

pub mod anchors;
pub mod config;
pub mod coredocument;
pub mod crypto;
pub mod documents;
pub mod error;
pub mod identity;
pub mod proofs;
pub mod repository;
pub mod signatures;

pub use documents::service::DocumentService;
pub use documents::{Document, DocumentData, DocumentStatus, DocumentType, PipelineStage};
pub use error::{DocumentError, Result};
pub use proofs::{FieldProof, Proof};
