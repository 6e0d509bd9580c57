// src/documents/processor.rs
//! Lifecycle stages applied to a freshly stored version.

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{Document, DocumentStatus};
use crate::anchors::{AnchorId, AnchorRegistry};
use crate::coredocument::CoreDocument;
use crate::identity::{IdentityConfig, IdentityId, IdentityService};
use crate::signatures::{self, Signature};

/// Pipeline stages. The service runs them in declaration order and persists
/// the document between stages.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn prepare_for_signature_requests(&self, doc: &mut Document) -> anyhow::Result<()>;

    async fn request_signatures(
        &self,
        ctx: &CancellationToken,
        doc: &mut Document,
    ) -> anyhow::Result<()>;

    async fn prepare_for_anchoring(&self, doc: &mut Document) -> anyhow::Result<()>;

    async fn anchor_document(&self, doc: &mut Document) -> anyhow::Result<()>;

    async fn send_document(&self, ctx: &CancellationToken, doc: &mut Document)
        -> anyhow::Result<()>;
}

/// Asks a collaborator to sign a packed core document.
#[async_trait]
pub trait SignatureRequester: Send + Sync {
    async fn request_signature(
        &self,
        ctx: &CancellationToken,
        collaborator: IdentityId,
        document: &CoreDocument,
    ) -> anyhow::Result<Signature>;
}

/// Delivers an anchored core document to a collaborator.
#[async_trait]
pub trait DocumentSender: Send + Sync {
    async fn send(
        &self,
        ctx: &CancellationToken,
        recipient: IdentityId,
        document: &CoreDocument,
    ) -> anyhow::Result<()>;
}

pub struct DefaultProcessor {
    identity: IdentityConfig,
    identity_service: Arc<dyn IdentityService>,
    anchors: Arc<dyn AnchorRegistry>,
    requester: Arc<dyn SignatureRequester>,
    sender: Arc<dyn DocumentSender>,
}

impl DefaultProcessor {
    pub fn new(
        identity: IdentityConfig,
        identity_service: Arc<dyn IdentityService>,
        anchors: Arc<dyn AnchorRegistry>,
        requester: Arc<dyn SignatureRequester>,
        sender: Arc<dyn DocumentSender>,
    ) -> Self {
        DefaultProcessor {
            identity,
            identity_service,
            anchors,
            requester,
            sender,
        }
    }

    fn external_collaborators(&self, doc: &Document) -> Vec<IdentityId> {
        doc.core
            .collaborators
            .iter()
            .copied()
            .filter(|c| *c != self.identity.id)
            .collect()
    }
}

#[async_trait]
impl Processor for DefaultProcessor {
    /// Compute the signing root and add our own signature.
    async fn prepare_for_signature_requests(&self, doc: &mut Document) -> anyhow::Result<()> {
        doc.calculate_signing_root()?;
        doc.sign(&self.identity)?;
        log::debug!(
            "Self-signed version {}",
            hex::encode(doc.current_version())
        );
        Ok(())
    }

    /// Collect and validate one signature per external collaborator.
    async fn request_signatures(
        &self,
        ctx: &CancellationToken,
        doc: &mut Document,
    ) -> anyhow::Result<()> {
        let signing_root = doc
            .core
            .signing_root
            .ok_or_else(|| anyhow!("signing root missing"))?;
        let packed = doc.pack_core_document()?;

        for collaborator in self.external_collaborators(doc) {
            if ctx.is_cancelled() {
                bail!("cancelled while requesting signatures");
            }
            let signature = self
                .requester
                .request_signature(ctx, collaborator, &packed)
                .await
                .with_context(|| format!("signature request to {}", collaborator))?;
            if signature.entity_id != collaborator {
                bail!(
                    "signature from {} returned for request to {}",
                    signature.entity_id,
                    collaborator
                );
            }
            signatures::validate_signature(self.identity_service.as_ref(), &signature, &signing_root)
                .await?;
            doc.add_signature(signature)?;
            log::info!(
                "Collected signature of {} for {}",
                collaborator,
                hex::encode(doc.current_version())
            );
        }
        Ok(())
    }

    /// Re-check roots and every collected signature.
    async fn prepare_for_anchoring(&self, doc: &mut Document) -> anyhow::Result<()> {
        let signing_root = doc
            .core
            .signing_root
            .ok_or_else(|| anyhow!("signing root missing"))?;
        doc.verify_roots()?;
        for signature in &doc.core.signatures {
            signatures::validate_signature(self.identity_service.as_ref(), signature, &signing_root)
                .await?;
        }
        doc.calculate_document_root()?;
        Ok(())
    }

    async fn anchor_document(&self, doc: &mut Document) -> anyhow::Result<()> {
        let root = match doc.core.document_root {
            Some(root) => root,
            None => doc.calculate_document_root()?,
        };
        let anchor_id = AnchorId::from_version(doc.current_version())?;
        self.anchors
            .commit_anchor(anchor_id, root)
            .await
            .with_context(|| format!("commit anchor {}", anchor_id))?;
        doc.status = DocumentStatus::Anchored;
        Ok(())
    }

    /// Deliver the anchored document to every external collaborator.
    async fn send_document(
        &self,
        ctx: &CancellationToken,
        doc: &mut Document,
    ) -> anyhow::Result<()> {
        if !doc.is_anchored() {
            bail!(
                "version {} is not anchored",
                hex::encode(doc.current_version())
            );
        }
        let packed = doc.pack_core_document()?;
        for recipient in self.external_collaborators(doc) {
            if ctx.is_cancelled() {
                bail!("cancelled while sending document");
            }
            self.sender
                .send(ctx, recipient, &packed)
                .await
                .with_context(|| format!("send to {}", recipient))?;
            log::info!(
                "Sent {} to {}",
                hex::encode(doc.current_version()),
                recipient
            );
        }
        Ok(())
    }
}
