// tests/common/mod.rs
// Shared fixtures: an in-process "network" of document services.
#![allow(dead_code)]

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use anchored_docs::anchors::MemAnchorRegistry;
use anchored_docs::coredocument::CoreDocument;
use anchored_docs::crypto::keys;
use anchored_docs::documents::processor::{
    DefaultProcessor, DocumentSender, Processor, SignatureRequester,
};
use anchored_docs::documents::{Document, DocumentType, PipelineStage, PurchaseOrderData};
use anchored_docs::identity::{Identity, IdentityConfig, IdentityId, IdentityService, MemIdentityService};
use anchored_docs::repository::MemRepository;
use anchored_docs::signatures::Signature;
use anchored_docs::{DocumentData, DocumentService};

/// Collaborators reachable by identity id.
#[derive(Default)]
pub struct Peers {
    services: RwLock<HashMap<IdentityId, Arc<DocumentService>>>,
}

impl Peers {
    pub fn add(&self, id: IdentityId, service: Arc<DocumentService>) {
        self.services.write().insert(id, service);
    }

    fn get(&self, id: &IdentityId) -> anyhow::Result<Arc<DocumentService>> {
        self.services
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("peer {} unreachable", id))
    }
}

pub struct PeerRequester(pub Arc<Peers>);

#[async_trait]
impl SignatureRequester for PeerRequester {
    async fn request_signature(
        &self,
        _ctx: &CancellationToken,
        collaborator: IdentityId,
        document: &CoreDocument,
    ) -> anyhow::Result<Signature> {
        let peer = self.0.get(&collaborator)?;
        Ok(peer.request_document_signature(document).await?)
    }
}

pub struct PeerSender(pub Arc<Peers>);

#[async_trait]
impl DocumentSender for PeerSender {
    async fn send(
        &self,
        _ctx: &CancellationToken,
        recipient: IdentityId,
        document: &CoreDocument,
    ) -> anyhow::Result<()> {
        let peer = self.0.get(&recipient)?;
        Ok(peer.receive_anchored_document(document).await?)
    }
}

/// Wraps a processor and fails at one stage.
pub struct FailingProcessor {
    pub inner: Arc<dyn Processor>,
    pub fail_at: PipelineStage,
}

impl FailingProcessor {
    fn check(&self, stage: PipelineStage) -> anyhow::Result<()> {
        if stage == self.fail_at {
            bail!("injected failure");
        }
        Ok(())
    }
}

#[async_trait]
impl Processor for FailingProcessor {
    async fn prepare_for_signature_requests(&self, doc: &mut Document) -> anyhow::Result<()> {
        self.check(PipelineStage::PrepareForSignatureRequests)?;
        self.inner.prepare_for_signature_requests(doc).await
    }

    async fn request_signatures(
        &self,
        ctx: &CancellationToken,
        doc: &mut Document,
    ) -> anyhow::Result<()> {
        self.check(PipelineStage::RequestSignatures)?;
        self.inner.request_signatures(ctx, doc).await
    }

    async fn prepare_for_anchoring(&self, doc: &mut Document) -> anyhow::Result<()> {
        self.check(PipelineStage::PrepareForAnchoring)?;
        self.inner.prepare_for_anchoring(doc).await
    }

    async fn anchor_document(&self, doc: &mut Document) -> anyhow::Result<()> {
        self.check(PipelineStage::AnchorDocument)?;
        self.inner.anchor_document(doc).await
    }

    async fn send_document(
        &self,
        ctx: &CancellationToken,
        doc: &mut Document,
    ) -> anyhow::Result<()> {
        self.check(PipelineStage::SendDocument)?;
        self.inner.send_document(ctx, doc).await
    }
}

/// Identity service whose lookups always fail.
pub struct UnreachableIdentityService;

#[async_trait]
impl IdentityService for UnreachableIdentityService {
    async fn lookup_identity(&self, id: &IdentityId) -> anyhow::Result<Arc<dyn Identity>> {
        bail!("identity contract for {} unreachable", id)
    }
}

pub struct Node {
    pub identity: IdentityConfig,
    pub repo: Arc<MemRepository>,
    pub processor: Arc<DefaultProcessor>,
    pub service: Arc<DocumentService>,
}

pub struct Network {
    pub identities: Arc<MemIdentityService>,
    pub anchors: Arc<MemAnchorRegistry>,
    pub peers: Arc<Peers>,
}

impl Network {
    pub fn new() -> Self {
        Network {
            identities: Arc::new(MemIdentityService::new()),
            anchors: Arc::new(MemAnchorRegistry::new()),
            peers: Arc::new(Peers::default()),
        }
    }

    pub fn identity(seed: u8) -> IdentityConfig {
        IdentityConfig::new(
            IdentityId::new([seed; 6]),
            keys::signing_key_from_seed(&[seed; 32]).unwrap(),
        )
    }

    /// A purchase order node with identity `[seed; 6]`, registered and reachable.
    pub fn node(&self, seed: u8) -> Node {
        let identity = Self::identity(seed);
        self.identities.register_identity(&identity);

        let repo = Arc::new(MemRepository::new());
        let processor = Arc::new(DefaultProcessor::new(
            identity.clone(),
            self.identities.clone(),
            self.anchors.clone(),
            Arc::new(PeerRequester(self.peers.clone())),
            Arc::new(PeerSender(self.peers.clone())),
        ));
        let service = Arc::new(self.service_with(repo.clone(), processor.clone(), &identity));
        self.peers.add(identity.id, service.clone());
        Node {
            identity,
            repo,
            processor,
            service,
        }
    }

    pub fn service_with(
        &self,
        repo: Arc<MemRepository>,
        processor: Arc<dyn Processor>,
        identity: &IdentityConfig,
    ) -> DocumentService {
        DocumentService::new(
            DocumentType::PurchaseOrder,
            repo,
            processor,
            self.identities.clone(),
            self.anchors.clone(),
        )
        .with_identity(identity.clone())
    }
}

pub fn purchase_order(po_number: &str, amount: i64) -> DocumentData {
    DocumentData::PurchaseOrder(PurchaseOrderData {
        po_number: po_number.into(),
        order_amount: amount,
        currency: "EUR".into(),
        ..Default::default()
    })
}
