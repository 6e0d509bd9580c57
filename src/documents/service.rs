// src/documents/service.rs
//! Document service: lifecycle pipeline, version lookup and proof generation.
//!
//! A service handles one document type. Creates and updates persist the new
//! version, then run the processor stages in order:
//! - prepare for signature requests (signing root, self-signature)
//! - request signatures from collaborators
//! - prepare for anchoring (re-validation, document root)
//! - anchoring
//! - sending to collaborators
//!
//! The stored record is refreshed after every stage up to anchoring, so a
//! failure leaves it at the last stage that succeeded.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::processor::Processor;
use super::validator::{
    create_validator, data_root_validator, update_validator, Validator, ValidatorGroup,
};
use super::{
    CreatePayload, Document, DocumentData, DocumentResponse, DocumentStatus, DocumentType,
    PipelineStage, UpdatePayload,
};
use crate::anchors::{self, AnchorRegistry};
use crate::coredocument::CoreDocument;
use crate::crypto::{from_hex_prefixed, Hash};
use crate::error::{DocumentError, Result};
use crate::identity::{IdentityConfig, IdentityService};
use crate::proofs::Proof;
use crate::repository::{self, Repository};
use crate::signatures::{self, Signature};

pub struct DocumentService {
    kind: DocumentType,
    repo: Arc<dyn Repository>,
    processor: Arc<dyn Processor>,
    identity_service: Arc<dyn IdentityService>,
    anchors: Arc<dyn AnchorRegistry>,
    identity: Option<IdentityConfig>,
    validators: ValidatorGroup,
}

impl DocumentService {
    pub fn new(
        kind: DocumentType,
        repo: Arc<dyn Repository>,
        processor: Arc<dyn Processor>,
        identity_service: Arc<dyn IdentityService>,
        anchors: Arc<dyn AnchorRegistry>,
    ) -> Self {
        DocumentService {
            kind,
            repo,
            processor,
            identity_service,
            anchors,
            identity: None,
            validators: ValidatorGroup::new(),
        }
    }

    /// Local identity used to sign documents received from other parties.
    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Extra check run on every create and update before the version is stored.
    pub fn with_validator(mut self, v: impl Validator + 'static) -> Self {
        self.validators = self.validators.with(v);
        self
    }

    pub fn document_type(&self) -> DocumentType {
        self.kind
    }

    fn check_type(&self, doc: &Document) -> Result<()> {
        if doc.document_type() != self.kind {
            return Err(DocumentError::UnknownDocumentType(format!(
                "{} service cannot handle {} documents",
                self.kind,
                doc.document_type()
            )));
        }
        Ok(())
    }

    fn check_data_type(&self, data: &DocumentData) -> Result<()> {
        if data.document_type() != self.kind {
            return Err(DocumentError::UnknownDocumentType(format!(
                "{} service cannot handle {} data",
                self.kind,
                data.document_type()
            )));
        }
        Ok(())
    }

    pub fn derive_from_create_payload(&self, payload: CreatePayload) -> Result<Document> {
        if let Some(data) = &payload.data {
            self.check_data_type(data)?;
        }
        Document::from_create_payload(payload)
    }

    /// New version of the document named in `payload`, built on its latest version.
    pub fn derive_from_update_payload(&self, payload: UpdatePayload) -> Result<Document> {
        let data = payload
            .data
            .ok_or_else(|| DocumentError::InvalidPayload("input is nil".into()))?;
        self.check_data_type(&data)?;
        let document_id = from_hex_prefixed(&payload.document_id).map_err(|e| {
            DocumentError::InvalidPayload(format!(
                "invalid document identifier {:?}: {}",
                payload.document_id, e
            ))
        })?;
        let collaborators = super::parse_collaborators(&payload.collaborators)?;
        let old = repository::get_current_version(self.repo.as_ref(), &document_id)?;
        old.prepare_new_version(data, &collaborators)
    }

    /// Store a new document and run the pipeline. Returns the processed model.
    pub async fn create(&self, ctx: &CancellationToken, mut doc: Document) -> Result<Document> {
        self.check_type(&doc)?;
        doc.calculate_data_root()?;
        create_validator(self.repo.clone())
            .with(data_root_validator())
            .merge(&self.validators)
            .validate(None, &doc)?;
        self.repo.create(doc.current_version(), &doc)?;
        log::info!(
            "Created {} {}",
            self.kind,
            hex::encode(doc.document_id())
        );
        self.run_pipeline(ctx, doc).await
    }

    /// Store a successor of the current version and run the pipeline.
    pub async fn update(&self, ctx: &CancellationToken, mut doc: Document) -> Result<Document> {
        self.check_type(&doc)?;
        let old = repository::get_current_version(self.repo.as_ref(), doc.document_id())?;
        doc.calculate_data_root()?;
        update_validator()
            .with(data_root_validator())
            .merge(&self.validators)
            .validate(Some(&old), &doc)?;
        self.repo.create(doc.current_version(), &doc)?;
        log::info!(
            "Updated {} {} to version {}",
            self.kind,
            hex::encode(doc.document_id()),
            hex::encode(doc.current_version())
        );
        self.run_pipeline(ctx, doc).await
    }

    pub async fn create_from_payload(
        &self,
        ctx: &CancellationToken,
        payload: CreatePayload,
    ) -> Result<Document> {
        let doc = self.derive_from_create_payload(payload)?;
        self.create(ctx, doc).await
    }

    pub async fn update_from_payload(
        &self,
        ctx: &CancellationToken,
        payload: UpdatePayload,
    ) -> Result<Document> {
        let doc = self.derive_from_update_payload(payload)?;
        self.update(ctx, doc).await
    }

    async fn run_stage(
        &self,
        ctx: &CancellationToken,
        stage: PipelineStage,
        doc: &mut Document,
    ) -> anyhow::Result<()> {
        match stage {
            PipelineStage::PrepareForSignatureRequests => {
                self.processor.prepare_for_signature_requests(doc).await
            }
            PipelineStage::RequestSignatures => self.processor.request_signatures(ctx, doc).await,
            PipelineStage::PrepareForAnchoring => self.processor.prepare_for_anchoring(doc).await,
            PipelineStage::AnchorDocument => self.processor.anchor_document(doc).await,
            PipelineStage::SendDocument => self.processor.send_document(ctx, doc).await,
        }
    }

    async fn run_pipeline(&self, ctx: &CancellationToken, mut doc: Document) -> Result<Document> {
        for stage in PipelineStage::ALL {
            if ctx.is_cancelled() {
                log::warn!(
                    "Pipeline for {} cancelled before {}",
                    hex::encode(doc.current_version()),
                    stage
                );
                return Err(DocumentError::Cancelled(stage));
            }

            if let Err(e) = self.run_stage(ctx, stage, &mut doc).await {
                log::error!(
                    "{} failed for {}: {:#}",
                    stage,
                    hex::encode(doc.current_version()),
                    e
                );
                return Err(DocumentError::stage(stage, e));
            }

            if let Some(status) = stage.status_after() {
                if doc.status < status {
                    doc.status = status;
                }
            }
            // the anchored record is sealed; delivery is not persisted
            if stage != PipelineStage::SendDocument {
                self.repo.update(doc.current_version(), &doc)?;
            }
            log::debug!(
                "{} done for {}",
                stage,
                hex::encode(doc.current_version())
            );
        }
        Ok(doc)
    }

    pub fn get_current_version(&self, document_id: &[u8]) -> Result<Document> {
        repository::get_current_version(self.repo.as_ref(), document_id)
    }

    pub fn get_version(&self, document_id: &[u8], version: &[u8]) -> Result<Document> {
        repository::get_version(self.repo.as_ref(), document_id, version)
    }

    /// Proofs for `fields` of the latest version of `document_id`.
    pub async fn create_proofs<S: AsRef<str> + Sync>(
        &self,
        document_id: &[u8],
        fields: &[S],
    ) -> Result<Proof> {
        let doc = self.get_current_version(document_id)?;
        self.proofs_for(&doc, fields).await
    }

    /// Proofs for `fields` of a specific version of `document_id`.
    pub async fn create_proofs_for_version<S: AsRef<str> + Sync>(
        &self,
        document_id: &[u8],
        version: &[u8],
        fields: &[S],
    ) -> Result<Proof> {
        let doc = self.get_version(document_id, version)?;
        self.proofs_for(&doc, fields).await
    }

    async fn proofs_for<S: AsRef<str> + Sync>(&self, doc: &Document, fields: &[S]) -> Result<Proof> {
        self.check_type(doc)?;
        self.validate_anchored(doc).await?;
        let field_proofs = doc.create_proofs(fields)?;
        log::debug!(
            "Created {} field proofs for version {}",
            field_proofs.len(),
            hex::encode(doc.current_version())
        );
        Ok(Proof {
            document_id: doc.core.document_identifier.clone(),
            version_id: doc.core.current_version.clone(),
            field_proofs,
        })
    }

    /// Recompute the roots, validate every signature and confirm the anchor.
    async fn validate_anchored(&self, doc: &Document) -> Result<()> {
        let signing_root = doc
            .core
            .signing_root
            .ok_or_else(|| DocumentError::MissingSigningRoot(doc.core.current_version.clone()))?;
        let document_root = doc.verify_roots()?;
        self.validate_signatures(doc, &signing_root).await?;
        anchors::verify_anchored(self.anchors.as_ref(), doc.current_version(), &document_root)
            .await?;
        Ok(())
    }

    async fn validate_signatures(&self, doc: &Document, signing_root: &Hash) -> Result<()> {
        for signature in &doc.core.signatures {
            signatures::validate_signature(self.identity_service.as_ref(), signature, signing_root)
                .await?;
        }
        Ok(())
    }

    pub fn derive_data(&self, doc: &Document) -> Result<DocumentData> {
        self.check_type(doc)?;
        Ok(doc.data.clone())
    }

    pub fn derive_response(&self, doc: &Document) -> Result<DocumentResponse> {
        self.check_type(doc)?;
        Ok(doc.response())
    }

    /// Sign a core document received from another collaborator and store it.
    pub async fn request_document_signature(&self, cd: &CoreDocument) -> Result<Signature> {
        let identity = self.identity.as_ref().ok_or_else(|| {
            DocumentError::ValidationFailed("no signing identity configured".into())
        })?;

        if cd.document_root.is_some() {
            return Err(DocumentError::AlreadyAnchored(cd.current_version.clone()));
        }
        if !cd.collaborators.contains(&identity.id) {
            return Err(DocumentError::ValidationFailed(format!(
                "{} is not a collaborator on version {}",
                identity.id,
                hex::encode(&cd.current_version)
            )));
        }

        let mut doc = Document::from_core_document(cd)?;
        self.check_type(&doc)?;
        doc.data.validate()?;
        let signing_root = doc
            .core
            .signing_root
            .ok_or_else(|| DocumentError::MissingSigningRoot(doc.core.current_version.clone()))?;
        self.validate_signatures(&doc, &signing_root).await?;

        let signature = doc.sign(identity)?;
        self.store_received(&doc)?;
        log::info!(
            "Signed version {} of {} as {}",
            hex::encode(doc.current_version()),
            hex::encode(doc.document_id()),
            identity.id
        );
        Ok(signature)
    }

    /// Validate and store an anchored core document sent by another collaborator.
    pub async fn receive_anchored_document(&self, cd: &CoreDocument) -> Result<()> {
        let mut doc = Document::from_core_document(cd)?;
        self.check_type(&doc)?;
        if doc.core.document_root.is_none() {
            return Err(DocumentError::ValidationFailed(format!(
                "received version {} carries no document root",
                hex::encode(doc.current_version())
            )));
        }

        if let Some(previous) = doc.core.previous_version.clone() {
            if self.repo.exists(&previous) {
                let old = self.repo.get(&previous)?;
                update_validator().validate(Some(&old), &doc)?;
            }
        }

        self.validate_anchored(&doc).await?;
        doc.status = DocumentStatus::Anchored;
        self.store_received(&doc)?;
        log::info!(
            "Received anchored version {} of {}",
            hex::encode(doc.current_version()),
            hex::encode(doc.document_id())
        );
        Ok(())
    }

    fn store_received(&self, doc: &Document) -> Result<()> {
        let id = doc.current_version();
        match self.repo.create(id, doc) {
            Err(DocumentError::AlreadyExists(_)) => self.repo.update(id, doc),
            r => r,
        }
    }
}
