// src/documents/mod.rs
//! Document models: the core envelope plus one typed payload variant.

pub mod invoice;
pub mod processor;
pub mod purchase_order;
pub mod service;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coredocument::{CoreDocument, EmbeddedData};
use crate::crypto::{to_hex_prefixed, Hash};
use crate::error::{DocumentError, Result};
use crate::identity::{IdentityConfig, IdentityId};
use crate::proofs::{DocumentTree, Field, FieldProof, Salts};
use crate::signatures::{self, Signature};

pub use invoice::InvoiceData;
pub use purchase_order::PurchaseOrderData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    PurchaseOrder,
    Invoice,
}

impl DocumentType {
    pub fn data_type_url(&self) -> &'static str {
        match self {
            DocumentType::PurchaseOrder => purchase_order::PURCHASE_ORDER_DATA_TYPE_URL,
            DocumentType::Invoice => invoice::INVOICE_DATA_TYPE_URL,
        }
    }

    pub fn salts_type_url(&self) -> &'static str {
        match self {
            DocumentType::PurchaseOrder => purchase_order::PURCHASE_ORDER_SALTS_TYPE_URL,
            DocumentType::Invoice => invoice::INVOICE_SALTS_TYPE_URL,
        }
    }

    pub fn from_data_type_url(url: &str) -> Result<Self> {
        [DocumentType::PurchaseOrder, DocumentType::Invoice]
            .into_iter()
            .find(|t| t.data_type_url() == url)
            .ok_or_else(|| DocumentError::UnknownDocumentType(url.to_string()))
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::PurchaseOrder => f.write_str("purchase order"),
            DocumentType::Invoice => f.write_str("invoice"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DocumentData {
    PurchaseOrder(PurchaseOrderData),
    Invoice(InvoiceData),
}

impl DocumentData {
    pub fn document_type(&self) -> DocumentType {
        match self {
            DocumentData::PurchaseOrder(_) => DocumentType::PurchaseOrder,
            DocumentData::Invoice(_) => DocumentType::Invoice,
        }
    }

    pub fn fields(&self) -> Vec<Field> {
        match self {
            DocumentData::PurchaseOrder(po) => po.fields(),
            DocumentData::Invoice(inv) => inv.fields(),
        }
    }

    pub fn field_names(&self) -> &'static [&'static str] {
        match self {
            DocumentData::PurchaseOrder(_) => &PurchaseOrderData::FIELD_NAMES,
            DocumentData::Invoice(_) => &InvoiceData::FIELD_NAMES,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            DocumentData::PurchaseOrder(po) => po.validate(),
            DocumentData::Invoice(inv) => inv.validate(),
        }
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(match self {
            DocumentData::PurchaseOrder(po) => serde_json::to_vec(po)?,
            DocumentData::Invoice(inv) => serde_json::to_vec(inv)?,
        })
    }

    fn decode(kind: DocumentType, bytes: &[u8]) -> Result<Self> {
        Ok(match kind {
            DocumentType::PurchaseOrder => DocumentData::PurchaseOrder(serde_json::from_slice(bytes)?),
            DocumentType::Invoice => DocumentData::Invoice(serde_json::from_slice(bytes)?),
        })
    }
}

/// Lifecycle of a version; it only moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentStatus {
    Derived,
    DataRooted,
    SignaturesRequested,
    Anchored,
    Distributed,
}

/// Processor stages, run in this order by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    PrepareForSignatureRequests,
    RequestSignatures,
    PrepareForAnchoring,
    AnchorDocument,
    SendDocument,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 5] = [
        PipelineStage::PrepareForSignatureRequests,
        PipelineStage::RequestSignatures,
        PipelineStage::PrepareForAnchoring,
        PipelineStage::AnchorDocument,
        PipelineStage::SendDocument,
    ];

    /// Status a document reaches once this stage succeeds.
    pub fn status_after(&self) -> Option<DocumentStatus> {
        match self {
            PipelineStage::RequestSignatures => Some(DocumentStatus::SignaturesRequested),
            PipelineStage::AnchorDocument => Some(DocumentStatus::Anchored),
            PipelineStage::SendDocument => Some(DocumentStatus::Distributed),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::PrepareForSignatureRequests => "prepare for signature requests",
            PipelineStage::RequestSignatures => "request signatures",
            PipelineStage::PrepareForAnchoring => "prepare for anchoring",
            PipelineStage::AnchorDocument => "anchoring",
            PipelineStage::SendDocument => "send document",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayload {
    pub collaborators: Vec<String>,
    pub data: Option<DocumentData>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// Hex document identifier of the document being updated.
    pub document_id: String,
    pub collaborators: Vec<String>,
    pub data: Option<DocumentData>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub document_id: String,
    pub version_id: String,
    pub collaborators: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub header: ResponseHeader,
    pub data: DocumentData,
}

/// Parse hex collaborator ids, rejecting malformed and duplicate entries.
pub fn parse_collaborators(collaborators: &[String]) -> Result<Vec<IdentityId>> {
    let mut out: Vec<IdentityId> = Vec::with_capacity(collaborators.len());
    for c in collaborators {
        let id = IdentityId::from_hex(c)?;
        if out.contains(&id) {
            return Err(DocumentError::InvalidPayload(format!(
                "duplicate collaborator {}",
                id
            )));
        }
        out.push(id);
    }
    Ok(out)
}

/// One version of a typed document: envelope, payload and payload salts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub core: CoreDocument,
    pub data: DocumentData,
    pub salts: Salts,
    pub status: DocumentStatus,
}

impl Document {
    pub fn new(data: DocumentData, collaborators: &[IdentityId]) -> Result<Self> {
        data.validate()?;
        let mut core = CoreDocument::new();
        for c in collaborators {
            core.add_collaborator(*c)?;
        }
        let salts = Salts::generate(data.field_names().iter().copied());
        Ok(Document {
            core,
            data,
            salts,
            status: DocumentStatus::Derived,
        })
    }

    pub fn from_create_payload(payload: CreatePayload) -> Result<Self> {
        let data = payload
            .data
            .ok_or_else(|| DocumentError::InvalidPayload("input is nil".into()))?;
        let collaborators = parse_collaborators(&payload.collaborators)?;
        Self::new(data, &collaborators)
    }

    /// Successor version carrying `data`. The document type cannot change.
    pub fn prepare_new_version(
        &self,
        data: DocumentData,
        collaborators: &[IdentityId],
    ) -> Result<Self> {
        if data.document_type() != self.document_type() {
            return Err(DocumentError::UnknownDocumentType(format!(
                "cannot update {} with {} data",
                self.document_type(),
                data.document_type()
            )));
        }
        data.validate()?;
        let core = self.core.prepare_new_version(collaborators)?;
        let salts = Salts::generate(data.field_names().iter().copied());
        Ok(Document {
            core,
            data,
            salts,
            status: DocumentStatus::Derived,
        })
    }

    pub fn document_type(&self) -> DocumentType {
        self.data.document_type()
    }

    pub fn document_id(&self) -> &[u8] {
        &self.core.document_identifier
    }

    pub fn current_version(&self) -> &[u8] {
        &self.core.current_version
    }

    pub fn is_anchored(&self) -> bool {
        self.status >= DocumentStatus::Anchored
    }

    pub fn tree(&self) -> Result<DocumentTree> {
        DocumentTree::build(self.data.fields(), &self.salts)
    }

    pub fn calculate_data_root(&mut self) -> Result<Hash> {
        let root = self.tree()?.root_hash();
        self.core.data_root = Some(root);
        if self.status < DocumentStatus::DataRooted {
            self.status = DocumentStatus::DataRooted;
        }
        Ok(root)
    }

    pub fn calculate_signing_root(&mut self) -> Result<Hash> {
        self.core.calculate_signing_root()
    }

    pub fn calculate_document_root(&mut self) -> Result<Hash> {
        self.core.calculate_document_root()
    }

    /// Recompute every root from the stored payload, salts and signatures and
    /// compare with the stored values. Returns the document root.
    pub fn verify_roots(&self) -> Result<Hash> {
        let version = self.core.current_version.clone();
        let stored_data = self
            .core
            .data_root
            .ok_or_else(|| DocumentError::MissingDataRoot(version.clone()))?;
        let data_root = self.tree()?.root_hash();
        if data_root != stored_data {
            return Err(DocumentError::RootMismatch {
                expected: stored_data,
                actual: data_root,
            });
        }

        let stored_signing = self
            .core
            .signing_root
            .ok_or_else(|| DocumentError::MissingSigningRoot(version.clone()))?;
        let signing_root = self.core.compute_signing_root()?;
        if signing_root != stored_signing {
            return Err(DocumentError::RootMismatch {
                expected: stored_signing,
                actual: signing_root,
            });
        }

        let document_root = self.core.compute_document_root()?;
        if let Some(stored) = self.core.document_root {
            if stored != document_root {
                return Err(DocumentError::RootMismatch {
                    expected: stored,
                    actual: document_root,
                });
            }
        }
        Ok(document_root)
    }

    /// Append a signature over the signing root. The data and signing roots
    /// are recomputed first and must match; anchored versions are sealed.
    pub fn add_signature(&mut self, signature: Signature) -> Result<()> {
        if self.is_anchored() {
            return Err(DocumentError::AlreadyAnchored(self.core.current_version.clone()));
        }

        let version = self.core.current_version.clone();
        let stored_data = self
            .core
            .data_root
            .ok_or_else(|| DocumentError::MissingDataRoot(version.clone()))?;
        let data_root = self.tree()?.root_hash();
        if data_root != stored_data {
            return Err(DocumentError::RootMismatch {
                expected: stored_data,
                actual: data_root,
            });
        }

        let signing_root = self
            .core
            .signing_root
            .ok_or(DocumentError::MissingSigningRoot(version))?;
        let recomputed = self.core.compute_signing_root()?;
        if recomputed != signing_root {
            return Err(DocumentError::RootMismatch {
                expected: signing_root,
                actual: recomputed,
            });
        }

        let signer = signature.entity_id.to_string();
        if self
            .core
            .signatures
            .iter()
            .any(|s| s.entity_id == signature.entity_id)
        {
            return Err(DocumentError::InvalidSignature {
                signer,
                reason: "duplicate signature".into(),
            });
        }
        if !signatures::verify(&signature, &signing_root, &signature.public_key) {
            return Err(DocumentError::InvalidSignature {
                signer,
                reason: "signature does not match signing root".into(),
            });
        }

        self.core.signatures.push(signature);
        // stale until recomputed
        self.core.document_root = None;
        Ok(())
    }

    /// Sign the signing root with `identity` and append the signature.
    pub fn sign(&mut self, identity: &IdentityConfig) -> Result<Signature> {
        let signing_root = self
            .core
            .signing_root
            .ok_or_else(|| DocumentError::MissingSigningRoot(self.core.current_version.clone()))?;
        let signature = signatures::sign(identity, &signing_root);
        self.add_signature(signature.clone())?;
        Ok(signature)
    }

    /// Field proofs extended up to the document root.
    pub fn create_proofs<S: AsRef<str>>(&self, fields: &[S]) -> Result<Vec<FieldProof>> {
        let mut proofs = self.tree()?.create_proofs(fields)?;
        let path = self.core.data_root_path()?;
        for p in proofs.iter_mut() {
            p.extend(&path);
        }
        Ok(proofs)
    }

    /// Core document with the payload and salts embedded.
    pub fn pack_core_document(&self) -> Result<CoreDocument> {
        let kind = self.document_type();
        let mut cd = self.core.clone();
        cd.embedded_data = Some(EmbeddedData {
            type_url: kind.data_type_url().to_string(),
            value: self.data.encode()?,
        });
        cd.embedded_data_salts = Some(EmbeddedData {
            type_url: kind.salts_type_url().to_string(),
            value: serde_json::to_vec(&self.salts)?,
        });
        Ok(cd)
    }

    pub fn from_core_document(cd: &CoreDocument) -> Result<Self> {
        let embedded = cd
            .embedded_data
            .as_ref()
            .ok_or_else(|| DocumentError::InvalidPayload("embedded data missing".into()))?;
        let kind = DocumentType::from_data_type_url(&embedded.type_url)?;
        Self::unpack(kind, cd)
    }

    /// Replace this model with the content of `cd`, which must carry the same
    /// document type.
    pub fn unpack_core_document(&mut self, cd: &CoreDocument) -> Result<()> {
        *self = Self::unpack(self.document_type(), cd)?;
        Ok(())
    }

    fn unpack(kind: DocumentType, cd: &CoreDocument) -> Result<Self> {
        let embedded = cd
            .embedded_data
            .as_ref()
            .ok_or_else(|| DocumentError::InvalidPayload("embedded data missing".into()))?;
        if embedded.type_url != kind.data_type_url() {
            return Err(DocumentError::UnknownDocumentType(embedded.type_url.clone()));
        }
        let salts_blob = cd
            .embedded_data_salts
            .as_ref()
            .ok_or_else(|| DocumentError::InvalidPayload("embedded data salts missing".into()))?;
        if salts_blob.type_url != kind.salts_type_url() {
            return Err(DocumentError::UnknownDocumentType(salts_blob.type_url.clone()));
        }
        if cd.data_root.is_none() {
            return Err(DocumentError::InvalidPayload(format!(
                "data root missing for version {}",
                hex::encode(&cd.current_version)
            )));
        }

        let data = DocumentData::decode(kind, &embedded.value)?;
        let salts: Salts = serde_json::from_slice(&salts_blob.value)?;

        let mut core = cd.clone();
        core.embedded_data = None;
        core.embedded_data_salts = None;

        let status = if core.document_root.is_some() {
            DocumentStatus::Anchored
        } else if core.signing_root.is_some() {
            DocumentStatus::SignaturesRequested
        } else {
            DocumentStatus::DataRooted
        };

        Ok(Document {
            core,
            data,
            salts,
            status,
        })
    }

    pub fn response(&self) -> DocumentResponse {
        DocumentResponse {
            header: ResponseHeader {
                document_id: to_hex_prefixed(&self.core.document_identifier),
                version_id: to_hex_prefixed(&self.core.current_version),
                collaborators: self.core.collaborators.iter().map(|c| c.to_hex()).collect(),
            },
            data: self.data.clone(),
        }
    }
}

pub(crate) fn validate_currency(currency: &str) -> Result<()> {
    if currency.is_empty() {
        return Ok(());
    }
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(DocumentError::InvalidPayload(format!(
            "invalid currency code {:?}",
            currency
        )));
    }
    Ok(())
}

pub(crate) fn validate_amount(name: &str, amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(DocumentError::InvalidPayload(format!(
            "{} must not be negative: {}",
            name, amount
        )));
    }
    Ok(())
}

/// Serde adapter rendering bytes as `0x`-prefixed hex.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        if bytes.is_empty() {
            return s.serialize_str("");
        }
        s.serialize_str(&crate::crypto::to_hex_prefixed(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        crate::crypto::from_hex_prefixed(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys;

    fn po() -> DocumentData {
        DocumentData::PurchaseOrder(PurchaseOrderData {
            po_number: "test_po".into(),
            order_amount: 42,
            currency: "EUR".into(),
            ..Default::default()
        })
    }

    fn identity() -> IdentityConfig {
        IdentityConfig::new(
            IdentityId::new([1, 2, 3, 4, 5, 6]),
            keys::signing_key_from_seed(&[8u8; 32]).unwrap(),
        )
    }

    #[test]
    fn create_payload_requires_data() {
        let err = Document::from_create_payload(CreatePayload::default()).unwrap_err();
        assert!(matches!(err, DocumentError::InvalidPayload(_)));
        assert!(err.to_string().contains("input is nil"));
    }

    #[test]
    fn create_payload_rejects_bad_collaborators() {
        let payload = CreatePayload {
            collaborators: vec!["0x010203".into()],
            data: Some(po()),
        };
        assert!(matches!(
            Document::from_create_payload(payload),
            Err(DocumentError::InvalidPayload(_))
        ));

        let payload = CreatePayload {
            collaborators: vec!["0x010101010101".into(), "0x010101010101".into()],
            data: Some(po()),
        };
        assert!(matches!(
            Document::from_create_payload(payload),
            Err(DocumentError::InvalidPayload(_))
        ));
    }

    #[test]
    fn data_root_then_status() {
        let mut doc = Document::new(po(), &[]).unwrap();
        assert_eq!(doc.status, DocumentStatus::Derived);
        assert!(doc.core.data_root.is_none());
        let root = doc.calculate_data_root().unwrap();
        assert_eq!(doc.core.data_root, Some(root));
        assert_eq!(doc.status, DocumentStatus::DataRooted);
        // deterministic
        assert_eq!(doc.calculate_data_root().unwrap(), root);
    }

    #[test]
    fn pack_unpack_round_trip() {
        let mut doc = Document::new(po(), &[IdentityId::new([1; 6])]).unwrap();
        doc.calculate_data_root().unwrap();
        let cd = doc.pack_core_document().unwrap();
        assert!(cd.embedded_data.is_some());

        let back = Document::from_core_document(&cd).unwrap();
        assert_eq!(back.data, doc.data);
        assert_eq!(back.salts, doc.salts);
        assert_eq!(back.core, doc.core);
    }

    #[test]
    fn unpacked_status_follows_roots() {
        let mut doc = Document::new(po(), &[]).unwrap();
        doc.calculate_data_root().unwrap();
        let cd = doc.pack_core_document().unwrap();
        assert_eq!(Document::from_core_document(&cd).unwrap().status, DocumentStatus::DataRooted);

        doc.calculate_signing_root().unwrap();
        let mut cd = doc.pack_core_document().unwrap();
        assert_eq!(
            Document::from_core_document(&cd).unwrap().status,
            DocumentStatus::SignaturesRequested
        );

        cd.document_root = Some([1u8; 32]);
        let anchored = Document::from_core_document(&cd).unwrap();
        assert!(anchored.is_anchored());
    }

    #[test]
    fn unpack_rejects_wrong_type() {
        let mut doc = Document::new(po(), &[]).unwrap();
        doc.calculate_data_root().unwrap();
        let mut cd = doc.pack_core_document().unwrap();

        let mut invoice = Document::new(
            DocumentData::Invoice(InvoiceData {
                invoice_number: "inv".into(),
                ..Default::default()
            }),
            &[],
        )
        .unwrap();
        assert!(matches!(
            invoice.unpack_core_document(&cd),
            Err(DocumentError::UnknownDocumentType(_))
        ));

        cd.embedded_data.as_mut().unwrap().type_url = "unknown".into();
        assert!(matches!(
            Document::from_core_document(&cd),
            Err(DocumentError::UnknownDocumentType(_))
        ));

        cd.embedded_data = None;
        assert!(matches!(
            Document::from_core_document(&cd),
            Err(DocumentError::InvalidPayload(_))
        ));
    }

    #[test]
    fn unpack_requires_data_root() {
        let doc = Document::new(po(), &[]).unwrap();
        let cd = doc.pack_core_document().unwrap();
        assert!(matches!(
            Document::from_core_document(&cd),
            Err(DocumentError::InvalidPayload(_))
        ));
    }

    #[test]
    fn signature_requires_matching_data_root() {
        let id = identity();
        let mut doc = Document::new(po(), &[]).unwrap();
        assert!(matches!(doc.sign(&id), Err(DocumentError::MissingSigningRoot(_))));

        doc.calculate_data_root().unwrap();
        doc.calculate_signing_root().unwrap();

        let mut tampered = doc.clone();
        if let DocumentData::PurchaseOrder(po) = &mut tampered.data {
            po.order_amount = 43;
        }
        assert!(matches!(
            tampered.sign(&id),
            Err(DocumentError::RootMismatch { .. })
        ));

        doc.sign(&id).unwrap();
        assert_eq!(doc.core.signatures.len(), 1);
        assert!(matches!(
            doc.sign(&id),
            Err(DocumentError::InvalidSignature { .. })
        ));
    }

    #[test]
    fn anchored_document_is_sealed() {
        let id = identity();
        let mut doc = Document::new(po(), &[]).unwrap();
        doc.calculate_data_root().unwrap();
        doc.calculate_signing_root().unwrap();
        doc.status = DocumentStatus::Anchored;
        assert!(matches!(doc.sign(&id), Err(DocumentError::AlreadyAnchored(_))));
    }

    #[test]
    fn proofs_verify_against_document_root() {
        let id = identity();
        let mut doc = Document::new(po(), &[]).unwrap();
        doc.calculate_data_root().unwrap();
        doc.calculate_signing_root().unwrap();
        doc.sign(&id).unwrap();
        let document_root = doc.calculate_document_root().unwrap();
        assert_eq!(doc.verify_roots().unwrap(), document_root);

        let proofs = doc.create_proofs(&["po_number", "order_amount"]).unwrap();
        assert!(proofs.iter().all(|p| p.verify(&document_root)));
        assert!(!proofs[0].verify(&doc.core.data_root.unwrap()));
    }

    #[test]
    fn response_renders_collaborators_in_order() {
        let a = IdentityId::new([1; 6]);
        let b = IdentityId::new([2; 6]);
        let doc = Document::new(po(), &[b, a]).unwrap();
        let r = doc.response();
        assert_eq!(r.header.collaborators, vec!["0x020202020202", "0x010101010101"]);
        assert_eq!(r.data, po());
        assert_eq!(r.header.document_id, r.header.version_id);
    }

    #[test]
    fn new_version_keeps_type() {
        let mut doc = Document::new(po(), &[]).unwrap();
        doc.calculate_data_root().unwrap();
        let invoice = DocumentData::Invoice(InvoiceData {
            invoice_number: "inv".into(),
            ..Default::default()
        });
        assert!(matches!(
            doc.prepare_new_version(invoice, &[]),
            Err(DocumentError::UnknownDocumentType(_))
        ));
        let next = doc.prepare_new_version(po(), &[]).unwrap();
        assert_eq!(next.core.current_version, doc.core.next_version);
        assert_ne!(next.salts, doc.salts);
    }
}
