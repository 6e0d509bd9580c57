// tests/lifecycle.rs
mod common;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use anchored_docs::anchors::{AnchorId, AnchorRegistry};
use anchored_docs::crypto::to_hex_prefixed;
use anchored_docs::documents::processor::Processor;
use anchored_docs::documents::{CreatePayload, InvoiceData, UpdatePayload};
use anchored_docs::repository::MemRepository;
use anchored_docs::proofs::FieldValue;
use anchored_docs::repository::Repository;
use anchored_docs::{
    Document, DocumentData, DocumentError, DocumentService, DocumentStatus, DocumentType,
    PipelineStage,
};

use common::{purchase_order, FailingProcessor, Network, UnreachableIdentityService};

fn create_payload(data: DocumentData, collaborators: &[&str]) -> CreatePayload {
    CreatePayload {
        collaborators: collaborators.iter().map(|c| c.to_string()).collect(),
        data: Some(data),
    }
}

#[tokio::test]
async fn po_number_proof_end_to_end() {
    let net = Network::new();
    let alice = net.node(1);
    let bob = net.node(2);
    let ctx = CancellationToken::new();

    let doc = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("test_po", 42), &["0x020202020202"]))
        .await
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Distributed);
    assert_eq!(doc.core.signatures.len(), 2);
    let document_root = doc.core.document_root.unwrap();

    let stored = alice.repo.get(doc.current_version()).unwrap();
    assert_eq!(stored.status, DocumentStatus::Anchored);

    let proof = alice
        .service
        .create_proofs(doc.document_id(), &["po_number"])
        .await
        .unwrap();
    assert_eq!(proof.document_id, doc.core.document_identifier);
    assert_eq!(proof.version_id, doc.core.current_version);
    assert_eq!(proof.field_proofs.len(), 1);
    assert_eq!(proof.field_proofs[0].property, "po_number");
    assert_eq!(proof.field_proofs[0].value, FieldValue::Str("test_po".into()));
    assert!(proof.verify(&document_root));

    let anchored = net
        .anchors
        .get_document_root_of(&AnchorId::from_version(doc.current_version()).unwrap())
        .await
        .unwrap();
    assert_eq!(anchored, Some(document_root));

    // the collaborator received the anchored version and can prove it too
    let received = bob.repo.get(doc.current_version()).unwrap();
    assert_eq!(received.status, DocumentStatus::Anchored);
    let bob_proof = bob
        .service
        .create_proofs(doc.document_id(), &["po_number"])
        .await
        .unwrap();
    assert!(bob_proof.verify(&document_root));
}

#[tokio::test]
async fn historical_version_stays_provable() {
    let net = Network::new();
    let alice = net.node(1);
    let _bob = net.node(2);
    let ctx = CancellationToken::new();

    let v1 = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-7", 42), &["0x020202020202"]))
        .await
        .unwrap();

    let v2 = alice
        .service
        .update_from_payload(
            &ctx,
            UpdatePayload {
                document_id: to_hex_prefixed(v1.document_id()),
                collaborators: vec![],
                data: Some(purchase_order("po-7", 50)),
            },
        )
        .await
        .unwrap();
    assert_eq!(v2.core.current_version, v1.core.next_version);
    assert_eq!(v2.core.previous_version.as_deref(), Some(v1.current_version()));

    let tip = alice.service.get_current_version(v1.document_id()).unwrap();
    assert_eq!(tip.core.current_version, v2.core.current_version);

    let old = alice
        .service
        .create_proofs_for_version(v1.document_id(), v1.current_version(), &["order_amount"])
        .await
        .unwrap();
    assert_eq!(old.version_id, v1.core.current_version);
    assert_eq!(old.field_proofs[0].value, FieldValue::Int(42));
    assert!(old.verify(&v1.core.document_root.unwrap()));
    assert!(!old.verify(&v2.core.document_root.unwrap()));

    let latest = alice
        .service
        .create_proofs(v1.document_id(), &["order_amount"])
        .await
        .unwrap();
    assert_eq!(latest.field_proofs[0].value, FieldValue::Int(50));
    assert!(latest.verify(&v2.core.document_root.unwrap()));
}

#[tokio::test]
async fn proofs_require_signing_root() {
    let net = Network::new();
    let alice = net.node(1);

    let mut doc = Document::new(purchase_order("po-1", 1), &[]).unwrap();
    doc.calculate_data_root().unwrap();
    alice.repo.create(doc.current_version(), &doc).unwrap();

    let err = alice
        .service
        .create_proofs(doc.document_id(), &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::MissingSigningRoot(_)));
}

#[tokio::test]
async fn proofs_require_matching_anchor() {
    let net = Network::new();
    let alice = net.node(1);

    let mut doc = Document::new(purchase_order("po-1", 1), &[]).unwrap();
    doc.calculate_data_root().unwrap();
    doc.calculate_signing_root().unwrap();
    doc.sign(&alice.identity).unwrap();
    doc.calculate_document_root().unwrap();
    alice.repo.create(doc.current_version(), &doc).unwrap();

    let err = alice
        .service
        .create_proofs(doc.document_id(), &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::NotAnchored(_)));

    net.anchors
        .commit_anchor(AnchorId::from_version(doc.current_version()).unwrap(), [3u8; 32])
        .await
        .unwrap();
    let err = alice
        .service
        .create_proofs(doc.document_id(), &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::RootMismatch { .. }));
}

#[tokio::test]
async fn tampered_payload_is_detected() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let doc = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-1", 10), &[]))
        .await
        .unwrap();

    // rewrite the stored payload behind the service's back
    let repo = Arc::new(MemRepository::new());
    let mut tampered = alice.repo.get(doc.current_version()).unwrap();
    tampered.data = purchase_order("po-1", 11);
    repo.create(doc.current_version(), &tampered).unwrap();
    let service = net.service_with(repo, alice.processor.clone(), &alice.identity);

    let err = service
        .create_proofs(doc.document_id(), &["order_amount"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::RootMismatch { .. }));
}

#[tokio::test]
async fn unknown_field_and_missing_documents() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let doc = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-1", 1), &[]))
        .await
        .unwrap();

    let err = alice
        .service
        .create_proofs(doc.document_id(), &["po_number", "not_a_field"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::FieldNotFound(ref f) if f == "not_a_field"));

    let err = alice
        .service
        .create_proofs(&[9u8; 32], &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::NotFound(_)));

    let err = alice
        .service
        .create_proofs_for_version(doc.document_id(), &[9u8; 32], &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::VersionNotFound { .. }));
    assert!(err.to_string().contains("is not valid for identifier"));
}

#[tokio::test]
async fn stage_failures_leave_last_good_state() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let cases = [
        (PipelineStage::PrepareForSignatureRequests, DocumentStatus::DataRooted, false),
        (PipelineStage::RequestSignatures, DocumentStatus::DataRooted, true),
        (PipelineStage::PrepareForAnchoring, DocumentStatus::SignaturesRequested, true),
        (PipelineStage::AnchorDocument, DocumentStatus::SignaturesRequested, true),
        (PipelineStage::SendDocument, DocumentStatus::Anchored, true),
    ];

    for (fail_at, stored_status, has_signing_root) in cases {
        let failing: Arc<dyn Processor> = Arc::new(FailingProcessor {
            inner: alice.processor.clone(),
            fail_at,
        });
        let service = net.service_with(alice.repo.clone(), failing, &alice.identity);
        let doc = service
            .derive_from_create_payload(create_payload(purchase_order("po-fail", 5), &[]))
            .unwrap();
        let version = doc.core.current_version.clone();

        let err = service.create(&ctx, doc).await.unwrap_err();
        match err {
            DocumentError::StageFailed { stage, .. } => assert_eq!(stage, fail_at),
            other => panic!("unexpected error {:?}", other),
        }

        let stored = alice.repo.get(&version).unwrap();
        assert_eq!(stored.status, stored_status, "failure at {}", fail_at);
        assert_eq!(stored.core.signing_root.is_some(), has_signing_root);
        assert!(stored.core.data_root.is_some());

        let anchored = net
            .anchors
            .get_document_root_of(&AnchorId::from_version(&version).unwrap())
            .await
            .unwrap();
        assert_eq!(anchored.is_some(), fail_at == PipelineStage::SendDocument);
    }
}

#[tokio::test]
async fn cancelled_context_stops_before_next_stage() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();
    ctx.cancel();

    let doc = alice
        .service
        .derive_from_create_payload(create_payload(purchase_order("po-c", 1), &[]))
        .unwrap();
    let version = doc.core.current_version.clone();

    let err = alice.service.create(&ctx, doc).await.unwrap_err();
    assert!(matches!(
        err,
        DocumentError::Cancelled(PipelineStage::PrepareForSignatureRequests)
    ));
    assert_eq!(alice.repo.get(&version).unwrap().status, DocumentStatus::DataRooted);
    assert!(net.anchors.is_empty());
}

#[tokio::test]
async fn version_chain_over_many_updates() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let first = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-n", 0), &[]))
        .await
        .unwrap();
    let doc_id = first.core.document_identifier.clone();

    let mut versions = vec![first];
    for amount in 1..=5 {
        let next = alice
            .service
            .update_from_payload(
                &ctx,
                UpdatePayload {
                    document_id: to_hex_prefixed(&doc_id),
                    collaborators: vec![],
                    data: Some(purchase_order("po-n", amount)),
                },
            )
            .await
            .unwrap();
        versions.push(next);
    }

    for pair in versions.windows(2) {
        assert_eq!(pair[1].core.current_version, pair[0].core.next_version);
        assert_eq!(
            pair[1].core.previous_version.as_deref(),
            Some(pair[0].current_version())
        );
        assert_eq!(pair[1].core.document_identifier, doc_id);
    }

    let tip = alice.service.get_current_version(&doc_id).unwrap();
    assert_eq!(tip.core.current_version, versions[5].core.current_version);
    for (i, v) in versions.iter().enumerate() {
        let got = alice.service.get_version(&doc_id, v.current_version()).unwrap();
        assert_eq!(got.data, purchase_order("po-n", i as i64));
    }
}

#[tokio::test]
async fn stale_update_rejected() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let v1 = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-s", 1), &[]))
        .await
        .unwrap();
    let stale = v1.prepare_new_version(purchase_order("po-s", 2), &[]).unwrap();
    alice
        .service
        .update(&ctx, v1.prepare_new_version(purchase_order("po-s", 3), &[]).unwrap())
        .await
        .unwrap();

    // stale targets the same slot as the stored successor
    let err = alice.service.update(&ctx, stale).await.unwrap_err();
    assert!(matches!(err, DocumentError::ValidationFailed(_)));
}

#[tokio::test]
async fn revoked_key_invalidates_proofs() {
    let net = Network::new();
    let alice = net.node(1);
    let bob = net.node(2);
    let ctx = CancellationToken::new();

    let doc = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-r", 1), &["0x020202020202"]))
        .await
        .unwrap();

    net.identities
        .revoke_key(&bob.identity.id, &bob.identity.public_key(), 10)
        .unwrap();
    let err = alice
        .service
        .create_proofs(doc.document_id(), &["po_number"])
        .await
        .unwrap_err();
    match err {
        DocumentError::InvalidSignature { reason, .. } => assert!(reason.contains("revoked")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn identity_resolution_failure_surfaces() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let doc = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-i", 1), &[]))
        .await
        .unwrap();

    let blind = DocumentService::new(
        DocumentType::PurchaseOrder,
        alice.repo.clone(),
        alice.processor.clone(),
        Arc::new(UnreachableIdentityService),
        net.anchors.clone(),
    );
    let err = blind
        .create_proofs(doc.document_id(), &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::IdentityResolutionFailed { .. }));
}

#[tokio::test]
async fn unreachable_collaborator_fails_signature_stage() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let err = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-u", 1), &["0x030303030303"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DocumentError::StageFailed {
            stage: PipelineStage::RequestSignatures,
            ..
        }
    ));
}

#[tokio::test]
async fn wrong_variant_rejected() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let invoice = DocumentData::Invoice(InvoiceData {
        invoice_number: "inv-1".into(),
        ..Default::default()
    });
    let err = alice
        .service
        .create_from_payload(&ctx, create_payload(invoice.clone(), &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::UnknownDocumentType(_)));

    let doc = Document::new(invoice, &[]).unwrap();
    assert!(matches!(
        alice.service.derive_data(&doc),
        Err(DocumentError::UnknownDocumentType(_))
    ));
    assert!(matches!(
        alice.service.derive_response(&doc),
        Err(DocumentError::UnknownDocumentType(_))
    ));
}

#[tokio::test]
async fn response_renders_hex_collaborators() {
    let net = Network::new();
    let alice = net.node(1);
    let _bob = net.node(2);
    let ctx = CancellationToken::new();

    let doc = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-x", 3), &["0x020202020202"]))
        .await
        .unwrap();
    let resp = alice.service.derive_response(&doc).unwrap();
    assert_eq!(resp.header.collaborators, vec!["0x020202020202"]);
    assert_eq!(resp.header.document_id, to_hex_prefixed(doc.document_id()));
    assert_eq!(resp.header.version_id, to_hex_prefixed(doc.current_version()));
    assert_eq!(resp.data, purchase_order("po-x", 3));
    assert_eq!(alice.service.derive_data(&doc).unwrap(), resp.data);

    let err = alice
        .service
        .create_from_payload(&ctx, CreatePayload::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::InvalidPayload(_)));
}

#[tokio::test]
async fn signature_request_needs_local_identity() {
    let net = Network::new();
    let alice = net.node(1);

    let mut doc = Document::new(purchase_order("po-q", 1), &[alice.identity.id]).unwrap();
    doc.calculate_data_root().unwrap();
    doc.calculate_signing_root().unwrap();
    let cd = doc.pack_core_document().unwrap();

    let anonymous = DocumentService::new(
        DocumentType::PurchaseOrder,
        Arc::new(MemRepository::new()),
        alice.processor.clone(),
        net.identities.clone(),
        net.anchors.clone(),
    );
    assert!(matches!(
        anonymous.request_document_signature(&cd).await,
        Err(DocumentError::ValidationFailed(_))
    ));

    let signature = alice.service.request_document_signature(&cd).await.unwrap();
    assert_eq!(signature.entity_id, alice.identity.id);
    let stored = alice.repo.get(doc.current_version()).unwrap();
    assert_eq!(stored.core.signatures, vec![signature]);
}

#[tokio::test]
async fn signing_root_cleared_after_anchoring() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let doc = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-sr", 4), &[]))
        .await
        .unwrap();

    let mut stripped = alice.repo.get(doc.current_version()).unwrap();
    assert_eq!(stripped.status, DocumentStatus::Anchored);
    stripped.core.signing_root = None;
    let repo = Arc::new(MemRepository::new());
    repo.create(doc.current_version(), &stripped).unwrap();
    let service = net.service_with(repo, alice.processor.clone(), &alice.identity);

    let err = service
        .create_proofs(doc.document_id(), &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::MissingSigningRoot(_)));
}

#[tokio::test]
async fn later_version_id_is_not_a_document_id() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let v1 = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-v", 1), &[]))
        .await
        .unwrap();
    let v2 = alice
        .service
        .update_from_payload(
            &ctx,
            UpdatePayload {
                document_id: to_hex_prefixed(v1.document_id()),
                collaborators: vec![],
                data: Some(purchase_order("po-v", 2)),
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        alice.service.get_current_version(v2.current_version()),
        Err(DocumentError::NotFound(_))
    ));
    let err = alice
        .service
        .create_proofs(v2.current_version(), &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::NotFound(_)));
    let err = alice
        .service
        .create_proofs_for_version(v2.current_version(), v2.current_version(), &["po_number"])
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::VersionNotFound { .. }));

    // an update addressed by version id finds nothing to extend
    let err = alice
        .service
        .update_from_payload(
            &ctx,
            UpdatePayload {
                document_id: to_hex_prefixed(v2.current_version()),
                collaborators: vec![],
                data: Some(purchase_order("po-v", 3)),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::NotFound(_)));
}

#[tokio::test]
async fn anchored_document_is_not_signed_again() {
    let net = Network::new();
    let alice = net.node(1);
    let bob = net.node(2);
    let ctx = CancellationToken::new();

    let doc = alice
        .service
        .create_from_payload(&ctx, create_payload(purchase_order("po-a", 8), &["0x020202020202"]))
        .await
        .unwrap();
    assert!(doc.core.document_root.is_some());

    let cd = doc.pack_core_document().unwrap();
    let err = bob.service.request_document_signature(&cd).await.unwrap_err();
    assert!(matches!(err, DocumentError::AlreadyAnchored(_)));

    let held = bob.repo.get(doc.current_version()).unwrap();
    assert_eq!(held.status, DocumentStatus::Anchored);
    assert_eq!(held.core.signatures, doc.core.signatures);
}

#[tokio::test]
async fn only_collaborators_sign() {
    let net = Network::new();
    let alice = net.node(1);
    let bob = net.node(2);
    let carol = net.node(3);

    let mut doc = Document::new(purchase_order("po-c", 2), &[bob.identity.id]).unwrap();
    doc.calculate_data_root().unwrap();
    doc.calculate_signing_root().unwrap();
    doc.sign(&alice.identity).unwrap();
    let cd = doc.pack_core_document().unwrap();

    let err = carol.service.request_document_signature(&cd).await.unwrap_err();
    assert!(matches!(err, DocumentError::ValidationFailed(_)));
    assert!(carol.repo.is_empty());

    let signature = bob.service.request_document_signature(&cd).await.unwrap();
    assert_eq!(signature.entity_id, bob.identity.id);
}

#[tokio::test]
async fn extra_validator_runs_before_storage() {
    let net = Network::new();
    let alice = net.node(1);
    let ctx = CancellationToken::new();

    let service = net
        .service_with(alice.repo.clone(), alice.processor.clone(), &alice.identity)
        .with_validator(|_: Option<&Document>, new: &Document| -> anchored_docs::Result<()> {
            match &new.data {
                DocumentData::PurchaseOrder(po) if po.order_amount > 100 => Err(
                    DocumentError::ValidationFailed("order amount above limit".into()),
                ),
                _ => Ok(()),
            }
        });

    let big = service
        .derive_from_create_payload(create_payload(purchase_order("po-l", 500), &[]))
        .unwrap();
    let version = big.core.current_version.clone();
    let err = service.create(&ctx, big).await.unwrap_err();
    assert!(err.to_string().contains("order amount above limit"));
    assert!(!alice.repo.exists(&version));

    let small = service
        .create_from_payload(&ctx, create_payload(purchase_order("po-l", 50), &[]))
        .await
        .unwrap();

    let err = service
        .update_from_payload(
            &ctx,
            UpdatePayload {
                document_id: to_hex_prefixed(small.document_id()),
                collaborators: vec![],
                data: Some(purchase_order("po-l", 150)),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentError::ValidationFailed(_)));
    assert!(!alice.repo.exists(&small.core.next_version));
    let tip = service.get_current_version(small.document_id()).unwrap();
    assert_eq!(tip.core.current_version, small.core.current_version);
}
