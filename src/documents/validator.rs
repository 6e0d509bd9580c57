// src/documents/validator.rs
//! Checks run on a document before it is stored.

use std::sync::Arc;

use super::Document;
use crate::error::{DocumentError, Result};
use crate::repository::Repository;

/// Validates `new`, optionally against the version it replaces.
pub trait Validator: Send + Sync {
    fn validate(&self, old: Option<&Document>, new: &Document) -> Result<()>;
}

impl<F> Validator for F
where
    F: Fn(Option<&Document>, &Document) -> Result<()> + Send + Sync,
{
    fn validate(&self, old: Option<&Document>, new: &Document) -> Result<()> {
        self(old, new)
    }
}

/// Runs every validator and reports all failures together.
#[derive(Clone, Default)]
pub struct ValidatorGroup {
    validators: Vec<Arc<dyn Validator>>,
}

impl ValidatorGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, v: impl Validator + 'static) -> Self {
        self.validators.push(Arc::new(v));
        self
    }

    /// Append every validator of `other`.
    pub fn merge(mut self, other: &ValidatorGroup) -> Self {
        self.validators.extend(other.validators.iter().cloned());
        self
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Validator for ValidatorGroup {
    fn validate(&self, old: Option<&Document>, new: &Document) -> Result<()> {
        let errors: Vec<String> = self
            .validators
            .iter()
            .filter_map(|v| v.validate(old, new).err())
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(DocumentError::ValidationFailed(errors.join("; ")))
        }
    }
}

/// Identifiers present and well-formed, payload valid.
pub fn field_validator() -> impl Validator {
    |_: Option<&Document>, new: &Document| -> Result<()> {
        let core = &new.core;
        if core.document_identifier.is_empty() {
            return Err(DocumentError::ValidationFailed("document identifier is empty".into()));
        }
        if core.current_version.is_empty() || core.next_version.is_empty() {
            return Err(DocumentError::ValidationFailed("version identifiers are empty".into()));
        }
        if core.current_version == core.next_version {
            return Err(DocumentError::ValidationFailed(
                "current and next version must differ".into(),
            ));
        }
        new.data.validate()
    }
}

/// The stored data root must match the payload.
pub fn data_root_validator() -> impl Validator {
    |_: Option<&Document>, new: &Document| -> Result<()> {
        let stored = new
            .core
            .data_root
            .ok_or_else(|| DocumentError::MissingDataRoot(new.core.current_version.clone()))?;
        let computed = new.tree()?.root_hash();
        if stored != computed {
            return Err(DocumentError::RootMismatch {
                expected: stored,
                actual: computed,
            });
        }
        Ok(())
    }
}

/// Validation for a brand new document.
pub fn create_validator(repo: Arc<dyn Repository>) -> ValidatorGroup {
    ValidatorGroup::new()
        .with(field_validator())
        .with(move |_: Option<&Document>, new: &Document| -> Result<()> {
            if repo.exists(&new.core.current_version) {
                return Err(DocumentError::ValidationFailed("document already exists".into()));
            }
            if !new.core.is_first_version() {
                return Err(DocumentError::ValidationFailed(
                    "first version must use the document identifier".into(),
                ));
            }
            Ok(())
        })
}

/// Validation for a successor of `old`.
pub fn update_validator() -> ValidatorGroup {
    ValidatorGroup::new()
        .with(field_validator())
        .with(|old: Option<&Document>, new: &Document| -> Result<()> {
            let old = old.ok_or_else(|| {
                DocumentError::ValidationFailed("previous version required".into())
            })?;
            if old.core.document_identifier != new.core.document_identifier {
                return Err(DocumentError::ValidationFailed(
                    "document identifier changed".into(),
                ));
            }
            if old.core.next_version != new.core.current_version {
                return Err(DocumentError::ValidationFailed(format!(
                    "current version {} does not follow {}",
                    hex::encode(&new.core.current_version),
                    hex::encode(&old.core.current_version)
                )));
            }
            if new.core.previous_version.as_deref() != Some(old.core.current_version.as_slice()) {
                return Err(DocumentError::ValidationFailed(
                    "previous version does not match".into(),
                ));
            }
            if old.document_type() != new.document_type() {
                return Err(DocumentError::ValidationFailed(
                    "document type changed".into(),
                ));
            }
            Ok(())
        })
}
