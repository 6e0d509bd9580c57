// src/repository/mod.rs
//! Content-addressed document store. Every version is stored under its own
//! version identifier; the first version's identifier is the document id.

pub mod rocks;

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::documents::Document;
use crate::error::{DocumentError, Result};

pub use rocks::RocksRepository;

pub trait Repository: Send + Sync {
    fn exists(&self, id: &[u8]) -> bool;

    fn get(&self, id: &[u8]) -> Result<Document>;

    /// Store `doc` under `id`. Fails `AlreadyExists` if the key is taken; the
    /// check and the write are one atomic step.
    fn create(&self, id: &[u8], doc: &Document) -> Result<()>;

    /// Overwrite the record under `id`. Anchored records are sealed.
    fn update(&self, id: &[u8], doc: &Document) -> Result<()>;
}

/// In-memory repository.
#[derive(Default)]
pub struct MemRepository {
    docs: RwLock<HashMap<Vec<u8>, Document>>,
}

impl MemRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }
}

impl Repository for MemRepository {
    fn exists(&self, id: &[u8]) -> bool {
        self.docs.read().contains_key(id)
    }

    fn get(&self, id: &[u8]) -> Result<Document> {
        self.docs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(id.to_vec()))
    }

    fn create(&self, id: &[u8], doc: &Document) -> Result<()> {
        let mut docs = self.docs.write();
        if docs.contains_key(id) {
            return Err(DocumentError::AlreadyExists(id.to_vec()));
        }
        docs.insert(id.to_vec(), doc.clone());
        Ok(())
    }

    fn update(&self, id: &[u8], doc: &Document) -> Result<()> {
        let mut docs = self.docs.write();
        match docs.get_mut(id) {
            None => Err(DocumentError::NotFound(id.to_vec())),
            Some(existing) if existing.is_anchored() => {
                Err(DocumentError::AlreadyAnchored(id.to_vec()))
            }
            Some(existing) => {
                *existing = doc.clone();
                Ok(())
            }
        }
    }
}

/// Walk the chain from the root record, calling `visit` on every version in
/// order until it returns `true` or the chain ends. Returns the last version
/// visited. `document_id` must name the first version; storage errors on a
/// successor abort the walk.
fn walk_chain<F>(repo: &dyn Repository, document_id: &[u8], mut visit: F) -> Result<Document>
where
    F: FnMut(&Document) -> bool,
{
    let mut current = repo.get(document_id)?;
    if current.core.document_identifier != document_id {
        // a later version's key is not a document id
        return Err(DocumentError::NotFound(document_id.to_vec()));
    }
    let mut seen: HashSet<Vec<u8>> = HashSet::new();
    seen.insert(current.core.current_version.clone());

    loop {
        if visit(&current) {
            return Ok(current);
        }
        let next_id = current.core.next_version.clone();
        if next_id.is_empty() {
            return Ok(current);
        }
        let next = match repo.get(&next_id) {
            Ok(next) => next,
            Err(DocumentError::NotFound(_)) => return Ok(current),
            Err(e) => return Err(e),
        };
        if next.core.document_identifier != document_id {
            log::warn!(
                "Version {} does not belong to document {}; chain ends at {}",
                hex::encode(&next_id),
                hex::encode(document_id),
                hex::encode(&current.core.current_version)
            );
            return Ok(current);
        }
        if !seen.insert(next.core.current_version.clone()) {
            return Err(DocumentError::ValidationFailed(format!(
                "version chain of {} revisits {}",
                hex::encode(document_id),
                hex::encode(&next.core.current_version)
            )));
        }
        current = next;
    }
}

/// Latest version of `document_id`: the end of the chain of stored successors.
pub fn get_current_version(repo: &dyn Repository, document_id: &[u8]) -> Result<Document> {
    walk_chain(repo, document_id, |_| false)
}

/// Version `version` of `document_id`, provided it is reachable from the root.
pub fn get_version(repo: &dyn Repository, document_id: &[u8], version: &[u8]) -> Result<Document> {
    let not_found = || DocumentError::VersionNotFound {
        document_id: document_id.to_vec(),
        version: version.to_vec(),
    };
    if version.is_empty() {
        return Err(not_found());
    }

    let found = match walk_chain(repo, document_id, |d| d.core.current_version == version) {
        Ok(doc) => doc,
        Err(DocumentError::NotFound(_)) => return Err(not_found()),
        Err(e) => return Err(e),
    };
    if found.core.current_version != version {
        return Err(not_found());
    }
    Ok(found)
}
