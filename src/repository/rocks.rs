// src/repository/rocks.rs
// RocksDB-backed document repository

use parking_lot::Mutex;
use rocksdb::{Options, DB};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::Repository;
use crate::documents::Document;
use crate::error::{DocumentError, Result};

const DOCUMENT_PREFIX: &[u8] = b"document:";

pub struct RocksRepository {
    db: Arc<DB>,
    /// Per-key locks making check-then-put atomic for create and update.
    key_locks: Mutex<HashMap<Vec<u8>, Arc<Mutex<()>>>>,
}

impl RocksRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(512);
        let db = DB::open(&opts, path.as_ref())?;
        log::info!("Opened document store at {}", path.as_ref().display());
        Ok(Self::from_db(Arc::new(db)))
    }

    pub fn from_db(db: Arc<DB>) -> Self {
        RocksRepository {
            db,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    fn key(id: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(DOCUMENT_PREFIX.len() + id.len());
        key.extend_from_slice(DOCUMENT_PREFIX);
        key.extend_from_slice(id);
        key
    }

    /// Run `f` holding the lock for `id`. The entry is dropped again once no
    /// other writer holds or waits on it.
    fn with_key_lock<T>(&self, id: &[u8], f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self
            .key_locks
            .lock()
            .entry(id.to_vec())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock();
            f()
        };

        let mut locks = self.key_locks.lock();
        if Arc::strong_count(&lock) == 2 {
            locks.remove(id);
        }
        result
    }

    fn read(&self, id: &[u8]) -> Result<Option<Document>> {
        match self.db.get(Self::key(id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, id: &[u8], doc: &Document) -> Result<()> {
        let bytes = serde_json::to_vec(doc)?;
        self.db.put(Self::key(id), bytes)?;
        Ok(())
    }
}

impl Repository for RocksRepository {
    fn exists(&self, id: &[u8]) -> bool {
        match self.db.get_pinned(Self::key(id)) {
            Ok(v) => v.is_some(),
            Err(e) => {
                log::warn!("exists({}) failed: {}", hex::encode(id), e);
                false
            }
        }
    }

    fn get(&self, id: &[u8]) -> Result<Document> {
        self.read(id)?
            .ok_or_else(|| DocumentError::NotFound(id.to_vec()))
    }

    fn create(&self, id: &[u8], doc: &Document) -> Result<()> {
        self.with_key_lock(id, || {
            if self.db.get_pinned(Self::key(id))?.is_some() {
                return Err(DocumentError::AlreadyExists(id.to_vec()));
            }
            self.write(id, doc)?;
            log::debug!("Stored document version {}", hex::encode(id));
            Ok(())
        })
    }

    fn update(&self, id: &[u8], doc: &Document) -> Result<()> {
        self.with_key_lock(id, || match self.read(id)? {
            None => Err(DocumentError::NotFound(id.to_vec())),
            Some(existing) if existing.is_anchored() => {
                Err(DocumentError::AlreadyAnchored(id.to_vec()))
            }
            Some(_) => {
                self.write(id, doc)?;
                log::debug!("Updated document version {}", hex::encode(id));
                Ok(())
            }
        })
    }
}
