// src/config.rs
// Service configuration, startup validation and logging setup

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::crypto::keys;
use crate::identity::{IdentityConfig, IdentityId};
use crate::repository::{MemRepository, Repository, RocksRepository};

pub const ENV_DB_PATH: &str = "DOCS_DB_PATH";
pub const ENV_STORAGE_MODE: &str = "DOCS_STORAGE_MODE";
pub const ENV_IDENTITY_ID: &str = "DOCS_IDENTITY_ID";
pub const ENV_SIGNING_KEY_PATH: &str = "DOCS_SIGNING_KEY_PATH";

/// Install the `env_logger` backend with an `info` default. Safe to call twice.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Memory,
    #[default]
    Rocksdb,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub db_path: String,
    #[serde(default)]
    pub storage_mode: StorageMode,
    /// Hex identity id of the local signer, if this node signs documents.
    #[serde(default)]
    pub identity_id: Option<String>,
    #[serde(default)]
    pub signing_key_path: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            db_path: "./data/documents".into(),
            storage_mode: StorageMode::Rocksdb,
            identity_id: None,
            signing_key_path: None,
        }
    }
}

/// Validation result for configuration checks
pub struct ConfigValidation {
    pub valid: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    fn new() -> Self {
        Self {
            valid: true,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn add_warning(&mut self, msg: String) {
        self.warnings.push(msg);
    }

    fn add_error(&mut self, msg: String) {
        self.errors.push(msg);
        self.valid = false;
    }

    pub fn print_summary(&self) {
        for w in &self.warnings {
            warn!("config: {}", w);
        }
        for e in &self.errors {
            error!("config: {}", e);
        }
        if self.valid && self.warnings.is_empty() {
            info!("Configuration validation passed");
        }
    }
}

impl ServiceConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config: ServiceConfig = serde_json::from_str(&json)
            .with_context(|| format!("parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Defaults, then `.env`, then process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        config.apply_overrides(|k| env::var(k).ok())?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|k| env::var(k).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.db_path = path;
        }
        if let Some(mode) = lookup(ENV_STORAGE_MODE) {
            self.storage_mode = match mode.to_lowercase().as_str() {
                "memory" => StorageMode::Memory,
                "rocksdb" => StorageMode::Rocksdb,
                other => bail!("unknown storage mode {:?}", other),
            };
        }
        if let Some(id) = lookup(ENV_IDENTITY_ID) {
            self.identity_id = Some(id);
        }
        if let Some(path) = lookup(ENV_SIGNING_KEY_PATH) {
            self.signing_key_path = Some(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        match self.storage_mode {
            StorageMode::Memory => validation
                .add_warning("memory storage selected; documents are lost on restart".into()),
            StorageMode::Rocksdb if self.db_path.trim().is_empty() => {
                validation.add_error("db_path is empty".into())
            }
            StorageMode::Rocksdb => {}
        }

        match (&self.identity_id, &self.signing_key_path) {
            (Some(id), Some(_)) => {
                if let Err(e) = IdentityId::from_hex(id) {
                    validation.add_error(format!("identity_id {:?}: {}", id, e));
                }
            }
            (Some(_), None) => validation.add_error("identity_id set without signing_key_path".into()),
            (None, Some(_)) => validation.add_error("signing_key_path set without identity_id".into()),
            (None, None) => validation
                .add_warning("no signing identity; incoming signature requests are refused".into()),
        }

        validation
    }

    pub fn open_repository(&self) -> Result<Arc<dyn Repository>> {
        match self.storage_mode {
            StorageMode::Memory => Ok(Arc::new(MemRepository::new())),
            StorageMode::Rocksdb => {
                let path = PathBuf::from(&self.db_path);
                fs::create_dir_all(&path)
                    .with_context(|| format!("create db dir {}", path.display()))?;
                Ok(Arc::new(RocksRepository::open(&path)?))
            }
        }
    }

    /// Local signing identity. A missing key file is generated.
    pub fn load_identity(&self) -> Result<Option<IdentityConfig>> {
        let (id, key_path) = match (&self.identity_id, &self.signing_key_path) {
            (Some(id), Some(path)) => (id, Path::new(path)),
            (None, None) => return Ok(None),
            _ => bail!("identity_id and signing_key_path must be set together"),
        };
        let id = IdentityId::from_hex(id)?;
        let signing_key = if key_path.exists() {
            keys::load_signing_key(key_path)?
        } else {
            info!("Generating signing key at {}", key_path.display());
            keys::generate_and_write_signing_key(key_path)?
        };
        Ok(Some(IdentityConfig::new(id, signing_key)))
    }
}
