//! # Media Storage Module
//!
//! Questo modulo astrae lo storage dei media originali e ottimizzati.
//!
//! ## Responsabilità:
//! - `MediaStorage`: trait asincrono `read(ref)` / `write(ref, bytes) -> url`
//! - `FileStorage`: radice di input e radice di output su filesystem locale
//! - `MemoryStorage`: storage in memoria per embedding e test
//! - `output_reference()`: naming content-addressed degli output
//!
//! ## Naming degli output:
//! `{prefix}/{sha256(input)[..16]}/{strategy}-{label}.{ext}`
//!
//! Lo stesso input con la stessa strategia produce sempre gli stessi
//! riferimenti, quindi una riscrittura è idempotente.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Storage collaborator for source and optimized media
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn read(&self, reference: &str) -> Result<Vec<u8>>;

    /// Store `data` and return the URL it can be fetched from
    async fn write(&self, reference: &str, data: &[u8]) -> Result<String>;
}

/// Short content hash used to group outputs of one source
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)[..16].to_string()
}

pub fn output_reference(prefix: &str, hash: &str, strategy: &str, label: &str, extension: &str) -> String {
    format!("{}/{}/{}-{}.{}", prefix.trim_end_matches('/'), hash, strategy, label, extension)
}

/// Reject absolute references and parent-directory escapes
fn checked_relative(reference: &str) -> Result<&Path> {
    let path = Path::new(reference);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if reference.is_empty() || escapes {
        return Err(EngineError::Validation(format!(
            "Invalid media reference '{}'",
            reference
        )));
    }
    Ok(path)
}

/// Local filesystem storage
pub struct FileStorage {
    input_root: PathBuf,
    output_root: PathBuf,
}

impl FileStorage {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }
}

#[async_trait]
impl MediaStorage for FileStorage {
    async fn read(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.input_root.join(checked_relative(reference)?);
        tokio::fs::read(&path)
            .await
            .map_err(|e| EngineError::Storage(format!("cannot read {}: {}", path.display(), e)))
    }

    async fn write(&self, reference: &str, data: &[u8]) -> Result<String> {
        let path = self.output_root.join(checked_relative(reference)?);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::Storage(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| EngineError::Storage(format!("cannot write {}: {}", path.display(), e)))?;

        debug!("Stored {} bytes at {}", data.len(), path.display());
        Ok(path.display().to_string())
    }
}

/// Storage kept entirely in memory
#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object, usable outside a runtime as well as inside one
    pub fn insert(&self, reference: &str, data: Vec<u8>) {
        self.objects.write().insert(reference.to_string(), data);
    }

    pub fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.objects.read().get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl MediaStorage for MemoryStorage {
    async fn read(&self, reference: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .get(reference)
            .cloned()
            .ok_or_else(|| EngineError::Storage(format!("object not found: {}", reference)))
    }

    async fn write(&self, reference: &str, data: &[u8]) -> Result<String> {
        self.objects.write().insert(reference.to_string(), data.to_vec());
        Ok(format!("memory://{}", reference))
    }
}
