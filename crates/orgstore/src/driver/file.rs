//! File-backed driver
//!
//! Persists the whole mapping as one JSON document on local disk. This
//! is the fallback-of-last-resort and the write-through backup target,
//! so reads are maximally tolerant: a missing or unparsable document is
//! treated as an empty mapping rather than an error.

use crate::driver::KvDriver;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::warn;

/// Name of the document inside the storage root.
const DOCUMENT_NAME: &str = "kv.json";

/// File-backed key-value driver.
///
/// Every operation runs a load-mutate-rewrite cycle on the whole
/// document under a driver-scoped mutex, so concurrent writers cannot
/// lose updates to each other.
pub struct FileDriver {
    root: PathBuf,
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileDriver {
    /// Create a driver rooted at the given storage directory.
    ///
    /// The directory is created on first write, not here.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let path = root.join(DOCUMENT_NAME);
        Self {
            root,
            path,
            lock: Mutex::new(()),
        }
    }

    /// Path of the JSON document on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full document, for diagnostics and tests.
    pub async fn document(&self) -> HashMap<String, String> {
        let _guard = self.lock.lock().await;
        self.load_document().await
    }

    async fn load_document(&self) -> HashMap<String, String> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(document) => document,
                Err(err) => {
                    warn!(
                        "document at {} is not valid JSON, treating as empty: {}",
                        self.path.display(),
                        err
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                warn!(
                    "failed to read document at {}, treating as empty: {}",
                    self.path.display(),
                    err
                );
                HashMap::new()
            }
        }
    }

    async fn write_document(&self, document: &HashMap<String, String>) -> StorageResult<()> {
        fs::create_dir_all(&self.root).await.map_err(|err| {
            StorageError::persistence(format!("failed to create storage directory: {}", err))
        })?;

        let content = serde_json::to_string_pretty(document)?;

        // Rewrite atomically: a crash mid-write must not clobber the
        // previous document.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).await.map_err(|err| {
            StorageError::persistence(format!("failed to write document: {}", err))
        })?;
        fs::rename(&tmp, &self.path).await.map_err(|err| {
            StorageError::persistence(format!("failed to replace document: {}", err))
        })?;

        Ok(())
    }
}

#[async_trait]
impl KvDriver for FileDriver {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load_document().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.load_document().await;
        document.insert(key.to_string(), value.to_string());
        self.write_document(&document).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut document = self.load_document().await;
        if document.remove(key).is_some() {
            self.write_document(&document).await?;
        }
        Ok(())
    }
}
