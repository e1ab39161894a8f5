//! Storage facade
//!
//! The single entry point every collaborator calls. Routes each point
//! operation to whichever backend the selector resolved, mirrors every
//! successful write into the file document as a backup, and keeps the
//! failure taxonomy uniform across call sites.

use crate::config::StorageConfig;
use crate::driver::{FileDriver, KvDriver, RestDriver};
use crate::error::StorageResult;
use crate::selector::{BackendSelector, BackendState, Selection};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Which backend is serving primary traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Relational table (primary when a connection string is present)
    Relational,
    /// Remote KV service
    Rest,
    /// Local file document
    File,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => write!(f, "Relational (database)"),
            Self::Rest => write!(f, "REST (remote KV)"),
            Self::File => write!(f, "File (local)"),
        }
    }
}

/// Operation counters for observability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageStats {
    /// Total operations routed through the facade
    pub total_operations: u64,
    /// Operations that completed successfully
    pub successful_operations: u64,
    /// Operations that surfaced an error to the caller
    pub failed_operations: u64,
    /// Times a primary failure was recovered via the file driver
    pub fallback_count: u64,
    /// Backup writes that failed (logged, never surfaced)
    pub backup_write_failures: u64,
}

/// Compose the conventional key for an individual record.
///
/// Collaborators store JSON-encoded records under `"<kind>:<id>"`; the
/// storage layer itself treats the result as an opaque string.
pub fn record_key(kind: &str, id: &str) -> String {
    format!("{}:{}", kind, id)
}

/// Compose the conventional key for a record type's id index.
///
/// The index is a JSON-encoded array of ids maintained by callers as an
/// ordinary read-modify-write sequence; no multi-key transaction
/// protects it.
pub fn index_key(kind: &str) -> String {
    format!("{}:index", kind)
}

/// The public key-value interface.
///
/// String-in, string-out; values are opaque payloads. All operations
/// are async and safe to call from many tasks at once.
pub struct Store {
    config: StorageConfig,
    selector: BackendSelector,
    file: FileDriver,
    rest: Option<RestDriver>,
    stats: RwLock<StorageStats>,
}

impl Store {
    /// Create a store from configuration.
    pub fn new(config: StorageConfig) -> StorageResult<Self> {
        Self::with_selector(config, BackendSelector::new())
    }

    /// Create a store from `ORGSTORE_*` environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Self::new(StorageConfig::from_env())
    }

    /// Create a store with a custom backend selector.
    ///
    /// Lets tests (and alternative wirings) inject a pre-connected SQL
    /// execution handle through
    /// [`BackendSelector::with_executor`](crate::selector::BackendSelector::with_executor).
    pub fn with_selector(config: StorageConfig, selector: BackendSelector) -> StorageResult<Self> {
        let file = FileDriver::new(&config.data_dir);
        let rest = match &config.rest {
            Some(rest_config) => Some(RestDriver::new(rest_config, &config.http)?),
            None => None,
        };

        Ok(Self {
            config,
            selector,
            file,
            rest,
            stats: RwLock::new(StorageStats::default()),
        })
    }

    /// Point lookup. Absent keys are `Ok(None)`.
    pub async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let result = self.get_inner(key).await;
        self.finish(result).await
    }

    /// Point upsert.
    pub async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let result = self.set_inner(key, value).await;
        self.finish(result).await
    }

    /// Point removal. Deleting an absent key is a no-op.
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let result = self.delete_inner(key).await;
        self.finish(result).await
    }

    /// Whether the key is present. Always agrees with [`get`](Store::get).
    pub async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Fetch and decode a JSON-encoded record.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> StorageResult<Option<T>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a record as JSON.
    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> StorageResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }

    /// Snapshot of the operation counters.
    pub async fn stats(&self) -> StorageStats {
        self.stats.read().await.clone()
    }

    /// Selector state (uninitialized until the first operation).
    pub fn backend_state(&self) -> BackendState {
        self.selector.state()
    }

    /// The backend serving primary traffic, if resolved yet.
    pub fn active_backend(&self) -> Option<BackendKind> {
        match self.selector.state() {
            BackendState::Uninitialized => None,
            BackendState::RelationalActive => Some(BackendKind::Relational),
            BackendState::NoRelational => Some(if self.rest.is_some() {
                BackendKind::Rest
            } else {
                BackendKind::File
            }),
        }
    }

    /// The configuration this store was built from.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    async fn get_inner(&self, key: &str) -> StorageResult<Option<String>> {
        match self.selector.resolve(&self.config).await {
            Selection::Relational(table) => match table.get(key).await {
                Ok(value) => Ok(value),
                Err(err) if err.is_recoverable() => {
                    warn!("primary read failed, retrying against file backup: {}", err);
                    self.note_fallback().await;
                    self.file.get(key).await
                }
                Err(err) => Err(err),
            },
            Selection::NoRelational => match &self.rest {
                Some(rest) => match rest.get(key).await {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_recoverable() => {
                        warn!("remote read failed, retrying against file backup: {}", err);
                        self.note_fallback().await;
                        self.file.get(key).await
                    }
                    Err(err) => Err(err),
                },
                None => self.file.get(key).await,
            },
        }
    }

    async fn set_inner(&self, key: &str, value: &str) -> StorageResult<()> {
        match self.selector.resolve(&self.config).await {
            // Once pinned, the relational driver is the primary path;
            // only the backup write still touches the file document.
            Selection::Relational(table) => {
                table.set(key, value).await?;
                self.backup_write(key, value).await;
                Ok(())
            }
            Selection::NoRelational => match &self.rest {
                Some(rest) => match rest.set(key, value).await {
                    Ok(()) => {
                        self.backup_write(key, value).await;
                        Ok(())
                    }
                    Err(err) if err.is_recoverable() => {
                        // The write must not be lost: the file document
                        // becomes the primary for this operation.
                        warn!("remote write failed, persisting to file instead: {}", err);
                        self.note_fallback().await;
                        self.file.set(key, value).await
                    }
                    Err(err) => Err(err),
                },
                None => self.file.set(key, value).await,
            },
        }
    }

    async fn delete_inner(&self, key: &str) -> StorageResult<()> {
        match self.selector.resolve(&self.config).await {
            Selection::Relational(table) => {
                table.delete(key).await?;
                self.backup_delete(key).await;
                Ok(())
            }
            Selection::NoRelational => match &self.rest {
                Some(rest) => match rest.delete(key).await {
                    Ok(()) => {
                        self.backup_delete(key).await;
                        Ok(())
                    }
                    Err(err) if err.is_recoverable() => {
                        warn!("remote delete failed, deleting from file instead: {}", err);
                        self.note_fallback().await;
                        self.file.delete(key).await
                    }
                    Err(err) => Err(err),
                },
                None => self.file.delete(key).await,
            },
        }
    }

    /// Mirror a successful primary write into the file document.
    /// Best-effort: a failure here never masks the primary result.
    async fn backup_write(&self, key: &str, value: &str) {
        if let Err(err) = self.file.set(key, value).await {
            self.stats.write().await.backup_write_failures += 1;
            warn!("backup write for key {} failed: {}", key, err);
        }
    }

    /// The backup copy must not outlive the primary record.
    async fn backup_delete(&self, key: &str) {
        if let Err(err) = self.file.delete(key).await {
            warn!("backup delete for key {} failed: {}", key, err);
        }
    }

    async fn note_fallback(&self) {
        self.stats.write().await.fallback_count += 1;
    }

    async fn finish<T>(&self, result: StorageResult<T>) -> StorageResult<T> {
        let mut stats = self.stats.write().await;
        stats.total_operations += 1;
        match &result {
            Ok(_) => stats.successful_operations += 1,
            Err(_) => stats.failed_operations += 1,
        }
        drop(stats);
        result
    }
}

/// Thread-safe shared store handle.
pub type SharedStore = Arc<Store>;

/// Create a shared store.
pub fn create_store(config: StorageConfig) -> StorageResult<SharedStore> {
    Ok(Arc::new(Store::new(config)?))
}
