//! Backend drivers behind a uniform point-operation contract.
//!
//! Every backend implements [`KvDriver`] identically, so callers never
//! branch on which backend is active.

pub mod file;
pub mod rest;
pub mod sql;

pub use file::FileDriver;
pub use rest::RestDriver;
#[cfg(feature = "postgres")]
pub use sql::PgExecutor;
pub use sql::{SqlExecutor, TableDriver};

use crate::error::StorageResult;
use async_trait::async_trait;

/// Uniform point-operation contract for all storage backends.
#[async_trait]
pub trait KvDriver: Send + Sync {
    /// Point lookup. An absent key is `Ok(None)`, never an error.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Point upsert. The value may be empty; it is stored verbatim and
    /// never parsed.
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Point removal. Deleting an absent key is a no-op, not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Whether the key is present.
    ///
    /// Provided in terms of [`get`](KvDriver::get) so no backend can
    /// disagree with it; implementations must not override this.
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }
}
