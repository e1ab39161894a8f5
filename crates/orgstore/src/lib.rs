//! Orgstore Core Library
//!
//! Key-value storage layer for organizational record services. One
//! facade, three backends with different availability and latency
//! characteristics, and a write-through file backup so no successful
//! write is ever held by a remote backend alone.
//!
//! # Architecture
//!
//! ```text
//! caller ──► Store (facade) ──► BackendSelector (first call only)
//!                 │                      │
//!                 │         ┌────────────┼────────────┐
//!                 ▼         ▼            ▼            ▼
//!            backup     TableDriver  RestDriver   FileDriver
//!            (file)     (relational) (remote KV)  (local JSON)
//! ```
//!
//! The selector probes the relational backend on the first storage
//! operation and pins the outcome for the process lifetime. Without a
//! relational backend, each call tries the remote KV service (when
//! configured) and falls back to the file document on transport
//! failure. Every successful write is mirrored into the file document.
//!
//! # Example
//! ```ignore
//! let store = Store::from_env()?;
//! store.set("user:a@x.com", "{\"id\":1}").await?;
//! let value = store.get("user:a@x.com").await?;
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod selector;
pub mod store;

// Re-export commonly used types
pub use config::{HttpConfig, PoolConfig, RestConfig, StorageConfig};
#[cfg(feature = "postgres")]
pub use driver::PgExecutor;
pub use driver::{FileDriver, KvDriver, RestDriver, SqlExecutor, TableDriver};
pub use error::{StorageError, StorageResult};
pub use selector::{BackendSelector, BackendState, Selection};
pub use store::{create_store, index_key, record_key, BackendKind, SharedStore, StorageStats, Store};
