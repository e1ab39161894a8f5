//! Lazy backend selection
//!
//! The relational backend is probed on the very first storage operation
//! of the process and the outcome is pinned for the process lifetime.
//! Concurrent first callers are serialized through a single-flight
//! cell, so schema initialization executes exactly once: a caller
//! arriving mid-initialization waits for the in-flight probe instead of
//! repeating it.

use crate::config::StorageConfig;
use crate::driver::{SqlExecutor, TableDriver};
use crate::error::StorageResult;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Outcome of the one-time backend probe.
#[derive(Clone)]
pub enum Selection {
    /// Relational backend connected and initialized; pinned as the
    /// primary for the rest of the process lifetime.
    Relational(Arc<TableDriver>),
    /// No relational backend; per-call fallback between the REST and
    /// file drivers continues.
    NoRelational,
}

/// Observable selector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    /// First storage operation has not happened yet.
    Uninitialized,
    /// Relational backend is pinned.
    RelationalActive,
    /// Probe ran and found no usable relational backend.
    NoRelational,
}

/// Single-flight lazy backend selector.
///
/// An ordinary injectable value rather than a process global: each
/// [`Store`](crate::store::Store) owns one, and tests construct a fresh
/// selector per case while production wiring keeps one per process.
pub struct BackendSelector {
    cell: OnceCell<Selection>,
    executor_override: Option<Arc<dyn SqlExecutor>>,
}

impl BackendSelector {
    /// Create a selector that probes the configured connection string.
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            executor_override: None,
        }
    }

    /// Create a selector over a pre-connected execution handle.
    ///
    /// The handle stands in for the configured connection string; the
    /// probe still runs schema initialization through it exactly once.
    pub fn with_executor(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            cell: OnceCell::new(),
            executor_override: Some(executor),
        }
    }

    /// Resolve the backend selection, probing on the first call.
    ///
    /// The resolution is cached for the process lifetime and never
    /// re-evaluated, even if configuration later changes: schema
    /// initialization is a one-time side effect that must not race.
    pub async fn resolve(&self, config: &StorageConfig) -> Selection {
        self.cell
            .get_or_init(|| self.initialize(config))
            .await
            .clone()
    }

    /// Current state without triggering a probe.
    pub fn state(&self) -> BackendState {
        match self.cell.get() {
            None => BackendState::Uninitialized,
            Some(Selection::Relational(_)) => BackendState::RelationalActive,
            Some(Selection::NoRelational) => BackendState::NoRelational,
        }
    }

    async fn initialize(&self, config: &StorageConfig) -> Selection {
        let probe = self.probe(config).await;
        match probe {
            Ok(Some(selection)) => selection,
            Ok(None) => {
                debug!("no relational connection string configured");
                Selection::NoRelational
            }
            Err(err) => {
                warn!(
                    "relational backend unavailable, continuing without it: {}",
                    err
                );
                Selection::NoRelational
            }
        }
    }

    async fn probe(&self, config: &StorageConfig) -> StorageResult<Option<Selection>> {
        let executor: Arc<dyn SqlExecutor> = match &self.executor_override {
            Some(executor) => executor.clone(),
            None => match self.connect(config).await? {
                Some(executor) => executor,
                None => return Ok(None),
            },
        };

        let driver = Arc::new(TableDriver::new(executor));
        driver.init_schema().await?;
        info!("relational backend initialized and pinned");
        Ok(Some(Selection::Relational(driver)))
    }

    #[cfg(feature = "postgres")]
    async fn connect(&self, config: &StorageConfig) -> StorageResult<Option<Arc<dyn SqlExecutor>>> {
        let Some(url) = &config.database_url else {
            return Ok(None);
        };
        let executor = crate::driver::PgExecutor::connect(url, &config.pool).await?;
        Ok(Some(Arc::new(executor)))
    }

    #[cfg(not(feature = "postgres"))]
    async fn connect(&self, config: &StorageConfig) -> StorageResult<Option<Arc<dyn SqlExecutor>>> {
        if config.database_url.is_some() {
            warn!("database URL configured but built without postgres support");
        }
        Ok(None)
    }
}

impl Default for BackendSelector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::sql::testing::MemoryExecutor;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_no_configuration_resolves_to_no_relational() {
        let selector = BackendSelector::new();
        assert_eq!(selector.state(), BackendState::Uninitialized);

        let selection = selector.resolve(&StorageConfig::default()).await;
        assert!(matches!(selection, Selection::NoRelational));
        assert_eq!(selector.state(), BackendState::NoRelational);
    }

    #[tokio::test]
    async fn test_injected_executor_resolves_to_relational() {
        let executor = Arc::new(MemoryExecutor::new());
        let selector = BackendSelector::with_executor(executor.clone());

        let selection = selector.resolve(&StorageConfig::default()).await;
        assert!(matches!(selection, Selection::Relational(_)));
        assert_eq!(selector.state(), BackendState::RelationalActive);
        assert_eq!(executor.create_table_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_callers_initialize_once() {
        let executor = Arc::new(MemoryExecutor::new());
        let selector = Arc::new(BackendSelector::with_executor(executor.clone()));
        let config = Arc::new(StorageConfig::default());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let selector = selector.clone();
            let config = config.clone();
            handles.push(tokio::spawn(async move {
                let selection = selector.resolve(&config).await;
                assert!(matches!(selection, Selection::Relational(_)));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Schema initialization ran exactly once despite eight racing
        // first callers.
        assert_eq!(executor.create_table_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolution_is_cached() {
        let selector = BackendSelector::new();

        let first = selector.resolve(&StorageConfig::default()).await;
        assert!(matches!(first, Selection::NoRelational));

        // Configuration appearing later must not re-trigger the probe.
        let config = StorageConfig::default().with_database_url("postgresql://late/too-late");
        let second = selector.resolve(&config).await;
        assert!(matches!(second, Selection::NoRelational));
    }
}
