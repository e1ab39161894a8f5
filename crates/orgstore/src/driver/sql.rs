//! Relational-table driver
//!
//! Stores the mapping as rows in a `kv_store` table reached through an
//! injectable SQL execution handle. Production wiring uses the sqlx
//! Postgres pool behind the `postgres` feature; tests inject an
//! in-memory handle with a statement counter.

use crate::driver::KvDriver;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::config::PoolConfig;
#[cfg(feature = "postgres")]
use sqlx::postgres::{PgPool, PgPoolOptions};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const GET_SQL: &str = "SELECT value FROM kv_store WHERE key = $1 LIMIT 1";

const UPSERT_SQL: &str = "INSERT INTO kv_store (key, value, created_at, updated_at) \
    VALUES ($1, $2, $3, $4) \
    ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at";

const DELETE_SQL: &str = "DELETE FROM kv_store WHERE key = $1";

/// SQL execution handle.
///
/// Everything the key-value table needs from a database: statements,
/// single-value queries, and a cheap availability predicate. All bound
/// parameters are text (keys, values, and RFC 3339 timestamps).
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    async fn execute(&self, sql: &str, params: &[&str]) -> StorageResult<u64>;

    /// Run a query yielding at most one row with one text column.
    async fn fetch_value(&self, sql: &str, params: &[&str]) -> StorageResult<Option<String>>;

    /// Whether the handle is currently able to reach the database.
    fn is_connected(&self) -> bool;
}

/// Postgres execution handle over a sqlx connection pool.
#[cfg(feature = "postgres")]
pub struct PgExecutor {
    pool: PgPool,
}

#[cfg(feature = "postgres")]
impl PgExecutor {
    /// Connect to the database described by the connection string.
    pub async fn connect(database_url: &str, pool_config: &PoolConfig) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_config.max_connections)
            .acquire_timeout(pool_config.acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|err| {
                StorageError::transport(format!("database connection failed: {}", err))
            })?;

        Ok(Self { pool })
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close all connections in the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(&self, sql: &str, params: &[&str]) -> StorageResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(*param);
        }
        let result = query
            .execute(&self.pool)
            .await
            .map_err(|err| StorageError::transport(format!("statement failed: {}", err)))?;
        Ok(result.rows_affected())
    }

    async fn fetch_value(&self, sql: &str, params: &[&str]) -> StorageResult<Option<String>> {
        let mut query = sqlx::query_scalar::<sqlx::Postgres, String>(sql);
        for param in params {
            query = query.bind(*param);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| StorageError::transport(format!("query failed: {}", err)))
    }

    fn is_connected(&self) -> bool {
        !self.pool.is_closed()
    }
}

/// Key-value driver over the `kv_store` table.
pub struct TableDriver {
    executor: Arc<dyn SqlExecutor>,
}

impl TableDriver {
    /// Create a driver over the given execution handle.
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    /// Create the table if it does not exist yet.
    ///
    /// Callers must serialize this through the backend selector; it is
    /// not safe to race from concurrent first callers.
    pub async fn init_schema(&self) -> StorageResult<()> {
        self.executor.execute(CREATE_TABLE_SQL, &[]).await?;
        Ok(())
    }

    /// The fallback decision is made once per process; a handle that
    /// goes away afterwards is a configuration failure, not a reason
    /// to silently switch backends mid-session.
    fn ensure_available(&self) -> StorageResult<()> {
        if self.executor.is_connected() {
            Ok(())
        } else {
            Err(StorageError::configuration(
                "relational backend selected but its connection is no longer available",
            ))
        }
    }
}

#[async_trait]
impl KvDriver for TableDriver {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.ensure_available()?;
        self.executor.fetch_value(GET_SQL, &[key]).await
    }

    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.ensure_available()?;
        let now = Utc::now().to_rfc3339();
        self.executor
            .execute(UPSERT_SQL, &[key, value, &now, &now])
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.ensure_available()?;
        self.executor.execute(DELETE_SQL, &[key]).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory execution handle that understands just enough of the
    /// key-value SQL, with counters and failure toggles for tests.
    #[derive(Default)]
    pub(crate) struct MemoryExecutor {
        rows: Mutex<HashMap<String, String>>,
        pub(crate) create_table_calls: AtomicUsize,
        fail_reads: AtomicBool,
        fail_writes: AtomicBool,
        disconnected: AtomicBool,
    }

    impl MemoryExecutor {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn set_fail_reads(&self, fail: bool) {
            self.fail_reads.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn disconnect(&self) {
            self.disconnected.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SqlExecutor for MemoryExecutor {
        async fn execute(&self, sql: &str, params: &[&str]) -> StorageResult<u64> {
            if sql.starts_with("CREATE TABLE") {
                self.create_table_calls.fetch_add(1, Ordering::SeqCst);
                return Ok(0);
            }
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::transport("simulated database outage"));
            }
            if sql.starts_with("INSERT") {
                let mut rows = self.rows.lock().unwrap();
                rows.insert(params[0].to_string(), params[1].to_string());
                return Ok(1);
            }
            if sql.starts_with("DELETE") {
                let mut rows = self.rows.lock().unwrap();
                return Ok(u64::from(rows.remove(params[0]).is_some()));
            }
            Ok(0)
        }

        async fn fetch_value(&self, sql: &str, params: &[&str]) -> StorageResult<Option<String>> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StorageError::transport("simulated database outage"));
            }
            assert!(sql.starts_with("SELECT"), "unexpected query: {}", sql);
            let rows = self.rows.lock().unwrap();
            Ok(rows.get(params[0]).cloned())
        }

        fn is_connected(&self) -> bool {
            !self.disconnected.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryExecutor;
    use super::*;
    use std::sync::atomic::Ordering;

    fn driver_with_executor() -> (Arc<MemoryExecutor>, TableDriver) {
        let executor = Arc::new(MemoryExecutor::new());
        let driver = TableDriver::new(executor.clone());
        (executor, driver)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_, driver) = driver_with_executor();
        driver.init_schema().await.unwrap();

        driver.set("leader:7", "{\"name\":\"Kim\"}").await.unwrap();
        assert_eq!(
            driver.get("leader:7").await.unwrap(),
            Some("{\"name\":\"Kim\"}".to_string())
        );
    }

    #[tokio::test]
    async fn test_set_is_upsert() {
        let (_, driver) = driver_with_executor();

        driver.set("k", "v1").await.unwrap();
        driver.set("k", "v2").await.unwrap();
        assert_eq!(driver.get("k").await.unwrap(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let (_, driver) = driver_with_executor();

        driver.delete("absent").await.unwrap();
        assert_eq!(driver.get("absent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_init_schema_executes_create_table() {
        let (executor, driver) = driver_with_executor();

        driver.init_schema().await.unwrap();
        assert_eq!(executor.create_table_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lost_connection_is_configuration_error() {
        let (executor, driver) = driver_with_executor();
        driver.set("k", "v").await.unwrap();

        executor.disconnect();

        let err = driver.get("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_read_failure_is_transport_error() {
        let (executor, driver) = driver_with_executor();
        executor.set_fail_reads(true);

        let err = driver.get("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Transport(_)));
        assert!(err.is_recoverable());
    }
}
