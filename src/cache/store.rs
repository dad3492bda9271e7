//! Persistent key-value tier. A `PersistentKv` failure is advisory: the cache manager logs it
//! and carries on serving from memory/upstream — the persistent tier must never fail a request
//! that could otherwise succeed.

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::RpcProxyError;

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub count: u64,
    pub min_ts: Option<u64>,
    pub max_ts: Option<u64>,
}

/// Storage contract for the persistent tier.
#[allow(async_fn_in_trait)]
pub trait PersistentKv: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>, RpcProxyError>;
    async fn put(&self, key: &str, payload: &[u8], inserted_at_ms: u64) -> Result<(), RpcProxyError>;
    async fn delete(&self, key: &str) -> Result<(), RpcProxyError>;
    async fn delete_older_than(&self, cutoff_ms: u64) -> Result<u64, RpcProxyError>;
    async fn count(&self) -> Result<u64, RpcProxyError>;
    async fn stats(&self) -> Result<StoreStats, RpcProxyError>;
}

/// SQLite-backed implementation: one connection, serialized by a mutex, blocking calls pushed
/// to `spawn_blocking` since `rusqlite` itself is synchronous.
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS data (
    key TEXT PRIMARY KEY,
    payload BLOB NOT NULL,
    inserted_at INTEGER NOT NULL
)";
const INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_data_inserted_at ON data(inserted_at)";

impl SqliteKv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RpcProxyError> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?;
        Self::init(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn open_in_memory() -> Result<Self, RpcProxyError> {
        let conn =
            Connection::open_in_memory().map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?;
        Self::init(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn init(conn: &Connection) -> Result<(), RpcProxyError> {
        conn.execute(SCHEMA, []).map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?;
        conn.execute(INDEX, []).map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?;
        Ok(())
    }

    /// `rusqlite::Connection` closes on drop and every write here is already auto-committed, so
    /// there's nothing to flush — kept as an explicit async method to match the §4.3 contract
    /// and give callers (like shutdown hooks) an obvious place to call.
    pub async fn close(&self) {}
}

impl PersistentKv for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<(Vec<u8>, u64)>, RpcProxyError> {
        let conn = self.conn.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                "SELECT payload, inserted_at FROM data WHERE key = ?1",
                [&key],
                |row| Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, i64>(1)? as u64)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(RpcProxyError::PersistentCacheIo(other.to_string())),
            })
        })
        .await
        .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?
    }

    async fn put(&self, key: &str, payload: &[u8], inserted_at_ms: u64) -> Result<(), RpcProxyError> {
        let conn = self.conn.clone();
        let key = key.to_string();
        let payload = payload.to_vec();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO data (key, payload, inserted_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, inserted_at = excluded.inserted_at",
                rusqlite::params![key, payload, inserted_at_ms as i64],
            )
            .map(|_| ())
            .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))
        })
        .await
        .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?
    }

    async fn delete(&self, key: &str) -> Result<(), RpcProxyError> {
        let conn = self.conn.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute("DELETE FROM data WHERE key = ?1", [&key])
                .map(|_| ())
                .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))
        })
        .await
        .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?
    }

    async fn delete_older_than(&self, cutoff_ms: u64) -> Result<u64, RpcProxyError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute("DELETE FROM data WHERE inserted_at < ?1", [cutoff_ms as i64])
                .map(|n| n as u64)
                .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))
        })
        .await
        .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?
    }

    async fn count(&self) -> Result<u64, RpcProxyError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row("SELECT COUNT(*) FROM data", [], |row| row.get::<_, i64>(0))
                .map(|n| n as u64)
                .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))
        })
        .await
        .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?
    }

    async fn stats(&self) -> Result<StoreStats, RpcProxyError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row(
                "SELECT COUNT(*), MIN(inserted_at), MAX(inserted_at) FROM data",
                [],
                |row| {
                    let count: i64 = row.get(0)?;
                    let min_ts: Option<i64> = row.get(1)?;
                    let max_ts: Option<i64> = row.get(2)?;
                    Ok(StoreStats {
                        count: count as u64,
                        min_ts: min_ts.map(|v| v as u64),
                        max_ts: max_ts.map(|v| v as u64),
                    })
                },
            )
            .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))
        })
        .await
        .map_err(|e| RpcProxyError::PersistentCacheIo(e.to_string()))?
    }
}

/// Logs and swallows a persistent-tier error so request handling can continue memory-only.
pub fn log_store_error(operation: &str, err: RpcProxyError) {
    warn!(operation, error = %err, "persistent cache I/O error, continuing memory-only");
}
