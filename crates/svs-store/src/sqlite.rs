//! SQLite implementation of the Store trait.
//!
//! This is the durable storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::Store;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. Closing drops the connection.
pub struct SqliteStore {
    /// The SQLite connection, `None` once closed.
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;
        migration::migrate(&mut conn)?;
        debug!(path = %path.as_ref().display(), "opened packet store");
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            let conn = guard.as_ref().ok_or(StoreError::Closed)?;
            f(conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        let key = key.to_vec();
        self.with_conn(move |conn| {
            let wire: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT wire FROM packets WHERE name = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(wire.map(Bytes::from))
        })
        .await
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO packets (name, wire, stored_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET wire = excluded.wire, stored_at = excluded.stored_at",
                params![key, value, migration::now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        let key = key.to_vec();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM packets WHERE name = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| StoreError::Database(e))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
