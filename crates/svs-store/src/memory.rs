//! In-memory implementation of the Store trait.
//!
//! Same semantics as SQLite but nothing survives the process.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, StoreError};
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

struct MemoryStoreInner {
    /// Packets keyed by encoded name.
    packets: HashMap<Vec<u8>, Bytes>,

    closed: bool,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner {
                packets: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Number of stored packets.
    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.packets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        let inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        if inner.closed {
            return Err(StoreError::Closed);
        }
        Ok(inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.read()?.packets.get(key).cloned())
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write()?
            .packets
            .insert(key.to_vec(), Bytes::copy_from_slice(value));
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<()> {
        self.write()?.packets.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        inner.closed = true;
        inner.packets.clear();
        Ok(())
    }
}
