//! Store trait: the abstract interface for packet persistence.
//!
//! Sync keeps every packet it publishes (and, optionally, every packet it
//! fetches) so it can answer data requests from peers. Keys are the wire
//! encoding of the packet name; values are the full packet wire bytes.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Async key/value byte store.
///
/// # Design Notes
///
/// - **Overwrites**: `set` on an existing key replaces the value.
/// - **Absent keys**: `get` returns `None`; `remove` of an absent key is not an error.
/// - **Close**: after `close`, every operation returns `StoreError::Closed`.
///   Closing twice is allowed.
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up the value stored under `key`.
    async fn get(&self, key: &[u8]) -> Result<Option<Bytes>>;

    /// Store `value` under `key`.
    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete `key` if present.
    async fn remove(&self, key: &[u8]) -> Result<()>;

    /// Release underlying resources.
    async fn close(&self) -> Result<()>;
}
