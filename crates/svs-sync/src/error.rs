//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wire decoding or signing failed.
    #[error("codec error: {0}")]
    Codec(#[from] svs_core::CoreError),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] svs_store::StoreError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A handler is already attached at this prefix.
    #[error("handler already attached at {0}")]
    HandlerExists(String),

    /// The encoded publication exceeds the packet size ceiling.
    #[error("publication too large: {size} bytes exceeds limit of {limit}")]
    PublicationTooLarge { size: usize, limit: usize },

    /// The core did not accept a local sequence number.
    #[error("core rejected update to {source_name} seq {seq}")]
    UpdateRejected { source_name: String, seq: u64 },

    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The component has been shut down.
    #[error("sync has been shut down")]
    Shutdown,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
