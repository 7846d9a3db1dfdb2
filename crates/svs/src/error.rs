//! Error types for an SVS node.

use svs_core::CoreError;
use svs_store::StoreError;
use svs_sync::SyncError;
use thiserror::Error;

/// Errors that can occur while running a node.
#[derive(Debug, Error)]
pub enum SvsError {
    /// Wire codec error.
    #[error("codec error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Node configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Node configuration could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, SvsError>;
