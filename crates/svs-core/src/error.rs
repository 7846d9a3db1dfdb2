//! Error types for the SVS core primitives.

use thiserror::Error;

/// Errors raised while encoding, decoding, or signing wire structures.
///
/// Decoding never panics on hostile input; every malformed buffer surfaces
/// as one of these variants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unexpected TLV type: expected {expected:#x}, found {found:#x}")]
    UnexpectedType { expected: u64, found: u64 },

    #[error("invalid non-negative integer length: {0}")]
    InvalidIntegerLength(usize),

    #[error("trailing bytes after TLV element: {0}")]
    TrailingBytes(usize),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("unsupported signature type: {0}")]
    UnsupportedSignatureType(u64),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
