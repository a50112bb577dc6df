//! Error types for store engines.

use std::path::PathBuf;

use bytes::Bytes;
use thiserror::Error;

/// Errors raised by a [`KeyValueStore`](crate::KeyValueStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// `delete` on a key that is not present.
    #[error("key {key:?} does not exist")]
    KeyNotFound { key: Bytes },

    /// A mutation on a store opened read-only.
    #[error("store is opened read-only")]
    ReadOnly,

    /// Any operation after `close`.
    #[error("store is closed")]
    Closed,

    /// The engine does not implement this operation.
    #[error("operation not supported: {operation}")]
    NotSupported { operation: &'static str },

    /// An open flag string that does not parse.
    #[error("invalid open flags {flags:?}: {message}")]
    InvalidFlags { flags: String, message: String },

    /// The backing file could not be opened.
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file is not a valid store or is damaged.
    #[error("corrupt store at byte {offset}: {message}")]
    Corrupt { offset: u64, message: String },

    /// A key or value longer than the on-disk length field allows.
    #[error("entry too large: {len} bytes")]
    TooLarge { len: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_key_not_found(&self) -> bool {
        matches!(self, StoreError::KeyNotFound { .. })
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
