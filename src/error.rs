//! Error types for hashstore

use thiserror::Error;

/// Result type alias for hashstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in hashstore operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key not found: {0:?}")]
    KeyNotFound(String),

    #[error("key already exists: {0:?}")]
    KeyExists(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid database file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("{what} too large: {len} bytes")]
    ValueTooLarge { what: &'static str, len: usize },

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Reports whether this error is a missing-key error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_))
    }

    /// Reports whether this error is a duplicate-key error
    pub fn is_exists(&self) -> bool {
        matches!(self, Error::KeyExists(_))
    }
}
