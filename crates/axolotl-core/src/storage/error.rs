//! Storage error types.
//!
//! - `Serialization`: a record failed to encode or decode
//! - `Io`: the backing store failed
//! - `Poisoned`: a thread panicked while holding the store lock

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error (file system, database, injected failure, etc.)
    #[error("I/O error: {0}")]
    Io(String),

    /// Store lock was poisoned
    #[error("store lock poisoned")]
    Poisoned,
}
