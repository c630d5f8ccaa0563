//! Error types for pixuli-oplog
//!
//! Only the storage layer produces errors. The operation log service absorbs
//! them (logging and moving on) everywhere except [`flush`].
//!
//! [`flush`]: crate::OperationLogService::flush

use thiserror::Error;

/// Errors that can occur in storage adapter operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error while reading or writing the backing store
    #[error("I/O error: {0}")]
    Io(String),

    /// The backing store has no room for the write
    #[error("Storage quota exceeded: {needed} bytes needed, {available} available")]
    QuotaExceeded {
        /// Bytes the rejected write needed
        needed: usize,
        /// Bytes the store could still accept
        available: usize,
    },

    /// Error during serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error during deserialization
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Backend-specific failure that fits no other variant
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            StorageError::Deserialization(err.to_string())
        } else {
            StorageError::Serialization(err.to_string())
        }
    }
}

impl StorageError {
    /// Create a new Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a new Backend error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Whether this error means the store ran out of space
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Error returned when parsing an action or status from its wire string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    /// Which enum was being parsed ("action" or "status")
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}
