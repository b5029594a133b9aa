//! Error types for ZyronDB.

use thiserror::Error;

/// Result type alias using ZyronError.
pub type Result<T> = std::result::Result<T, ZyronError>;

/// Errors that can occur in ZyronDB operations.
///
/// Unique-constraint violations are not errors: they are routed to a
/// violation output and reported as row-level errors while the stream keeps
/// running. Everything here aborts the operation that returned it.
#[derive(Debug, Error)]
pub enum ZyronError {
    // Storage errors
    #[error("Page not found: {page_id}")]
    PageNotFound { page_id: u64 },

    // B+ tree errors
    #[error("Key not found")]
    KeyNotFound,

    #[error("Duplicate key")]
    DuplicateKey,

    #[error("B+ tree corrupted: {0}")]
    BTreeCorrupted(String),

    // Bitmap entry errors
    #[error("Bitmap entry too large: {size} bytes (max {max})")]
    EntryTooLarge { size: usize, max: usize },

    #[error("Bitmap corrupted: {0}")]
    BitmapCorrupted(String),

    // Type errors
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Tuple decode failed at column {column}: {reason}")]
    TupleDecode { column: usize, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Invariant errors
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ZyronError {
    /// Returns true if this error signals corrupted data or a programming
    /// error rather than a misconfigured operator.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ZyronError::InvariantViolation(_)
                | ZyronError::BTreeCorrupted(_)
                | ZyronError::BitmapCorrupted(_)
        )
    }

    /// Returns true if this error was caused by operator configuration.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ZyronError::ConfigError(_) | ZyronError::InvalidParameter { .. }
        )
    }
}
