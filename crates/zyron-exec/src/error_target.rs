//! Row-level error reporting.

use parking_lot::Mutex;
use zyron_storage::TupleData;

/// An error attached to one row. The stream that posts it keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// What went wrong.
    pub message: String,
    /// The offending row.
    pub tuple: TupleData,
}

/// Receives row-level errors.
pub trait ErrorTarget: Send + Sync {
    /// Records one row error.
    fn post_error(&self, error: RowError);
}

/// Error target that keeps every posted error in memory.
#[derive(Debug, Default)]
pub struct ErrorLog {
    errors: Mutex<Vec<RowError>>,
}

impl ErrorLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the errors posted so far.
    pub fn errors(&self) -> Vec<RowError> {
        self.errors.lock().clone()
    }

    /// Returns the number of errors posted so far.
    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    /// Returns true if no error was posted.
    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }
}

impl ErrorTarget for ErrorLog {
    fn post_error(&self, error: RowError) {
        self.errors.lock().push(error);
    }
}
