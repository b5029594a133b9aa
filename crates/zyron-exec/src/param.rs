//! Single-writer, single-reader row count handoff between streams.

use parking_lot::Mutex;
use std::sync::Arc;
use zyron_common::{RecordNum, Result, ZyronError};

/// Row count published by one stream and read by another.
///
/// The producer writes once it has finished; the consumer reads only after
/// that. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct SharedRowCount {
    slot: Arc<Mutex<Option<RecordNum>>>,
}

impl SharedRowCount {
    /// Creates an unwritten slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the row count.
    pub fn write(&self, count: RecordNum) {
        *self.slot.lock() = Some(count);
    }

    /// Reads the published row count.
    pub fn read(&self) -> Result<RecordNum> {
        let count = *self.slot.lock();
        count.ok_or_else(|| {
            ZyronError::InvariantViolation("row count read before it was written".to_string())
        })
    }

    /// Returns true once a count has been published.
    pub fn is_written(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Clears the published count.
    pub fn reset(&self) {
        *self.slot.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let producer = SharedRowCount::new();
        let consumer = producer.clone();
        assert!(!consumer.is_written());
        assert!(consumer.read().unwrap_err().is_invariant_violation());

        producer.write(42);
        assert!(consumer.is_written());
        assert_eq!(consumer.read().unwrap(), 42);

        consumer.reset();
        assert!(!producer.is_written());
    }
}
